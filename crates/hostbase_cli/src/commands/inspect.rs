//! Inspect command implementation.

use super::require_document;
use clap::Args;
use hostbase_backend::{Backend, FileBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Arguments of `hostbase inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Backend document to inspect
    #[arg(short, long)]
    pub path: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Backend inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Document path.
    pub path: String,
    /// Document size in bytes.
    pub size: u64,
    /// Number of records.
    pub object_count: usize,
    /// Records per class.
    pub classes: BTreeMap<String, usize>,
    /// Records per concrete type.
    pub types: BTreeMap<String, usize>,
    /// Reported software version.
    pub opsi_version: String,
    /// Licensee of the module descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// Modules switched on.
    pub modules: Vec<String>,
}

/// Reads the document at `path` and summarizes it.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    require_document(path)?;
    let size = std::fs::metadata(path)?.len();
    let backend = FileBackend::open(path)?;
    let objects = backend.all_objects();

    let mut classes = BTreeMap::new();
    let mut types = BTreeMap::new();
    for object in &objects {
        *classes.entry(object.class().to_string()).or_insert(0) += 1;
        *types.entry(object.object_type().to_string()).or_insert(0) += 1;
    }

    let info = backend.backend_info()?;
    let modules = info
        .modules
        .flags
        .keys()
        .filter(|name| info.modules.is_enabled(name))
        .cloned()
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        size,
        object_count: objects.len(),
        classes,
        types,
        opsi_version: info.opsi_version,
        customer: info.modules.customer,
        modules,
    })
}

/// Renders a result as text.
pub fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backend: {}", result.path);
    let _ = writeln!(out, "========={}", "=".repeat(result.path.len()));
    let _ = writeln!(out);
    let _ = writeln!(out, "Size:           {} bytes", result.size);
    let _ = writeln!(out, "Records:        {}", result.object_count);
    if !result.opsi_version.is_empty() {
        let _ = writeln!(out, "Version:        {}", result.opsi_version);
    }
    if let Some(customer) = &result.customer {
        let _ = writeln!(out, "Customer:       {customer}");
    }
    if !result.modules.is_empty() {
        let _ = writeln!(out, "Modules:        {}", result.modules.join(", "));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Classes:");
    for (class, count) in &result.classes {
        let _ = writeln!(out, "  {class:<30} {count:>6}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Types:");
    for (object_type, count) in &result.types {
        let _ = writeln!(out, "  {object_type:<30} {count:>6}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbase_testkit::prelude::*;

    #[test]
    fn summarizes_sample_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master.json");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.create_objects(&sample_objects()).unwrap();
            backend.set_backend_info(sample_backend_info()).unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.object_count, sample_objects().len());
        assert_eq!(result.types["OpsiClient"], 3);
        assert_eq!(result.classes["Host"], 6);
        assert_eq!(result.customer.as_deref(), Some("Example Org"));
        assert!(result.modules.contains(&"multiplex".to_string()));

        let text = render_text(&result);
        assert!(text.contains("Records:"));
        assert!(text.contains("OpsiDepotserver"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["classes"]["Host"], 6);
    }

    #[test]
    fn missing_document_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(inspect(&dir.path().join("absent.json")).is_err());
    }
}

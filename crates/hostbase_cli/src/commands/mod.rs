//! CLI command implementations.

pub mod inspect;
pub mod replicate;

use std::path::Path;

/// Fails unless a backend document exists at `path`.
pub(crate) fn require_document(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No backend document found at {}", path.display()).into());
    }
    Ok(())
}

//! Backend information and the module license descriptor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a backend reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    /// Version string of the serving software.
    pub opsi_version: String,
    /// Licensed modules.
    pub modules: ModulesDescriptor,
}

/// Licensed-module descriptor.
///
/// Module flags are booleans (or, for counted modules, numbers/strings).
/// `valid` and `signature` are metadata and are not part of the signed
/// listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulesDescriptor {
    /// Whether the issuing backend considers the descriptor valid.
    #[serde(default)]
    pub valid: bool,
    /// Licensee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// `never` or an ISO date (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// Base64 signature over [`ModulesDescriptor::canonical_listing`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Module name to flag or count.
    #[serde(flatten)]
    pub flags: BTreeMap<String, Value>,
}

fn render_flag(value: &Value) -> String {
    match value {
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ModulesDescriptor {
    /// Enables or disables a module.
    #[must_use]
    pub fn with_module(mut self, name: &str, enabled: bool) -> Self {
        self.flags.insert(name.to_lowercase(), Value::Bool(enabled));
        self
    }

    /// Returns true if `name` is present and switched on.
    pub fn is_enabled(&self, name: &str) -> bool {
        match self.flags.get(&name.to_lowercase()) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s == "yes",
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) > 0,
            _ => false,
        }
    }

    /// Returns the signed listing: every non-meta key, lowercased and
    /// sorted, as `key = value\r\n` with booleans rendered `yes`/`no`.
    pub fn canonical_listing(&self) -> String {
        let mut entries: BTreeMap<String, String> = self
            .flags
            .iter()
            .map(|(key, value)| (key.trim().to_lowercase(), render_flag(value)))
            .collect();
        if let Some(customer) = &self.customer {
            entries.insert("customer".to_string(), customer.clone());
        }
        if let Some(expires) = &self.expires {
            entries.insert("expires".to_string(), expires.clone());
        }
        entries
            .iter()
            .map(|(key, value)| format!("{key} = {value}\r\n"))
            .collect()
    }

    /// Renders the modules file: the signed listing followed by the
    /// signature line.
    pub fn to_modules_file(&self) -> String {
        let mut text = self.canonical_listing().replace("\r\n", "\n");
        if let Some(signature) = &self.signature {
            text.push_str(&format!("signature = {signature}\n"));
        }
        text
    }

    /// Parses a modules file written by [`ModulesDescriptor::to_modules_file`].
    ///
    /// Lines without `=` are skipped. `valid` is left false: validity is
    /// decided by whoever checks the signature.
    pub fn from_modules_file(text: &str) -> Self {
        let mut descriptor = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            match key.as_str() {
                "customer" => descriptor.customer = Some(value),
                "expires" => descriptor.expires = Some(value),
                "signature" => descriptor.signature = Some(value),
                "valid" => {}
                _ => {
                    let flag = match value.as_str() {
                        "yes" => Value::Bool(true),
                        "no" => Value::Bool(false),
                        _ => Value::String(value),
                    };
                    descriptor.flags.insert(key, flag);
                }
            }
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModulesDescriptor {
        ModulesDescriptor {
            valid: true,
            customer: Some("Example Org".into()),
            expires: Some("never".into()),
            signature: Some("c2ln".into()),
            flags: BTreeMap::new(),
        }
        .with_module("multiplex", true)
        .with_module("license_management", false)
    }

    #[test]
    fn listing_is_sorted_and_excludes_meta() {
        let listing = sample().canonical_listing();
        assert_eq!(
            listing,
            "customer = Example Org\r\nexpires = never\r\nlicense_management = no\r\nmultiplex = yes\r\n"
        );
        assert!(!listing.contains("signature"));
        assert!(!listing.contains("valid"));
    }

    #[test]
    fn modules_file_roundtrip_keeps_listing() {
        let descriptor = sample();
        let back = ModulesDescriptor::from_modules_file(&descriptor.to_modules_file());
        assert_eq!(back.canonical_listing(), descriptor.canonical_listing());
        assert_eq!(back.signature, descriptor.signature);
        assert!(back.is_enabled("MULTIPLEX"));
        assert!(!back.is_enabled("license_management"));
    }

    #[test]
    fn json_shape_is_flat() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["multiplex"], Value::Bool(true));
        assert_eq!(json["customer"], Value::String("Example Org".into()));
        let back: ModulesDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}

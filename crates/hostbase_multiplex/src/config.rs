//! Multiplexer and service configuration.

use crate::error::{MultiplexError, MultiplexResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Port of a service addressed by bare host name.
pub const DEFAULT_SERVICE_PORT: u16 = 4447;

/// Configuration for the multiplex backend.
#[derive(Debug, Clone)]
pub struct MultiplexConfig {
    /// Time a single service call may take before it counts as failed.
    pub service_timeout: Duration,
    /// Domain appended to bare host names.
    pub default_domain: String,
    /// Service type of specs that name none.
    pub default_service_type: String,
    /// Number of worker threads issuing service calls.
    pub worker_count: usize,
    /// Ed25519 key that signs module license descriptors.
    pub license_key: Option<[u8; 32]>,
}

impl MultiplexConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            service_timeout: Duration::from_secs(30),
            default_domain: "localdomain".to_string(),
            default_service_type: "file".to_string(),
            worker_count: 8,
            license_key: None,
        }
    }

    /// Sets the per-call service timeout.
    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    /// Sets the default domain.
    pub fn with_default_domain(mut self, domain: impl Into<String>) -> Self {
        self.default_domain = domain.into();
        self
    }

    /// Sets the default service type.
    pub fn with_default_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.default_service_type = service_type.into().to_lowercase();
        self
    }

    /// Sets the worker count.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Sets the license verifying key.
    pub fn with_license_key(mut self, key: [u8; 32]) -> Self {
        self.license_key = Some(key);
        self
    }

    /// Qualifies a bare host name with the default domain.
    pub fn qualify(&self, host: &str) -> String {
        if host.contains('.') || self.default_domain.is_empty() {
            host.to_lowercase()
        } else {
            format!("{}.{}", host, self.default_domain).to_lowercase()
        }
    }

    /// Turns an address into a service spec.
    ///
    /// Addresses carrying a scheme are taken as URLs. A bare host name is
    /// qualified and upgraded to `https://<host>:4447/rpc`.
    pub fn service_spec(&self, address: &str) -> ServiceSpec {
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!(
                "https://{}:{}/rpc",
                self.qualify(address),
                DEFAULT_SERVICE_PORT
            )
        };
        ServiceSpec::new(url).with_type(self.default_service_type.clone())
    }
}

impl Default for MultiplexConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One backend service fronted by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Where the service lives. Also the key of the shared service cache.
    pub url: String,
    /// Registered service type. The default type if absent.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Depot the service stands for. Derived from the URL if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_id: Option<String>,
    /// Key the service authenticates the multiplexer with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opsi_host_key: Option<String>,
}

impl ServiceSpec {
    /// Creates a spec for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_type: None,
            depot_id: None,
            opsi_host_key: None,
        }
    }

    /// Sets the service type.
    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into().to_lowercase());
        self
    }

    /// Sets the depot id.
    pub fn with_depot_id(mut self, depot_id: impl Into<String>) -> Self {
        self.depot_id = Some(depot_id.into().to_lowercase());
        self
    }

    /// Sets the host key.
    pub fn with_host_key(mut self, key: impl Into<String>) -> Self {
        self.opsi_host_key = Some(key.into());
        self
    }

    /// Loads a list of specs from a JSON document.
    pub fn list_from_json(text: &str) -> MultiplexResult<Vec<Self>> {
        serde_json::from_str(text)
            .map_err(|e| MultiplexError::Config(format!("invalid service list: {e}")))
    }

    /// Returns the service type, falling back to `default`.
    pub fn service_type_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.service_type.as_deref().unwrap_or(default)
    }

    /// Returns the host part of the URL, without user info or port.
    pub fn host(&self) -> Option<&str> {
        let rest = self.url.split_once("://").map_or(self.url.as_str(), |(_, rest)| rest);
        let authority = rest.split('/').next().unwrap_or_default();
        let authority = authority.rsplit('@').next().unwrap_or_default();
        let host = authority.split(':').next().unwrap_or_default();
        (!host.is_empty()).then_some(host)
    }

    /// Returns the local path of a `file://` URL.
    pub fn file_path(&self) -> Option<&Path> {
        self.url.strip_prefix("file://").map(Path::new)
    }

    /// Resolves the depot id: the explicit one, else the URL host, else
    /// the file stem of a `file://` URL. Bare names get the default
    /// domain.
    pub fn resolve_depot_id(&self, config: &MultiplexConfig) -> MultiplexResult<String> {
        if let Some(depot_id) = &self.depot_id {
            return Ok(depot_id.clone());
        }
        let name = self
            .host()
            .or_else(|| self.file_path()?.file_stem()?.to_str())
            .ok_or_else(|| {
                MultiplexError::Config(format!("cannot derive a depot id from {}", self.url))
            })?;
        Ok(config.qualify(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MultiplexConfig::default();
        assert_eq!(config.service_timeout, Duration::from_secs(30));
        assert_eq!(config.default_service_type, "file");
        assert!(config.license_key.is_none());
    }

    #[test]
    fn config_builder() {
        let config = MultiplexConfig::new()
            .with_service_timeout(Duration::from_secs(5))
            .with_default_domain("example.org")
            .with_default_service_type("Remote")
            .with_worker_count(0)
            .with_license_key([1; 32]);

        assert_eq!(config.service_timeout, Duration::from_secs(5));
        assert_eq!(config.default_service_type, "remote");
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.license_key, Some([1; 32]));
    }

    #[test]
    fn bare_hosts_are_upgraded() {
        let config = MultiplexConfig::new().with_default_domain("example.org");
        let spec = config.service_spec("Depot1");
        assert_eq!(spec.url, "https://depot1.example.org:4447/rpc");
        assert_eq!(spec.service_type.as_deref(), Some("file"));
        assert_eq!(spec.resolve_depot_id(&config).unwrap(), "depot1.example.org");

        let spec = config.service_spec("https://admin@depot2.example.org:4447/rpc");
        assert_eq!(spec.host(), Some("depot2.example.org"));
    }

    #[test]
    fn depot_id_of_file_services() {
        let config = MultiplexConfig::new().with_default_domain("example.org");
        let spec = ServiceSpec::new("file:///var/lib/hostbase/depot3.json");
        assert_eq!(spec.host(), None);
        assert_eq!(spec.resolve_depot_id(&config).unwrap(), "depot3.example.org");

        let explicit = spec.with_depot_id("Other.Example.Org");
        assert_eq!(explicit.resolve_depot_id(&config).unwrap(), "other.example.org");
    }

    #[test]
    fn specs_load_from_json() {
        let specs = ServiceSpec::list_from_json(
            r#"[
                {"url": "https://depot1.example.org:4447/rpc", "type": "remote", "opsiHostKey": "k1"},
                {"url": "file:///srv/depot2.json", "depotId": "depot2.example.org"}
            ]"#,
        )
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].service_type.as_deref(), Some("remote"));
        assert_eq!(specs[0].opsi_host_key.as_deref(), Some("k1"));
        assert_eq!(specs[1].service_type_or("file"), "file");
        assert!(ServiceSpec::list_from_json("{").is_err());
    }
}

//! Sample dataset and backend helpers.
//!
//! The dataset models one config server, two depots and three clients:
//!
//! | Host | Depot |
//! |------|-------|
//! | `client1.example.org` | `depot1.example.org` |
//! | `client2.example.org` | `depot1.example.org` |
//! | `client3.example.org` | `depot2.example.org` |
//!
//! `depot1` carries firefox and office, `depot2` firefox and 7zip.

use hostbase_backend::{Backend, BackendInfo, FileBackend, Filter, InMemoryBackend, ModulesDescriptor, SharedBackend};
use hostbase_object::{Object, ObjectClass, ObjectType, DEPOT_ASSIGNMENT_CONFIG_ID};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// The config server.
pub const CONFIG_SERVER: &str = "config.example.org";
/// First depot.
pub const DEPOT1: &str = "depot1.example.org";
/// Second depot.
pub const DEPOT2: &str = "depot2.example.org";
/// Client on depot1 with pending actions.
pub const CLIENT1: &str = "client1.example.org";
/// Client on depot1.
pub const CLIENT2: &str = "client2.example.org";
/// Client on depot2.
pub const CLIENT3: &str = "client3.example.org";
/// Password of the service account in the sample master.
pub const SERVICE_PASSWORD: &str = "pcpatch-secret";
/// License pool covering office.
pub const OFFICE_POOL: &str = "pool-office";

/// Host key of a sample host.
pub fn host_key(id: &str) -> String {
    format!("{id}-host-key")
}

fn localboot(id: &str, version: &str) -> Object {
    Object::localboot_product(id, version, "1")
}

/// Every object of the sample dataset.
pub fn sample_objects() -> Vec<Object> {
    let mut objects = vec![
        Object::opsi_configserver(CONFIG_SERVER)
            .with("opsiHostKey", host_key(CONFIG_SERVER))
            .with("depotLocalUrl", format!("file:///var/lib/depot/{CONFIG_SERVER}"))
            .with("depotRemoteUrl", format!("smb://{CONFIG_SERVER}/depot")),
        Object::opsi_depotserver(DEPOT1)
            .with("opsiHostKey", host_key(DEPOT1))
            .with("depotRemoteUrl", format!("smb://{DEPOT1}/depot")),
        Object::opsi_depotserver(DEPOT2)
            .with("opsiHostKey", host_key(DEPOT2))
            .with("depotRemoteUrl", format!("smb://{DEPOT2}/depot")),
    ];
    for client in [CLIENT1, CLIENT2, CLIENT3] {
        objects.push(Object::opsi_client(client).with("opsiHostKey", host_key(client)));
    }

    objects.extend([
        localboot("firefox", "115.0"),
        localboot("office", "2021"),
        localboot("7zip", "23.01"),
        Object::unicode_product_property("office", "2021", "1", "language")
            .with("possibleValues", json!(["de", "en"]))
            .with("defaultValues", json!(["en"])),
        Object::new(
            ObjectType::ProductDependency,
            &["office", "2021", "1", "setup", "7zip"],
        )
        .expect("valid dependency ident")
        .with("requiredAction", "setup"),
    ]);

    for (product, version) in [("firefox", "115.0"), ("office", "2021")] {
        objects.push(Object::product_on_depot(product, "LocalbootProduct", version, "1", DEPOT1));
    }
    for (product, version) in [("firefox", "115.0"), ("7zip", "23.01")] {
        objects.push(Object::product_on_depot(product, "LocalbootProduct", version, "1", DEPOT2));
    }

    objects.extend([
        Object::product_on_client("firefox", "LocalbootProduct", CLIENT1)
            .with("installationStatus", "installed")
            .with("actionRequest", "none")
            .with("productVersion", "115.0")
            .with("packageVersion", "1"),
        Object::product_on_client("office", "LocalbootProduct", CLIENT1)
            .with("installationStatus", "not_installed")
            .with("actionRequest", "setup"),
        Object::product_on_client("firefox", "LocalbootProduct", CLIENT2)
            .with("installationStatus", "installed")
            .with("actionRequest", "none"),
        Object::product_on_client("7zip", "LocalbootProduct", CLIENT3)
            .with("installationStatus", "installed")
            .with("actionRequest", "none"),
        Object::product_property_state("office", "language", CLIENT1).with("values", json!(["de"])),
    ]);

    objects.push(
        Object::unicode_config(DEPOT_ASSIGNMENT_CONFIG_ID)
            .with("defaultValues", json!([CONFIG_SERVER]))
            .with("possibleValues", json!([CONFIG_SERVER, DEPOT1, DEPOT2])),
    );
    for (client, depot) in [(CLIENT1, DEPOT1), (CLIENT2, DEPOT1), (CLIENT3, DEPOT2)] {
        objects.push(
            Object::config_state(DEPOT_ASSIGNMENT_CONFIG_ID, client).with("values", json!([depot])),
        );
    }
    objects.push(Object::unicode_config("opsiclientd.event_gui.active"));
    objects.push(
        Object::config_state("opsiclientd.event_gui.active", CLIENT1).with("values", json!(["true"])),
    );

    objects.extend([
        Object::host_group("clients"),
        Object::host_group("lab").with("parentGroupId", "clients"),
        Object::host_group("office").with("parentGroupId", "clients"),
        Object::object_to_group("HostGroup", "lab", CLIENT1),
        Object::object_to_group("HostGroup", "office", CLIENT2),
    ]);

    objects.extend([
        Object::audit_software("firefox", "Mozilla Firefox", "115.0"),
        Object::audit_software_on_client("firefox", "Mozilla Firefox", "115.0", CLIENT1),
        Object::audit_hardware_on_host(CLIENT1, "COMPUTER_SYSTEM")
            .with("name", "client1")
            .with("vendor", "Example Corp"),
    ]);

    objects.extend([
        Object::license_contract("contract-1"),
        Object::retail_software_license("license-office-1", "contract-1").with("maxInstallations", 2),
        Object::license_pool(OFFICE_POOL).with("productIds", json!(["office"])),
        Object::software_license_to_license_pool("license-office-1", OFFICE_POOL)
            .with("licenseKey", "OFFICE-KEY-0001"),
    ]);

    for object in &mut objects {
        object.set_defaults();
    }
    objects
}

/// Backend info of the sample master.
pub fn sample_backend_info() -> BackendInfo {
    BackendInfo {
        opsi_version: "4.3.0.0".to_string(),
        modules: ModulesDescriptor {
            valid: true,
            customer: Some("Example Org".to_string()),
            expires: Some("never".to_string()),
            signature: None,
            ..ModulesDescriptor::default()
        }
        .with_module("license_management", true)
        .with_module("vpn", true)
        .with_module("multiplex", true),
    }
}

/// Hardware inventory schema of the sample master.
pub fn sample_audit_hardware_config() -> serde_json::Value {
    json!([
        {
            "Class": {"Type": "STRUCTURAL", "Opsi": "COMPUTER_SYSTEM"},
            "Values": [
                {"Opsi": "name", "Type": "varchar(100)", "Scope": "g"},
                {"Opsi": "vendor", "Type": "varchar(50)", "Scope": "g"}
            ]
        }
    ])
}

/// An in-memory backend holding the sample dataset, its info, the
/// service password and the hardware schema.
pub fn sample_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::with_info(sample_backend_info());
    backend
        .create_objects(&sample_objects())
        .expect("sample dataset is valid");
    backend
        .user_set_credentials("pcpatch", SERVICE_PASSWORD)
        .expect("in-memory credentials");
    backend.set_audit_hardware_config(sample_audit_hardware_config());
    backend
}

/// [`sample_backend`] as a shared handle.
pub fn shared_sample_backend() -> SharedBackend {
    Arc::new(sample_backend())
}

/// An empty shared in-memory backend.
pub fn empty_backend() -> SharedBackend {
    Arc::new(InMemoryBackend::new())
}

/// Every record of `backend` as `"Class ident"`, for set comparisons.
pub fn object_keys(backend: &dyn Backend) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for class in ObjectClass::ALL {
        let objects = backend
            .get_objects(class, &Filter::new())
            .expect("read all objects");
        for object in objects {
            keys.insert(format!("{} {}", class.name(), object.ident()));
        }
    }
    keys
}

/// Ids of the hosts of one type in `backend`.
pub fn host_ids(backend: &dyn Backend, object_type: ObjectType) -> Vec<String> {
    let mut ids = backend
        .host_get_idents(&Filter::new().with_value("type", object_type.name()))
        .expect("read host idents");
    ids.sort();
    ids
}

/// A file backend in a temporary directory, removed on drop.
pub struct TestFileBackend {
    /// The backend.
    pub backend: FileBackend,
    _temp_dir: TempDir,
}

impl TestFileBackend {
    /// Creates an empty file backend.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("backend").join("objects.json");
        let backend = FileBackend::open_with_create_dirs(&path).expect("Failed to open file backend");
        Self {
            backend,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the document path.
    pub fn path(&self) -> PathBuf {
        self.backend.path().to_path_buf()
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }
}

impl Default for TestFileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestFileBackend {
    type Target = FileBackend;

    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_dataset_is_complete() {
        let backend = sample_backend();
        assert_eq!(host_ids(&backend, ObjectType::OpsiClient).len(), 3);
        // Config servers are depots too.
        assert_eq!(host_ids(&backend, ObjectType::OpsiDepotserver).len(), 3);
        for class in ObjectClass::ALL {
            if class == ObjectClass::LicenseOnClient || class == ObjectClass::AuditHardware {
                continue;
            }
            assert!(
                !backend.get_objects(class, &Filter::new()).unwrap().is_empty(),
                "no {} in sample",
                class.name()
            );
        }
    }

    #[test]
    fn host_keys_differ() {
        assert_ne!(host_key(CLIENT1), host_key(CLIENT2));
    }

    #[test]
    fn file_backend_lives_in_temp_dir() {
        let file = TestFileBackend::new();
        file.insert_object(&Object::opsi_client(CLIENT1)).unwrap();
        assert!(file.path().starts_with(file.dir()));
        assert_eq!(object_keys(&file.backend).len(), 1);
    }
}

//! In-memory backend.

use crate::backend::{validate_ident, Backend};
use crate::credentials::{Credentials, HostKeyCipher};
use crate::error::{BackendError, BackendResult};
use crate::filter::Filter;
use crate::info::BackendInfo;
use hostbase_object::{Ident, Object, ObjectClass};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

type Store = BTreeMap<ObjectClass, BTreeMap<Ident, Object>>;

/// A backend holding every record in memory.
///
/// Suitable for tests, for the local work and snapshot stores of a
/// client cache, and as the engine behind [`crate::FileBackend`].
///
/// # Thread Safety
///
/// All state sits behind `parking_lot` locks; the backend can be shared
/// across threads.
///
/// # Example
///
/// ```rust
/// use hostbase_backend::{Backend, Filter, InMemoryBackend};
/// use hostbase_object::{Object, ObjectClass};
///
/// let backend = InMemoryBackend::new();
/// backend.insert_object(&Object::opsi_client("c1.example.org")).unwrap();
/// let hosts = backend.get_objects(ObjectClass::Host, &Filter::new()).unwrap();
/// assert_eq!(hosts.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: RwLock<Store>,
    info: RwLock<BackendInfo>,
    passwords: RwLock<BTreeMap<String, String>>,
    audit_hardware_config: RwLock<Value>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend reporting `info`.
    #[must_use]
    pub fn with_info(info: BackendInfo) -> Self {
        Self {
            info: RwLock::new(info),
            ..Self::default()
        }
    }

    /// Replaces the reported backend info.
    pub fn set_backend_info(&self, info: BackendInfo) {
        *self.info.write() = info;
    }

    /// Replaces the hardware inventory schema description.
    pub fn set_audit_hardware_config(&self, config: Value) {
        *self.audit_hardware_config.write() = config;
    }

    /// Returns every stored record, ordered by class and ident.
    #[must_use]
    pub fn all_objects(&self) -> Vec<Object> {
        self.objects
            .read()
            .values()
            .flat_map(|records| records.values().cloned())
            .collect()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored passwords by user name.
    pub(crate) fn passwords(&self) -> BTreeMap<String, String> {
        self.passwords.read().clone()
    }

    /// Returns the stored hardware inventory schema.
    pub(crate) fn audit_hardware_config(&self) -> Value {
        self.audit_hardware_config.read().clone()
    }

    /// Replaces all state at once.
    pub(crate) fn load(
        &self,
        objects: Vec<Object>,
        info: BackendInfo,
        passwords: BTreeMap<String, String>,
        audit_hardware_config: Value,
    ) {
        let mut store = Store::new();
        for object in objects {
            store
                .entry(object.class())
                .or_default()
                .insert(object.ident(), object);
        }
        *self.objects.write() = store;
        *self.info.write() = info;
        *self.passwords.write() = passwords;
        *self.audit_hardware_config.write() = audit_hardware_config;
    }
}

impl Backend for InMemoryBackend {
    fn backend_info(&self) -> BackendResult<BackendInfo> {
        Ok(self.info.read().clone())
    }

    fn backend_create_base(&self) -> BackendResult<()> {
        Ok(())
    }

    fn backend_delete_base(&self) -> BackendResult<()> {
        self.objects.write().clear();
        Ok(())
    }

    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }
        let objects = self.objects.read();
        Ok(objects
            .get(&class)
            .map(|records| {
                records
                    .values()
                    .filter(|object| filter.matches(object))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_object(&self, object: &Object) -> BackendResult<()> {
        validate_ident(object)?;
        let mut record = object.clone();
        record.set_defaults();
        self.objects
            .write()
            .entry(record.class())
            .or_default()
            .insert(record.ident(), record);
        Ok(())
    }

    fn update_object(&self, object: &Object) -> BackendResult<()> {
        let ident = object.ident();
        let mut objects = self.objects.write();
        let stored = objects
            .get_mut(&object.class())
            .and_then(|records| records.get_mut(&ident))
            .ok_or_else(|| BackendError::missing_object(object.class().name(), ident.to_string()))?;
        for (name, value) in object.attributes() {
            if !value.is_null() {
                stored.set(name, value.clone());
            }
        }
        Ok(())
    }

    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        for object in objects {
            validate_ident(object)?;
        }
        let mut store = self.objects.write();
        for object in objects {
            let mut record = object.clone();
            record.set_defaults();
            store
                .entry(record.class())
                .or_default()
                .insert(record.ident(), record);
        }
        Ok(())
    }

    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()> {
        let mut store = self.objects.write();
        for object in objects {
            if let Some(records) = store.get_mut(&object.class()) {
                records.remove(&object.ident());
            }
        }
        Ok(())
    }

    fn user_get_credentials(&self, username: &str, host_id: &str) -> BackendResult<Credentials> {
        let password = self
            .passwords
            .read()
            .get(username)
            .cloned()
            .ok_or_else(|| BackendError::missing_object("User", username))?;
        let hosts = self.get_objects(ObjectClass::Host, &Filter::new().with_value("id", host_id))?;
        let host_key = hosts
            .first()
            .and_then(|host| host.get_str("opsiHostKey"))
            .ok_or_else(|| BackendError::missing_object("Host", host_id))?;
        let cipher = HostKeyCipher::new(host_key)?;
        Ok(Credentials {
            username: username.to_string(),
            password: cipher.encrypt(&password)?,
        })
    }

    fn user_set_credentials(&self, username: &str, password: &str) -> BackendResult<()> {
        self.passwords
            .write()
            .insert(username.to_string(), password.to_string());
        Ok(())
    }

    fn audit_hardware_get_config(&self) -> BackendResult<Value> {
        Ok(self.audit_hardware_config.read().clone())
    }
}

//! An instrumented backend for observing and disturbing callers.

use hostbase_backend::{
    Backend, BackendError, BackendInfo, BackendResult, Credentials, Filter, InMemoryBackend,
    SharedBackend,
};
use hostbase_object::{Object, ObjectClass};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One call that reached a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Trait method name (`"insert_object"`).
    pub method: &'static str,
    /// Object class the call addressed, if any.
    pub class: Option<ObjectClass>,
    /// Idents of the objects passed in.
    pub idents: Vec<String>,
}

/// Wraps a backend, recording every call.
///
/// Calls can be made to fail by method name, and reads of a class can be
/// hidden so a backend accepts writes but never shows them.
pub struct RecordingBackend {
    inner: SharedBackend,
    calls: Mutex<Vec<RecordedCall>>,
    failing: RwLock<BTreeSet<&'static str>>,
    hidden: RwLock<BTreeSet<ObjectClass>>,
}

impl RecordingBackend {
    /// Wraps `inner`.
    pub fn new(inner: SharedBackend) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failing: RwLock::new(BTreeSet::new()),
            hidden: RwLock::new(BTreeSet::new()),
        }
    }

    /// Wraps an empty in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &SharedBackend {
        &self.inner
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns how often `method` was called.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Returns how often `method` was called for `class`.
    pub fn call_count_for(&self, method: &str, class: ObjectClass) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && call.class == Some(class))
            .count()
    }

    /// Returns the number of recorded calls.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if any write call was recorded.
    pub fn has_writes(&self) -> bool {
        self.calls.lock().iter().any(|call| {
            matches!(
                call.method,
                "insert_object" | "update_object" | "update_objects" | "create_objects" | "delete_objects"
            )
        })
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Makes every later call of `method` fail.
    pub fn fail_method(&self, method: &'static str) {
        self.failing.write().insert(method);
    }

    /// Undoes [`RecordingBackend::fail_method`].
    pub fn heal_method(&self, method: &'static str) {
        self.failing.write().remove(method);
    }

    /// Makes reads of `class` return nothing.
    pub fn hide_reads(&self, class: ObjectClass) {
        self.hidden.write().insert(class);
    }

    /// Undoes [`RecordingBackend::hide_reads`].
    pub fn show_reads(&self, class: ObjectClass) {
        self.hidden.write().remove(&class);
    }

    fn record(&self, method: &'static str, class: Option<ObjectClass>, objects: &[Object]) -> BackendResult<()> {
        self.calls.lock().push(RecordedCall {
            method,
            class: class.or_else(|| objects.first().map(Object::class)),
            idents: objects.iter().map(|object| object.ident().to_string()).collect(),
        });
        if self.failing.read().contains(method) {
            return Err(BackendError::Remote(format!("injected failure in {method}")));
        }
        Ok(())
    }

    fn is_hidden(&self, class: ObjectClass) -> bool {
        self.hidden.read().contains(&class)
    }
}

impl Backend for RecordingBackend {
    fn backend_info(&self) -> BackendResult<BackendInfo> {
        self.record("backend_info", None, &[])?;
        self.inner.backend_info()
    }

    fn backend_create_base(&self) -> BackendResult<()> {
        self.record("backend_create_base", None, &[])?;
        self.inner.backend_create_base()
    }

    fn backend_delete_base(&self) -> BackendResult<()> {
        self.record("backend_delete_base", None, &[])?;
        self.inner.backend_delete_base()
    }

    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>> {
        self.record("get_objects", Some(class), &[])?;
        if self.is_hidden(class) {
            return Ok(Vec::new());
        }
        self.inner.get_objects(class, filter)
    }

    fn insert_object(&self, object: &Object) -> BackendResult<()> {
        self.record("insert_object", None, std::slice::from_ref(object))?;
        self.inner.insert_object(object)
    }

    fn update_object(&self, object: &Object) -> BackendResult<()> {
        self.record("update_object", None, std::slice::from_ref(object))?;
        self.inner.update_object(object)
    }

    fn update_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.record("update_objects", None, objects)?;
        self.inner.update_objects(objects)
    }

    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.record("create_objects", None, objects)?;
        self.inner.create_objects(objects)
    }

    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.record("delete_objects", None, objects)?;
        self.inner.delete_objects(objects)
    }

    fn get_idents(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<String>> {
        self.record("get_idents", Some(class), &[])?;
        if self.is_hidden(class) {
            return Ok(Vec::new());
        }
        self.inner.get_idents(class, filter)
    }

    fn host_get_idents(&self, filter: &Filter) -> BackendResult<Vec<String>> {
        self.record("host_get_idents", Some(ObjectClass::Host), &[])?;
        if self.is_hidden(ObjectClass::Host) {
            return Ok(Vec::new());
        }
        self.inner.host_get_idents(filter)
    }

    fn host_rename_depotserver(&self, old_id: &str, new_id: &str) -> BackendResult<()> {
        self.record("host_rename_depotserver", Some(ObjectClass::Host), &[])?;
        self.inner.host_rename_depotserver(old_id, new_id)
    }

    fn audit_hardware_on_host_set_obsolete(&self, host_id: &str) -> BackendResult<()> {
        self.record(
            "audit_hardware_on_host_set_obsolete",
            Some(ObjectClass::AuditHardwareOnHost),
            &[],
        )?;
        self.inner.audit_hardware_on_host_set_obsolete(host_id)
    }

    fn audit_software_on_client_set_obsolete(&self, client_id: &str) -> BackendResult<()> {
        self.record(
            "audit_software_on_client_set_obsolete",
            Some(ObjectClass::AuditSoftwareOnClient),
            &[],
        )?;
        self.inner.audit_software_on_client_set_obsolete(client_id)
    }

    fn license_on_client_get_or_create(
        &self,
        client_id: &str,
        product_id: &str,
        license_pool_id: Option<&str>,
    ) -> BackendResult<Object> {
        self.record(
            "license_on_client_get_or_create",
            Some(ObjectClass::LicenseOnClient),
            &[],
        )?;
        self.inner
            .license_on_client_get_or_create(client_id, product_id, license_pool_id)
    }

    fn user_get_credentials(&self, username: &str, host_id: &str) -> BackendResult<Credentials> {
        self.record("user_get_credentials", None, &[])?;
        self.inner.user_get_credentials(username, host_id)
    }

    fn user_set_credentials(&self, username: &str, password: &str) -> BackendResult<()> {
        self.record("user_set_credentials", None, &[])?;
        self.inner.user_set_credentials(username, password)
    }

    fn audit_hardware_get_config(&self) -> BackendResult<Value> {
        self.record("audit_hardware_get_config", None, &[])?;
        self.inner.audit_hardware_get_config()
    }
}

impl std::fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("calls", &self.calls.lock().len())
            .field("failing", &*self.failing.read())
            .field("hidden", &*self.hidden.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::CLIENT1;

    #[test]
    fn counts_calls_per_method_and_class() {
        let backend = RecordingBackend::in_memory();
        backend.insert_object(&Object::opsi_client(CLIENT1)).unwrap();
        backend.get_objects(ObjectClass::Host, &Filter::new()).unwrap();
        backend.get_objects(ObjectClass::Config, &Filter::new()).unwrap();

        assert_eq!(backend.call_count("get_objects"), 2);
        assert_eq!(backend.call_count_for("get_objects", ObjectClass::Host), 1);
        assert_eq!(backend.call_count_for("insert_object", ObjectClass::Host), 1);
        assert_eq!(backend.calls()[0].idents, vec![CLIENT1.to_string()]);
        assert!(backend.has_writes());
    }

    #[test]
    fn injected_failures() {
        let backend = RecordingBackend::in_memory();
        backend.fail_method("insert_object");
        assert!(backend.insert_object(&Object::opsi_client(CLIENT1)).is_err());
        assert_eq!(backend.call_count("insert_object"), 1);

        backend.heal_method("insert_object");
        backend.insert_object(&Object::opsi_client(CLIENT1)).unwrap();
    }

    #[test]
    fn hidden_reads_keep_writes() {
        let backend = RecordingBackend::in_memory();
        backend.hide_reads(ObjectClass::Host);
        backend.insert_object(&Object::opsi_client(CLIENT1)).unwrap();
        assert!(backend.get_objects(ObjectClass::Host, &Filter::new()).unwrap().is_empty());

        backend.show_reads(ObjectClass::Host);
        assert_eq!(backend.get_objects(ObjectClass::Host, &Filter::new()).unwrap().len(), 1);
    }
}

//! Offline-capable client view of a master backend.

use crate::config::{CacheConfig, ReplicatorOptions};
use crate::conflict::{resolve_delete, resolve_update, Resolution, SkipReason};
use crate::error::{SyncError, SyncResult};
use crate::modification::{Command, Modification, ModificationTracker};
use crate::replicator::{BackendReplicator, ReplicationReport, ReplicationScope};
use hostbase_backend::{
    Backend, BackendError, BackendInfo, BackendResult, Credentials, Filter, HostKeyCipher,
    IdSelection, SharedBackend,
};
use hostbase_object::{Object, ObjectClass};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Account whose credentials the cache keeps for local services.
pub const SERVICE_USER: &str = "pcpatch";

/// Counters of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// ProductOnClient deletes sent to the master.
    pub deleted: usize,
    /// ProductOnClient updates sent to the master.
    pub updated: usize,
    /// ProductOnClient records created on the master.
    pub created: usize,
    /// Inventory records pushed to the master.
    pub audit_pushed: usize,
    /// Local changes dropped in favour of the master's state.
    pub skipped: usize,
    /// Local action requests dropped in favour of the master's.
    pub action_requests_dropped: usize,
    /// Modifications that could not be resolved.
    pub failed: usize,
}

/// Builds a [`ClientCacheBackend`].
#[derive(Default)]
pub struct ClientCacheBuilder {
    work: Option<SharedBackend>,
    snapshot: Option<SharedBackend>,
    master: Option<SharedBackend>,
    client_id: Option<String>,
    depot_id: Option<String>,
    config: CacheConfig,
}

impl ClientCacheBuilder {
    /// Creates a builder with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local store used for every day-to-day call.
    pub fn work_backend(mut self, backend: SharedBackend) -> Self {
        self.work = Some(backend);
        self
    }

    /// Copy of the work store taken at the last sync.
    pub fn snapshot_backend(mut self, backend: SharedBackend) -> Self {
        self.snapshot = Some(backend);
        self
    }

    /// Authoritative remote store.
    pub fn master_backend(mut self, backend: SharedBackend) -> Self {
        self.master = Some(backend);
        self
    }

    /// Id of the client this cache serves.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into().to_lowercase());
        self
    }

    /// Id of the client's depot.
    pub fn depot_id(mut self, id: impl Into<String>) -> Self {
        self.depot_id = Some(id.into().to_lowercase());
        self
    }

    /// Local files to maintain.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingCollaborator`] naming the first
    /// collaborator that was not supplied.
    pub fn build(self) -> SyncResult<ClientCacheBackend> {
        let work = self.work.ok_or_else(|| SyncError::missing("Work backend"))?;
        let snapshot = self
            .snapshot
            .ok_or_else(|| SyncError::missing("Snapshot backend"))?;
        let master = self
            .master
            .ok_or_else(|| SyncError::missing("Master backend"))?;
        let client_id = self
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::missing("Client id"))?;
        let depot_id = self
            .depot_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::missing("Depot id"))?;
        Ok(ClientCacheBackend {
            work,
            snapshot,
            master,
            client_id,
            depot_id,
            config: self.config,
            tracker: ModificationTracker::new(),
            passwords: RwLock::new(BTreeMap::new()),
            info: RwLock::new(None),
            audit_hardware_config: RwLock::new(None),
        })
    }
}

/// One client's view of the master dataset, served from a local work
/// backend and reconciled with the master on demand.
///
/// Every CRUD call goes to the work backend; mutations are also recorded
/// in a [`ModificationTracker`]. Only the two sync operations talk to the
/// master.
pub struct ClientCacheBackend {
    work: SharedBackend,
    snapshot: SharedBackend,
    master: SharedBackend,
    client_id: String,
    depot_id: String,
    config: CacheConfig,
    tracker: ModificationTracker,
    passwords: RwLock<BTreeMap<String, String>>,
    info: RwLock<Option<BackendInfo>>,
    audit_hardware_config: RwLock<Option<Value>>,
}

impl ClientCacheBackend {
    /// Starts building a cache.
    pub fn builder() -> ClientCacheBuilder {
        ClientCacheBuilder::new()
    }

    /// The served client.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The client's depot.
    pub fn depot_id(&self) -> &str {
        &self.depot_id
    }

    /// Local modifications not yet pushed to the master.
    pub fn tracker(&self) -> &ModificationTracker {
        &self.tracker
    }

    /// Refreshes the work and snapshot stores from the master.
    ///
    /// Copies the config server, this depot and this client (no inventory,
    /// no licenses) into the work store, then the whole work store into
    /// the snapshot. Reserves licenses for pending actions, fetches the
    /// service credentials and the hardware inventory schema, and writes
    /// the configured local files. Pending local modifications are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Master and local I/O errors propagate. A failed license
    /// reservation is only logged.
    pub fn replicate_master_to_work_backend(&self) -> SyncResult<ReplicationReport> {
        info!(client_id = %self.client_id, depot_id = %self.depot_id, "replicating master to work backend");

        self.work.backend_delete_base()?;
        self.work.backend_create_base()?;
        let scope = ReplicationScope::new()
            .with_depots(IdSelection::exactly([self.depot_id.clone()]))
            .with_clients(IdSelection::exactly([self.client_id.clone()]))
            .with_audit(false);
        let report = BackendReplicator::new(
            self.master.clone(),
            self.work.clone(),
            ReplicatorOptions::new().with_cleanup_first(false),
        )
        .replicate(&scope)?;

        self.snapshot.backend_delete_base()?;
        self.snapshot.backend_create_base()?;
        BackendReplicator::new(
            self.work.clone(),
            self.snapshot.clone(),
            ReplicatorOptions::new().with_cleanup_first(false),
        )
        .replicate(&ReplicationScope::everything())?;

        self.reserve_licenses()?;
        self.store_credentials()?;
        self.store_backend_info()?;
        self.store_audit_hardware_config()?;

        self.work.backend_create_base()?;
        self.tracker.clear();
        info!(written = report.written(), "work backend refreshed");
        Ok(report)
    }

    /// Pushes the tracked local modifications to the master.
    ///
    /// On error the drained modifications are put back so a later run can
    /// retry them.
    pub fn update_master_from_work_backend(&self) -> SyncResult<ReconcileReport> {
        let modifications = self.tracker.drain();
        match self.update_master_from_modifications(&modifications) {
            Ok(report) => Ok(report),
            Err(err) => {
                self.tracker.restore(modifications);
                Err(err)
            }
        }
    }

    /// Pushes the given local modifications to the master.
    ///
    /// Hardware and per-client software inventory are replaced wholesale,
    /// the software catalogue is pushed as is, and ProductOnClient changes
    /// are reconciled against the snapshot and the master's current state.
    /// Modifications that cannot be resolved are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails if a master call fails.
    pub fn update_master_from_modifications(
        &self,
        modifications: &[Modification],
    ) -> SyncResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut by_class: BTreeMap<ObjectClass, Vec<&Modification>> = BTreeMap::new();
        for modification in modifications {
            by_class
                .entry(modification.object_class)
                .or_default()
                .push(modification);
        }

        for (class, modifications) in by_class {
            match class {
                ObjectClass::AuditHardwareOnHost => {
                    self.master
                        .audit_hardware_on_host_set_obsolete(&self.client_id)?;
                    let current = self.work.get_objects(
                        class,
                        &Filter::new().with_value("hostId", self.client_id.as_str()),
                    )?;
                    self.master.create_objects(&current)?;
                    report.audit_pushed += current.len();
                }
                ObjectClass::AuditSoftware => {
                    let mut current = Vec::new();
                    for modification in modifications {
                        if modification.command == Command::Delete {
                            continue;
                        }
                        match self.load(&*self.work, modification) {
                            Ok(Some(object)) => current.push(object),
                            Ok(None) => {
                                warn!(ident = %modification.ident, "software no longer in work backend");
                            }
                            Err(err) => {
                                error!(ident = %modification.ident, %err, "failed to resolve modification");
                                report.failed += 1;
                            }
                        }
                    }
                    self.push_software(&current, &mut report);
                }
                ObjectClass::AuditSoftwareOnClient => {
                    self.master
                        .audit_software_on_client_set_obsolete(&self.client_id)?;
                    let current = self.work.get_objects(
                        class,
                        &Filter::new().with_value("clientId", self.client_id.as_str()),
                    )?;
                    self.master.create_objects(&current)?;
                    report.audit_pushed += current.len();
                }
                ObjectClass::ProductOnClient => {
                    self.reconcile_product_on_client(&modifications, &mut report)?;
                }
                other => {
                    debug!(
                        class = other.name(),
                        count = modifications.len(),
                        "modifications of this class stay local"
                    );
                }
            }
        }

        info!(
            deleted = report.deleted,
            updated = report.updated,
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "master updated from work backend"
        );
        Ok(report)
    }

    /// Software items are shared by all clients, so they are merged into
    /// the master's records rather than replacing them. Unknown items are
    /// created.
    fn push_software(&self, software: &[Object], report: &mut ReconcileReport) {
        for item in software {
            let pushed = match self.master.update_object(item) {
                Err(BackendError::MissingObject { .. }) => self.master.insert_object(item),
                other => other,
            };
            match pushed {
                Ok(()) => report.audit_pushed += 1,
                Err(err) => {
                    error!(ident = %item.ident(), %err, "failed to push software item");
                    report.failed += 1;
                }
            }
        }
    }

    fn reconcile_product_on_client(
        &self,
        modifications: &[&Modification],
        report: &mut ReconcileReport,
    ) -> SyncResult<()> {
        // The last modification of a record decides.
        let mut latest: BTreeMap<&str, &Modification> = BTreeMap::new();
        for modification in modifications.iter().copied() {
            latest.insert(modification.ident.as_str(), modification);
        }

        let mut deletes = Vec::new();
        let mut updates = Vec::new();
        let mut creates = Vec::new();
        for modification in latest.into_values() {
            let filter = match ident_filter(modification) {
                Ok(filter) => filter,
                Err(err) => {
                    error!(ident = %modification.ident, %err, "failed to resolve modification");
                    report.failed += 1;
                    continue;
                }
            };
            let master = first(self.master.get_objects(ObjectClass::ProductOnClient, &filter)?);
            let known = first(self.snapshot.get_objects(ObjectClass::ProductOnClient, &filter)?);

            let resolution = if modification.command == Command::Delete {
                let Some(local) = known.clone().or_else(|| modification.object.clone()) else {
                    error!(ident = %modification.ident, "deleted record unknown to snapshot");
                    report.failed += 1;
                    continue;
                };
                resolve_delete(&local, known.as_ref(), master.as_ref())
            } else {
                let Some(local) =
                    first(self.work.get_objects(ObjectClass::ProductOnClient, &filter)?)
                else {
                    error!(ident = %modification.ident, "modified record missing in work backend");
                    report.failed += 1;
                    continue;
                };
                resolve_update(&local, known.as_ref(), master.as_ref())
            };

            match resolution {
                Resolution::Delete(object) => deletes.push(object),
                Resolution::Update {
                    object,
                    action_request_dropped,
                } => {
                    if action_request_dropped {
                        info!(ident = %modification.ident, "action request changed on server, keeping server value");
                        report.action_requests_dropped += 1;
                    }
                    updates.push(object);
                }
                Resolution::Create(object) => creates.push(object),
                Resolution::Skip(reason) => {
                    match reason {
                        SkipReason::DeletedOnServer => {
                            info!(ident = %modification.ident, "record deleted on server, dropping local change")
                        }
                        SkipReason::ModifiedOnServer => {
                            info!(ident = %modification.ident, "record changed on server, dropping local delete")
                        }
                    }
                    report.skipped += 1;
                }
            }
        }

        if !deletes.is_empty() {
            self.master.delete_objects(&deletes)?;
            report.deleted += deletes.len();
        }
        if !updates.is_empty() {
            self.master.update_objects(&updates)?;
            report.updated += updates.len();
        }
        if !creates.is_empty() {
            self.master.create_objects(&creates)?;
            report.created += creates.len();
        }
        Ok(())
    }

    fn load(&self, backend: &dyn Backend, modification: &Modification) -> SyncResult<Option<Object>> {
        let filter = ident_filter(modification)?;
        Ok(first(backend.get_objects(modification.object_class, &filter)?))
    }

    /// Reserves a license on the master for every product with a pending
    /// action that is managed by a license pool.
    fn reserve_licenses(&self) -> SyncResult<()> {
        let product_states = self.work.get_objects(
            ObjectClass::ProductOnClient,
            &Filter::new().with_value("clientId", self.client_id.as_str()),
        )?;
        for state in product_states {
            let Some(product_id) = state.get_str("productId") else {
                continue;
            };
            if matches!(state.get_str("actionRequest"), None | Some("none")) {
                continue;
            }
            let pools = self.master.get_objects(
                ObjectClass::LicensePool,
                &Filter::new().with_value("productIds", product_id),
            )?;
            if pools.is_empty() {
                continue;
            }
            if let Err(err) = self.reserve_license(product_id) {
                error!(product_id, %err, "failed to reserve license");
            }
        }
        Ok(())
    }

    fn reserve_license(&self, product_id: &str) -> SyncResult<()> {
        let reservation =
            self.master
                .license_on_client_get_or_create(&self.client_id, product_id, None)?;
        if let Some(pool_id) = reservation.get_str("licensePoolId") {
            for pool in self
                .master
                .get_objects(ObjectClass::LicensePool, &Filter::new().with_value("id", pool_id))?
            {
                self.work.insert_object(&pool)?;
            }
        }
        if let Some(license_id) = reservation.get_str("softwareLicenseId") {
            for license in self.master.get_objects(
                ObjectClass::SoftwareLicense,
                &Filter::new().with_value("id", license_id),
            )? {
                self.work.insert_object(&license)?;
            }
        }
        self.work.insert_object(&reservation)?;
        debug!(product_id, "license reserved");
        Ok(())
    }

    fn store_credentials(&self) -> SyncResult<()> {
        let credentials = self
            .master
            .user_get_credentials(SERVICE_USER, &self.client_id)?;
        let host_key = self.client_host_key()?;
        let cipher = HostKeyCipher::new(&host_key)?;
        let password = cipher.decrypt(&credentials.password)?;
        // The passwd file never holds the plain password: it is sealed again
        // under this client's host key with a fresh nonce.
        if let Some(path) = &self.config.passwd_file {
            let sealed = cipher.encrypt(&password)?;
            write_file(path, &format!("{}:{}\n", credentials.username, sealed))?;
        }
        self.passwords
            .write()
            .insert(credentials.username, password);
        Ok(())
    }

    fn store_backend_info(&self) -> SyncResult<()> {
        let info = self.master.backend_info()?;
        if let Some(path) = &self.config.modules_file {
            write_file(path, &info.modules.to_modules_file())?;
        }
        if let Some(path) = &self.config.version_file {
            write_file(path, &info.opsi_version)?;
        }
        *self.info.write() = Some(info);
        Ok(())
    }

    fn store_audit_hardware_config(&self) -> SyncResult<()> {
        let config = self.master.audit_hardware_get_config()?;
        if let Some(path) = &self.config.audit_hardware_config_file {
            write_file(path, &serde_json::to_string_pretty(&config)?)?;
        }
        *self.audit_hardware_config.write() = Some(config);
        Ok(())
    }

    fn client_host_key(&self) -> BackendResult<String> {
        host_key(&*self.work, &self.client_id)
    }
}

fn host_key(backend: &dyn Backend, host_id: &str) -> BackendResult<String> {
    let hosts = backend.get_objects(ObjectClass::Host, &Filter::new().with_value("id", host_id))?;
    hosts
        .first()
        .and_then(|host| host.get_str("opsiHostKey"))
        .map(str::to_string)
        .ok_or_else(|| BackendError::missing_object("Host", host_id))
}

fn ident_filter(modification: &Modification) -> SyncResult<Filter> {
    let pairs = modification
        .object_class
        .parse_ident(&modification.ident)?
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)));
    Ok(Filter::from_ident_pairs(pairs))
}

fn first(objects: Vec<Object>) -> Option<Object> {
    objects.into_iter().next()
}

fn write_file(path: &Path, contents: &str) -> SyncResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

impl Backend for ClientCacheBackend {
    fn backend_info(&self) -> BackendResult<BackendInfo> {
        match self.info.read().as_ref() {
            Some(info) => Ok(info.clone()),
            None => self.work.backend_info(),
        }
    }

    fn backend_create_base(&self) -> BackendResult<()> {
        self.work.backend_create_base()
    }

    fn backend_delete_base(&self) -> BackendResult<()> {
        self.work.backend_delete_base()
    }

    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>> {
        self.work.get_objects(class, filter)
    }

    fn insert_object(&self, object: &Object) -> BackendResult<()> {
        self.work.insert_object(object)?;
        self.tracker.record(Modification::of(Command::Insert, object));
        Ok(())
    }

    fn update_object(&self, object: &Object) -> BackendResult<()> {
        self.work.update_object(object)?;
        self.tracker.record(Modification::of(Command::Update, object));
        Ok(())
    }

    fn update_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.work.update_objects(objects)?;
        self.tracker.record_all(Command::Update, objects);
        Ok(())
    }

    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.work.create_objects(objects)?;
        self.tracker.record_all(Command::Insert, objects);
        Ok(())
    }

    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.work.delete_objects(objects)?;
        self.tracker.record_all(Command::Delete, objects);
        Ok(())
    }

    fn get_idents(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<String>> {
        self.work.get_idents(class, filter)
    }

    fn host_get_idents(&self, filter: &Filter) -> BackendResult<Vec<String>> {
        self.work.host_get_idents(filter)
    }

    fn user_get_credentials(&self, username: &str, host_id: &str) -> BackendResult<Credentials> {
        let password = self
            .passwords
            .read()
            .get(username)
            .cloned()
            .ok_or_else(|| BackendError::missing_object("User", username))?;
        let cipher = HostKeyCipher::new(&host_key(&*self.work, host_id)?)?;
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
        self.audit_hardware_config
            .read()
            .clone()
            .ok_or_else(|| BackendError::not_supported("auditHardware_getConfig"))
    }
}

impl std::fmt::Debug for ClientCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCacheBackend")
            .field("client_id", &self.client_id)
            .field("depot_id", &self.depot_id)
            .field("pending", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbase_backend::InMemoryBackend;
    use std::sync::Arc;

    fn memory() -> SharedBackend {
        Arc::new(InMemoryBackend::new())
    }

    #[test]
    fn builder_requires_every_collaborator() {
        let err = ClientCacheBackend::builder().build().unwrap_err();
        assert_eq!(err.to_string(), "Work backend undefined");

        let err = ClientCacheBackend::builder()
            .work_backend(memory())
            .snapshot_backend(memory())
            .master_backend(memory())
            .client_id("c1.example.org")
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Depot id undefined");
        assert!(err.is_configuration());
    }

    #[test]
    fn mutations_are_tracked_and_forwarded() {
        let work = memory();
        let cache = ClientCacheBackend::builder()
            .work_backend(work.clone())
            .snapshot_backend(memory())
            .master_backend(memory())
            .client_id("C1.example.org")
            .depot_id("depot.example.org")
            .build()
            .unwrap();
        assert_eq!(cache.client_id(), "c1.example.org");

        let poc = Object::product_on_client("firefox", "LocalbootProduct", "c1.example.org");
        cache.insert_object(&poc).unwrap();
        cache
            .update_object(&poc.clone().with("actionRequest", "setup"))
            .unwrap();
        cache.delete_objects(&[poc.clone()]).unwrap();

        let commands: Vec<Command> = cache
            .tracker()
            .pending()
            .into_iter()
            .map(|m| m.command)
            .collect();
        assert_eq!(commands, vec![Command::Insert, Command::Update, Command::Delete]);
        assert!(work
            .get_objects(ObjectClass::ProductOnClient, &Filter::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn admin_calls_are_local() {
        let cache = ClientCacheBackend::builder()
            .work_backend(memory())
            .snapshot_backend(memory())
            .master_backend(memory())
            .client_id("c1.example.org")
            .depot_id("depot.example.org")
            .build()
            .unwrap();
        assert!(matches!(
            cache.audit_hardware_get_config(),
            Err(BackendError::NotSupported { .. })
        ));
        cache.user_set_credentials("pcpatch", "secret").unwrap();
        assert!(cache.tracker().is_empty());
    }
}

//! The multiplex backend.
//!
//! [`MultiplexBackend`] fronts several services and implements the backend
//! contract itself. Most calls fan out to the services owning the ids the
//! call mentions and their results are concatenated. A few classes route to
//! exactly one service:
//!
//! - new clients and software licenses are staged until a depot assignment
//!   or pool assignment says where they belong
//! - a depot assignment (`clientconfig.depot.id`) places or moves the client
//! - license pools, pool memberships and license reservations go to the
//!   service holding the pool

use crate::call::{BackendCall, CallOutput};
use crate::config::{MultiplexConfig, ServiceSpec};
use crate::error::{MultiplexError, MultiplexResult};
use crate::license::LicenseGate;
use crate::pool::{Job, JobOutcome, WorkerPool};
use crate::relocation::{self, RelocationOutcome};
use crate::service::{Service, ServiceCache, ServiceRegistry};
use hostbase_backend::{Backend, BackendError, BackendInfo, BackendResult, Filter, SharedBackend};
use hostbase_object::{Object, ObjectClass, ObjectType, DEPOT_ASSIGNMENT_CONFIG_ID};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

type StagingKey = (ObjectClass, String);

fn is_depot_assignment(object: &Object) -> bool {
    object.class() == ObjectClass::ConfigState
        && object.get_str("configId") == Some(DEPOT_ASSIGNMENT_CONFIG_ID)
}

fn staging_key(object: &Object) -> Option<StagingKey> {
    let id = object.id()?;
    match object.class() {
        ObjectClass::Host if object.object_type() == ObjectType::OpsiClient => {
            Some((ObjectClass::Host, id.to_string()))
        }
        ObjectClass::SoftwareLicense => Some((ObjectClass::SoftwareLicense, id.to_string())),
        _ => None,
    }
}

fn single_value(filter: &Filter, name: &str) -> Option<String> {
    match filter.strings(name)?.as_slice() {
        [only] => Some((*only).to_string()),
        _ => None,
    }
}

fn changes_membership(call: &BackendCall) -> bool {
    call.is_mutation()
        && matches!(
            call.class(),
            Some(ObjectClass::Host | ObjectClass::LicensePool)
        )
}

/// Builder for [`MultiplexBackend`].
#[derive(Default)]
pub struct MultiplexBackendBuilder {
    context: Option<SharedBackend>,
    config: MultiplexConfig,
    specs: Vec<ServiceSpec>,
    registry: Option<ServiceRegistry>,
    cache: Option<ServiceCache>,
}

impl MultiplexBackendBuilder {
    /// Sets the context backend. It answers `backend_info` and carries the
    /// module license.
    pub fn context(mut self, context: SharedBackend) -> Self {
        self.context = Some(context);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: MultiplexConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a service.
    pub fn service(mut self, spec: ServiceSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Adds several services.
    pub fn services(mut self, specs: impl IntoIterator<Item = ServiceSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Sets the factories services connect through.
    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Shares services with other multiplexers holding the same cache.
    pub fn cache(mut self, cache: ServiceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Checks the license, creates the services and connects them.
    ///
    /// Services that fail to connect are logged and left out of routing.
    ///
    /// # Errors
    ///
    /// Fails if no context or service is configured, or if the context's
    /// module license does not allow multiplexing.
    pub fn build(self) -> MultiplexResult<MultiplexBackend> {
        let context = self
            .context
            .ok_or_else(|| MultiplexError::Config("Context backend undefined".into()))?;
        if self.specs.is_empty() {
            return Err(MultiplexError::Config("no services configured".into()));
        }
        let key = self
            .config
            .license_key
            .ok_or_else(|| MultiplexError::License("no license key configured".into()))?;
        let gate = LicenseGate::new(&key)?;
        gate.check(&context.backend_info()?.modules)?;

        let cache = self.cache.unwrap_or_default();
        let mut services: Vec<Arc<Service>> = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let service = cache.get_or_create(spec, &self.config)?;
            if !services.iter().any(|known| Arc::ptr_eq(known, &service)) {
                services.push(service);
            }
        }
        let pool = WorkerPool::new(self.config.worker_count, self.config.service_timeout)?;

        let backend = MultiplexBackend {
            config: self.config,
            context,
            gate,
            services,
            registry: Arc::new(self.registry.unwrap_or_default()),
            cache,
            pool,
            staging: Mutex::new(BTreeMap::new()),
            relocation_lock: Mutex::new(()),
        };
        backend.connect();
        Ok(backend)
    }
}

/// Presents several backend services as one backend.
pub struct MultiplexBackend {
    config: MultiplexConfig,
    context: SharedBackend,
    gate: LicenseGate,
    services: Vec<Arc<Service>>,
    registry: Arc<ServiceRegistry>,
    cache: ServiceCache,
    pool: WorkerPool,
    staging: Mutex<BTreeMap<StagingKey, Object>>,
    relocation_lock: Mutex<()>,
}

impl MultiplexBackend {
    /// Starts a builder.
    pub fn builder() -> MultiplexBackendBuilder {
        MultiplexBackendBuilder::default()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MultiplexConfig {
        &self.config
    }

    /// Returns the services in configuration order.
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// Returns the service at `url`.
    pub fn service(&self, url: &str) -> Option<&Arc<Service>> {
        self.services.iter().find(|service| service.url() == url)
    }

    /// Returns the service cache.
    pub fn cache(&self) -> &ServiceCache {
        &self.cache
    }

    /// Returns the depot id of every service.
    pub fn depot_ids(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|service| service.depot_id().to_string())
            .collect()
    }

    /// Returns a staged object.
    pub fn staged(&self, class: ObjectClass, id: &str) -> Option<Object> {
        self.staging.lock().get(&(class, id.to_string())).cloned()
    }

    /// Returns the number of staged objects.
    pub fn staged_count(&self) -> usize {
        self.staging.lock().len()
    }

    /// Connects every service not yet connected and waits for all of them.
    ///
    /// Outcomes are reported per service; failures are not retried.
    pub fn connect(&self) -> Vec<JobOutcome<()>> {
        let _guard = self.relocation_lock.lock();
        let jobs: Vec<Job<()>> = self
            .services
            .iter()
            .filter(|service| !service.is_connected())
            .map(|service| {
                let service = Arc::clone(service);
                let registry = Arc::clone(&self.registry);
                Job::new(service.url().to_string(), move || {
                    service.connect(&registry).map_err(|e| e.to_string())
                })
            })
            .collect();
        if jobs.is_empty() {
            return Vec::new();
        }
        let outcomes = self.pool.run_all(jobs);
        let connected = self.connected_services().len();
        if connected == 0 {
            tracing::warn!(total = self.services.len(), "no service connected");
        } else {
            tracing::info!(connected, total = self.services.len(), "services connected");
        }
        outcomes
    }

    fn connected_services(&self) -> Vec<Arc<Service>> {
        self.services
            .iter()
            .filter(|service| service.is_connected())
            .cloned()
            .collect()
    }

    fn find_service(&self, predicate: impl Fn(&Service) -> bool) -> Option<Arc<Service>> {
        self.services
            .iter()
            .find(|service| service.is_connected() && predicate(service))
            .cloned()
    }

    /// The service holding the license pool a pool assignment names.
    fn pool_owner(&self, object: &Object) -> Option<Arc<Service>> {
        let pool_id = object.get_str("licensePoolId")?;
        self.find_service(|s| s.has_license_pool(pool_id))
    }

    fn check_license(&self) -> MultiplexResult<()> {
        let info = self.context.backend_info()?;
        self.gate.check(&info.modules)
    }

    /// Returns the services a call goes to: the owners of any id it
    /// mentions, or every connected service if none owns one.
    pub fn targets(&self, call: &BackendCall) -> Vec<Arc<Service>> {
        let connected = self.connected_services();
        let ids = call.referenced_ids();
        let owners: Vec<Arc<Service>> = connected
            .iter()
            .filter(|service| ids.iter().any(|id| service.owns(id)))
            .cloned()
            .collect();
        if owners.is_empty() {
            connected
        } else {
            owners
        }
    }

    /// Runs `call` on its targets concurrently.
    pub fn dispatch(&self, call: &BackendCall) -> Vec<JobOutcome<CallOutput>> {
        self.dispatch_to(&self.targets(call), call)
    }

    fn dispatch_to(&self, targets: &[Arc<Service>], call: &BackendCall) -> Vec<JobOutcome<CallOutput>> {
        tracing::debug!(
            method = %call.method_name(),
            targets = ?targets.iter().map(|service| service.url()).collect::<Vec<_>>(),
            "dispatching call"
        );
        let jobs: Vec<Job<CallOutput>> = targets
            .iter()
            .map(|service| {
                let service = Arc::clone(service);
                let call = call.clone();
                Job::new(service.url().to_string(), move || {
                    let backend = service.backend().map_err(|e| e.to_string())?;
                    call.invoke(&*backend).map_err(|e| e.to_string())
                })
            })
            .collect();
        let outcomes = self.pool.run_all(jobs);
        if changes_membership(call) {
            for service in targets {
                if let Err(e) = service.refresh() {
                    tracing::warn!(url = %service.url(), error = %e, "failed to refresh service");
                }
            }
        }
        outcomes
    }

    fn merge(method: &str, outcomes: Vec<JobOutcome<CallOutput>>) -> CallOutput {
        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.result {
                Some(output) => results.push(output),
                None => tracing::error!(
                    method,
                    url = %outcome.label,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "service call failed"
                ),
            }
        }
        CallOutput::concat(results)
    }

    fn fan_out(&self, call: &BackendCall) -> CallOutput {
        Self::merge(&call.method_name(), self.dispatch(call))
    }

    fn call_on(&self, service: &Service, call: &BackendCall) -> MultiplexResult<CallOutput> {
        tracing::debug!(method = %call.method_name(), url = %service.url(), "routing call to owner");
        let output = call.invoke(&*service.backend()?)?;
        if changes_membership(call) {
            service.refresh()?;
        }
        Ok(output)
    }

    /// Runs a named call.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::NoServiceImplements`] for unknown names, and any
    /// error of [`MultiplexBackend::execute`].
    pub fn call(&self, method: &str, params: &[Value]) -> MultiplexResult<Vec<Value>> {
        let call = BackendCall::parse(method, params)?;
        Ok(self.execute(call)?.into_values())
    }

    /// Routes and runs one call.
    ///
    /// Fanned-out calls log service failures and return what the other
    /// services produced. Calls routed to a single owner return its error.
    pub fn execute(&self, call: BackendCall) -> MultiplexResult<CallOutput> {
        match call {
            BackendCall::BackendInfo => Ok(CallOutput::Info(self.context.backend_info()?)),
            BackendCall::RenameDepotserver { .. } => {
                Err(MultiplexError::NotSupported("renaming depot servers".into()))
            }
            BackendCall::GetObjects { class, filter } => self.read_objects(class, filter),
            BackendCall::InsertObject(object) => self.insert(object),
            BackendCall::UpdateObject(object) => self.update(object),
            BackendCall::CreateObjects(objects) => self.create(objects),
            BackendCall::UpdateObjects(objects) => self.update_many(objects),
            BackendCall::DeleteObjects(objects) => self.delete(objects),
            BackendCall::LicenseOnClientGetOrCreate {
                client_id,
                product_id,
                license_pool_id,
            } => self.license_for_client(client_id, product_id, license_pool_id),
            call => Ok(self.fan_out(&call)),
        }
    }

    fn license_for_client(
        &self,
        client_id: String,
        product_id: String,
        license_pool_id: Option<String>,
    ) -> MultiplexResult<CallOutput> {
        let owner = self.find_service(|s| {
            s.has_client(&client_id)
                && license_pool_id
                    .as_deref()
                    .map_or(true, |pool_id| s.has_license_pool(pool_id))
        });
        let call = BackendCall::LicenseOnClientGetOrCreate {
            client_id,
            product_id,
            license_pool_id,
        };
        match owner {
            Some(owner) => self.call_on(&owner, &call),
            None => Ok(self.fan_out(&call)),
        }
    }

    fn read_objects(&self, class: ObjectClass, filter: Filter) -> MultiplexResult<CallOutput> {
        match class {
            ObjectClass::LicenseOnClient => {
                if let (Some(pool_id), Some(client_id)) = (
                    single_value(&filter, "licensePoolId"),
                    single_value(&filter, "clientId"),
                ) {
                    let owner = self
                        .find_service(|s| s.has_license_pool(&pool_id) && s.has_client(&client_id))
                        .ok_or(MultiplexError::PoolClientMismatch { pool_id, client_id })?;
                    return self.call_on(&owner, &BackendCall::GetObjects { class, filter });
                }
            }
            ObjectClass::SoftwareLicenseToLicensePool => {
                if let Some(pool_id) = single_value(&filter, "licensePoolId") {
                    if let Some(owner) = self.find_service(|s| s.has_license_pool(&pool_id)) {
                        return self.call_on(&owner, &BackendCall::GetObjects { class, filter });
                    }
                }
            }
            ObjectClass::SoftwareLicense => {
                let staged: Vec<Object> = {
                    let staging = self.staging.lock();
                    filter
                        .strings("id")
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|id| staging.get(&(class, id.to_string())).cloned())
                        .filter(|license| filter.matches(license))
                        .collect()
                };
                if !staged.is_empty() {
                    return Ok(CallOutput::Objects(staged));
                }
            }
            _ => {}
        }
        Ok(self.fan_out(&BackendCall::GetObjects { class, filter }))
    }

    fn stage(&self, object: Object) {
        match staging_key(&object) {
            Some(key) => {
                tracing::info!(class = %key.0, id = %key.1, "staged until its service is known");
                self.staging.lock().insert(key, object);
            }
            None => tracing::warn!(object_type = %object.object_type(), "cannot stage object without id"),
        }
    }

    fn is_staged(&self, object: &Object) -> bool {
        staging_key(object).is_some_and(|key| self.staging.lock().contains_key(&key))
    }

    fn insert(&self, mut object: Object) -> MultiplexResult<CallOutput> {
        if is_depot_assignment(&object) {
            return self.apply_depot_assignment(&object);
        }
        match object.class() {
            ObjectClass::Host if object.object_type() == ObjectType::OpsiClient => {
                self.check_license()?;
                self.stage(object);
                Ok(CallOutput::Done)
            }
            ObjectClass::SoftwareLicense => {
                object.set_defaults();
                self.stage(object);
                Ok(CallOutput::Done)
            }
            ObjectClass::LicensePool => {
                let pool_id = object.id().unwrap_or_default().to_string();
                let owner = self
                    .find_service(|s| s.has_license_pool(&pool_id))
                    .ok_or_else(|| MultiplexError::NotSupported("creating license pools".into()))?;
                self.call_on(&owner, &BackendCall::InsertObject(object))
            }
            ObjectClass::SoftwareLicenseToLicensePool => {
                let pool_id = object.get_str("licensePoolId").unwrap_or_default().to_string();
                match self.find_service(|s| s.has_license_pool(&pool_id)) {
                    Some(owner) => {
                        if let Some(license_id) = object.get_str("softwareLicenseId") {
                            self.write_staged_license(&owner, license_id)?;
                        }
                        self.call_on(&owner, &BackendCall::InsertObject(object))
                    }
                    None => Ok(self.fan_out(&BackendCall::InsertObject(object))),
                }
            }
            _ => Ok(self.fan_out(&BackendCall::InsertObject(object))),
        }
    }

    fn write_staged_license(&self, owner: &Service, license_id: &str) -> MultiplexResult<()> {
        let key = (ObjectClass::SoftwareLicense, license_id.to_string());
        let Some(license) = self.staging.lock().remove(&key) else {
            return Ok(());
        };
        tracing::info!(license_id, url = %owner.url(), "writing staged software license");
        let written = owner
            .backend()
            .and_then(|backend| backend.insert_object(&license).map_err(MultiplexError::from));
        if let Err(e) = written {
            self.staging.lock().insert(key, license);
            return Err(e);
        }
        Ok(())
    }

    fn update(&self, object: Object) -> MultiplexResult<CallOutput> {
        if is_depot_assignment(&object) {
            return self.apply_depot_assignment(&object);
        }
        if object.class() == ObjectClass::LicensePool {
            let pool_id = object.id().unwrap_or_default().to_string();
            let owner = self
                .find_service(|s| s.has_license_pool(&pool_id))
                .ok_or(MultiplexError::NoServiceForPool(pool_id))?;
            return self.call_on(&owner, &BackendCall::UpdateObject(object));
        }
        if object.class() == ObjectClass::SoftwareLicenseToLicensePool {
            if let Some(owner) = self.pool_owner(&object) {
                return self.call_on(&owner, &BackendCall::UpdateObject(object));
            }
        }
        if let Some(key) = staging_key(&object) {
            let mut staging = self.staging.lock();
            if let Some(staged) = staging.get_mut(&key) {
                for (name, value) in object.attributes() {
                    if !value.is_null() {
                        staged.set(name, value.clone());
                    }
                }
                return Ok(CallOutput::Done);
            }
        }
        Ok(self.fan_out(&BackendCall::UpdateObject(object)))
    }

    fn create(&self, objects: Vec<Object>) -> MultiplexResult<CallOutput> {
        if objects.iter().any(|o| o.class() == ObjectClass::LicensePool) {
            return Err(MultiplexError::NotSupported("creating license pools".into()));
        }
        let (routed, rest): (Vec<Object>, Vec<Object>) = objects.into_iter().partition(|o| {
            is_depot_assignment(o)
                || staging_key(o).is_some()
                || o.class() == ObjectClass::SoftwareLicenseToLicensePool
        });
        if !rest.is_empty() {
            self.fan_out(&BackendCall::CreateObjects(rest));
        }
        for object in routed {
            self.insert(object)?;
        }
        Ok(CallOutput::Done)
    }

    fn update_many(&self, objects: Vec<Object>) -> MultiplexResult<CallOutput> {
        let (routed, rest): (Vec<Object>, Vec<Object>) = objects.into_iter().partition(|o| {
            is_depot_assignment(o)
                || matches!(
                    o.class(),
                    ObjectClass::LicensePool | ObjectClass::SoftwareLicenseToLicensePool
                )
                || self.is_staged(o)
        });
        if !rest.is_empty() {
            self.fan_out(&BackendCall::UpdateObjects(rest));
        }
        for object in routed {
            self.update(object)?;
        }
        Ok(CallOutput::Done)
    }

    fn delete(&self, objects: Vec<Object>) -> MultiplexResult<CallOutput> {
        let mut remaining = Vec::with_capacity(objects.len());
        {
            let mut staging = self.staging.lock();
            for object in objects {
                match staging_key(&object) {
                    Some(key) if staging.remove(&key).is_some() => {
                        tracing::debug!(id = %key.1, "dropped staged object");
                    }
                    _ => remaining.push(object),
                }
            }
        }
        let mut by_owner: Vec<(Arc<Service>, Vec<Object>)> = Vec::new();
        let mut rest = Vec::with_capacity(remaining.len());
        for object in remaining {
            let owner = (object.class() == ObjectClass::SoftwareLicenseToLicensePool)
                .then(|| self.pool_owner(&object))
                .flatten();
            match owner {
                Some(owner) => match by_owner.iter_mut().find(|(s, _)| Arc::ptr_eq(s, &owner)) {
                    Some((_, objects)) => objects.push(object),
                    None => by_owner.push((owner, vec![object])),
                },
                None => rest.push(object),
            }
        }
        for (owner, objects) in by_owner {
            self.call_on(&owner, &BackendCall::DeleteObjects(objects))?;
        }
        if rest.is_empty() {
            return Ok(CallOutput::Done);
        }
        Ok(self.fan_out(&BackendCall::DeleteObjects(rest)))
    }

    fn apply_depot_assignment(&self, state: &Object) -> MultiplexResult<CallOutput> {
        match self.relocate_client(state)? {
            RelocationOutcome::Failed { reason, .. } => Err(MultiplexError::RelocationFailed {
                client_id: state.get_str("objectId").unwrap_or_default().to_string(),
                reason,
            }),
            _ => Ok(CallOutput::Done),
        }
    }

    /// Carries out depot assignment `state`.
    ///
    /// A staged client is created on the service of the assigned depot. A
    /// client already there just gets the new state. Any other client moves
    /// from its current service. Assignments are carried out one at a time.
    ///
    /// # Errors
    ///
    /// Fails if the state names no client or depot, no service serves the
    /// depot, or the client is neither staged nor known. A move that could
    /// not be confirmed is reported as [`RelocationOutcome::Failed`].
    pub fn relocate_client(&self, state: &Object) -> MultiplexResult<RelocationOutcome> {
        let bad = |reason: &str| MultiplexError::bad_call("configState_updateObject", reason);
        let client_id = state
            .get_str("objectId")
            .ok_or_else(|| bad("depot assignment names no client"))?;
        let depot_id = state
            .get("values")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .and_then(Value::as_str)
            .ok_or_else(|| bad("depot assignment names no depot"))?;
        // Held across the membership lookups as well as the writes, so a
        // second assignment of the same client sees where the first one left it.
        let _guard = self.relocation_lock.lock();
        let destination = self
            .find_service(|s| s.serves_depot(depot_id))
            .ok_or_else(|| MultiplexError::NoServiceForDepot(depot_id.to_string()))?;

        let key = (ObjectClass::Host, client_id.to_string());
        let staged = self.staging.lock().remove(&key);
        if let Some(client) = staged {
            let backend = destination.backend()?;
            if let Err(e) = backend.insert_object(&client) {
                self.staging.lock().insert(key, client);
                return Err(e.into());
            }
            backend.insert_object(state)?;
            destination.refresh()?;
            tracing::info!(client_id, depot_id, "created staged client");
            return Ok(RelocationOutcome::Materialized {
                depot_id: destination.depot_id().to_string(),
            });
        }

        let source = self
            .find_service(|s| s.has_client(client_id))
            .ok_or_else(|| MultiplexError::UnknownClient(client_id.to_string()))?;
        if Arc::ptr_eq(&source, &destination) {
            destination.backend()?.insert_object(state)?;
            tracing::debug!(client_id, depot_id, "depot assignment unchanged service");
            return Ok(RelocationOutcome::Updated {
                depot_id: destination.depot_id().to_string(),
            });
        }

        Ok(relocation::move_client(&source, &destination, state))
    }
}

impl std::fmt::Debug for MultiplexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexBackend")
            .field("services", &self.services)
            .field("staged", &self.staged_count())
            .finish_non_exhaustive()
    }
}

impl Backend for MultiplexBackend {
    fn backend_info(&self) -> BackendResult<BackendInfo> {
        self.context.backend_info()
    }

    fn backend_create_base(&self) -> BackendResult<()> {
        self.execute(BackendCall::CreateBase)?;
        Ok(())
    }

    fn backend_delete_base(&self) -> BackendResult<()> {
        self.execute(BackendCall::DeleteBase)?;
        Ok(())
    }

    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>> {
        Ok(self
            .execute(BackendCall::GetObjects {
                class,
                filter: filter.clone(),
            })?
            .into_objects())
    }

    fn insert_object(&self, object: &Object) -> BackendResult<()> {
        self.execute(BackendCall::InsertObject(object.clone()))?;
        Ok(())
    }

    fn update_object(&self, object: &Object) -> BackendResult<()> {
        self.execute(BackendCall::UpdateObject(object.clone()))?;
        Ok(())
    }

    fn update_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.execute(BackendCall::UpdateObjects(objects.to_vec()))?;
        Ok(())
    }

    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.execute(BackendCall::CreateObjects(objects.to_vec()))?;
        Ok(())
    }

    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.execute(BackendCall::DeleteObjects(objects.to_vec()))?;
        Ok(())
    }

    fn get_idents(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<String>> {
        Ok(self
            .execute(BackendCall::GetIdents {
                class,
                filter: filter.clone(),
            })?
            .into_idents())
    }

    fn host_get_idents(&self, filter: &Filter) -> BackendResult<Vec<String>> {
        self.get_idents(ObjectClass::Host, filter)
    }

    fn host_rename_depotserver(&self, old_id: &str, new_id: &str) -> BackendResult<()> {
        self.execute(BackendCall::RenameDepotserver {
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
        })?;
        Ok(())
    }

    fn audit_hardware_on_host_set_obsolete(&self, host_id: &str) -> BackendResult<()> {
        self.execute(BackendCall::AuditHardwareSetObsolete(host_id.to_string()))?;
        Ok(())
    }

    fn audit_software_on_client_set_obsolete(&self, client_id: &str) -> BackendResult<()> {
        self.execute(BackendCall::AuditSoftwareSetObsolete(client_id.to_string()))?;
        Ok(())
    }

    fn license_on_client_get_or_create(
        &self,
        client_id: &str,
        product_id: &str,
        license_pool_id: Option<&str>,
    ) -> BackendResult<Object> {
        self.execute(BackendCall::LicenseOnClientGetOrCreate {
            client_id: client_id.to_string(),
            product_id: product_id.to_string(),
            license_pool_id: license_pool_id.map(str::to_string),
        })?
        .into_objects()
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::NoFreeLicense {
            product_id: product_id.to_string(),
            client_id: client_id.to_string(),
        })
    }
}

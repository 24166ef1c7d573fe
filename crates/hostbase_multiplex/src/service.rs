//! Backend services and their membership caches.

use crate::config::{MultiplexConfig, ServiceSpec};
use crate::error::{MultiplexError, MultiplexResult};
use hostbase_backend::{Backend, BackendError, BackendResult, FileBackend, Filter, SharedBackend};
use hostbase_object::{ObjectClass, ObjectType};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Opens the backend behind a service spec.
pub trait ServiceFactory: Send + Sync {
    /// Connects to the service.
    fn connect(&self, spec: &ServiceSpec) -> BackendResult<SharedBackend>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&ServiceSpec) -> BackendResult<SharedBackend> + Send + Sync,
{
    fn connect(&self, spec: &ServiceSpec) -> BackendResult<SharedBackend> {
        self(spec)
    }
}

/// Opens `file://` services as JSON file backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileServiceFactory;

impl ServiceFactory for FileServiceFactory {
    fn connect(&self, spec: &ServiceSpec) -> BackendResult<SharedBackend> {
        let path = spec.file_path().ok_or_else(|| {
            BackendError::Routing(format!("{} is not a file:// url", spec.url))
        })?;
        Ok(Arc::new(FileBackend::open_with_create_dirs(path)?))
    }
}

/// Service factories by service type.
pub struct ServiceRegistry {
    factories: BTreeMap<String, Arc<dyn ServiceFactory>>,
}

impl ServiceRegistry {
    /// Creates a registry knowing the `file` type.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("file", FileServiceFactory);
        registry
    }

    /// Creates a registry knowing no type.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) the factory of `service_type`.
    pub fn register(&mut self, service_type: &str, factory: impl ServiceFactory + 'static) {
        self.factories
            .insert(service_type.to_lowercase(), Arc::new(factory));
    }

    /// Builder form of [`ServiceRegistry::register`].
    #[must_use]
    pub fn with(mut self, service_type: &str, factory: impl ServiceFactory + 'static) -> Self {
        self.register(service_type, factory);
        self
    }

    /// Returns the registered type names.
    pub fn service_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Connects `spec` with the factory of `service_type`.
    pub fn connect(&self, service_type: &str, spec: &ServiceSpec) -> BackendResult<SharedBackend> {
        let factory = self
            .factories
            .get(&service_type.to_lowercase())
            .ok_or_else(|| {
                BackendError::Routing(format!("no factory for service type '{service_type}'"))
            })?;
        factory.connect(spec)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("service_types", &self.service_types())
            .finish()
    }
}

/// Ids a service is known to hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    /// Every host id.
    pub hosts: BTreeSet<String>,
    /// Client ids.
    pub clients: BTreeSet<String>,
    /// Depot and config server ids.
    pub depots: BTreeSet<String>,
    /// License pool ids.
    pub license_pools: BTreeSet<String>,
}

impl Membership {
    /// Returns true if `id` names a host, client or depot of the service.
    pub fn owns(&self, id: &str) -> bool {
        self.clients.contains(id) || self.depots.contains(id) || self.hosts.contains(id)
    }
}

/// One backend service.
///
/// A service starts disconnected; [`Service::connect`] opens its backend
/// and fills the membership cache.
pub struct Service {
    spec: ServiceSpec,
    service_type: String,
    depot_id: String,
    backend: RwLock<Option<SharedBackend>>,
    error: RwLock<Option<String>>,
    membership: RwLock<Membership>,
}

impl Service {
    /// Creates a disconnected service.
    pub fn new(spec: ServiceSpec, config: &MultiplexConfig) -> MultiplexResult<Self> {
        let depot_id = spec.resolve_depot_id(config)?;
        let service_type = spec
            .service_type_or(&config.default_service_type)
            .to_string();
        Ok(Self {
            spec,
            service_type,
            depot_id,
            backend: RwLock::new(None),
            error: RwLock::new(None),
            membership: RwLock::new(Membership::default()),
        })
    }

    /// Returns the URL.
    pub fn url(&self) -> &str {
        &self.spec.url
    }

    /// Returns the spec.
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Returns the depot id.
    pub fn depot_id(&self) -> &str {
        &self.depot_id
    }

    /// Returns true once connected.
    pub fn is_connected(&self) -> bool {
        self.backend.read().is_some()
    }

    /// Returns the last connection error.
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// Returns true if the service is connected or gave up trying.
    pub fn is_settled(&self) -> bool {
        self.is_connected() || self.error.read().is_some()
    }

    /// Returns the backend.
    pub fn backend(&self) -> MultiplexResult<SharedBackend> {
        self.backend
            .read()
            .clone()
            .ok_or_else(|| MultiplexError::NotConnected(self.spec.url.clone()))
    }

    /// Opens the backend and fills the membership cache.
    pub fn connect(&self, registry: &ServiceRegistry) -> MultiplexResult<()> {
        tracing::debug!(url = %self.url(), service_type = %self.service_type, "connecting to service");
        let connected = registry
            .connect(&self.service_type, &self.spec)
            .map_err(MultiplexError::from)
            .and_then(|backend| {
                *self.backend.write() = Some(backend);
                self.refresh()
            });
        match &connected {
            Ok(()) => {
                *self.error.write() = None;
                tracing::info!(url = %self.url(), depot_id = %self.depot_id, "connected to service");
            }
            Err(e) => {
                *self.error.write() = Some(e.to_string());
                tracing::error!(url = %self.url(), error = %e, "failed to connect to service");
            }
        }
        connected
    }

    /// Attaches an already open backend and fills the membership cache.
    pub fn attach(&self, backend: SharedBackend) -> MultiplexResult<()> {
        *self.backend.write() = Some(backend);
        *self.error.write() = None;
        self.refresh()
    }

    /// Re-reads the membership cache from the backend.
    pub fn refresh(&self) -> MultiplexResult<()> {
        let backend = self.backend()?;
        let ids_of = |object_type: ObjectType| -> BackendResult<BTreeSet<String>> {
            Ok(backend
                .host_get_idents(&Filter::new().with_value("type", object_type.name()))?
                .into_iter()
                .collect())
        };
        let membership = Membership {
            hosts: backend.host_get_idents(&Filter::new())?.into_iter().collect(),
            clients: ids_of(ObjectType::OpsiClient)?,
            depots: ids_of(ObjectType::OpsiDepotserver)?,
            license_pools: backend
                .get_idents(ObjectClass::LicensePool, &Filter::new())?
                .into_iter()
                .collect(),
        };
        tracing::debug!(
            url = %self.url(),
            hosts = membership.hosts.len(),
            clients = membership.clients.len(),
            license_pools = membership.license_pools.len(),
            "refreshed service membership"
        );
        *self.membership.write() = membership;
        Ok(())
    }

    /// Returns a copy of the membership cache.
    pub fn membership(&self) -> Membership {
        self.membership.read().clone()
    }

    /// Returns true if `id` is a host, client or depot of the service.
    pub fn owns(&self, id: &str) -> bool {
        self.membership.read().owns(id)
    }

    /// Returns true if the service holds client `id`.
    pub fn has_client(&self, id: &str) -> bool {
        self.membership.read().clients.contains(id)
    }

    /// Returns true if the service holds license pool `id`.
    pub fn has_license_pool(&self, id: &str) -> bool {
        self.membership.read().license_pools.contains(id)
    }

    /// Returns true if the service stands for depot `id`.
    pub fn serves_depot(&self, id: &str) -> bool {
        self.depot_id == id || self.membership.read().depots.contains(id)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("url", &self.spec.url)
            .field("depot_id", &self.depot_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Services shared by every multiplexer holding a clone of the handle.
///
/// Services are keyed by URL; a multiplexer asking for a known URL reuses
/// the connected service instead of opening a second one.
#[derive(Clone, Default)]
pub struct ServiceCache {
    services: Arc<RwLock<BTreeMap<String, Arc<Service>>>>,
}

impl ServiceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached service of `spec.url`, creating it if needed.
    pub fn get_or_create(
        &self,
        spec: &ServiceSpec,
        config: &MultiplexConfig,
    ) -> MultiplexResult<Arc<Service>> {
        if let Some(service) = self.services.read().get(&spec.url) {
            tracing::debug!(url = %spec.url, "using cached service");
            return Ok(Arc::clone(service));
        }
        let mut services = self.services.write();
        if let Some(service) = services.get(&spec.url) {
            return Ok(Arc::clone(service));
        }
        let service = Arc::new(Service::new(spec.clone(), config)?);
        services.insert(spec.url.clone(), Arc::clone(&service));
        Ok(service)
    }

    /// Returns the service of `url`.
    pub fn get(&self, url: &str) -> Option<Arc<Service>> {
        self.services.read().get(url).cloned()
    }

    /// Returns the number of cached services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns true if no service is cached.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Drops every cached service.
    pub fn clear(&self) {
        self.services.write().clear();
    }
}

impl std::fmt::Debug for ServiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCache")
            .field("urls", &self.services.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbase_backend::InMemoryBackend;
    use hostbase_object::Object;

    fn config() -> MultiplexConfig {
        MultiplexConfig::new().with_default_domain("example.org")
    }

    fn populated() -> SharedBackend {
        let backend = InMemoryBackend::new();
        backend
            .create_objects(&[
                Object::opsi_depotserver("depot1.example.org"),
                Object::opsi_client("c1.example.org"),
                Object::license_pool("pool-a"),
            ])
            .unwrap();
        Arc::new(backend)
    }

    #[test]
    fn membership_after_attach() {
        let service = Service::new(ServiceSpec::new("https://depot1:4447/rpc"), &config()).unwrap();
        assert_eq!(service.depot_id(), "depot1.example.org");
        assert!(!service.is_connected());
        assert!(matches!(service.backend(), Err(MultiplexError::NotConnected(_))));

        service.attach(populated()).unwrap();
        assert!(service.is_connected());
        assert!(service.has_client("c1.example.org"));
        assert!(service.owns("depot1.example.org"));
        assert!(service.has_license_pool("pool-a"));
        assert!(!service.owns("c2.example.org"));
        assert!(service.serves_depot("depot1.example.org"));
    }

    #[test]
    fn refresh_sees_new_hosts() {
        let service = Service::new(ServiceSpec::new("https://depot1:4447/rpc"), &config()).unwrap();
        let backend = populated();
        service.attach(Arc::clone(&backend)).unwrap();

        backend.insert_object(&Object::opsi_client("c2.example.org")).unwrap();
        assert!(!service.has_client("c2.example.org"));
        service.refresh().unwrap();
        assert!(service.has_client("c2.example.org"));
    }

    #[test]
    fn connect_through_registry() {
        let backend = populated();
        let registry = ServiceRegistry::empty().with("memory", move |_: &ServiceSpec| -> BackendResult<SharedBackend> {
            Ok(Arc::clone(&backend))
        });
        let spec = ServiceSpec::new("https://depot1:4447/rpc").with_type("memory");
        let service = Service::new(spec, &config()).unwrap();
        service.connect(&registry).unwrap();
        assert!(service.is_settled());
        assert!(service.has_client("c1.example.org"));
    }

    #[test]
    fn unknown_type_records_error() {
        let spec = ServiceSpec::new("https://depot1:4447/rpc").with_type("ldap");
        let service = Service::new(spec, &config()).unwrap();
        assert!(service.connect(&ServiceRegistry::new()).is_err());
        assert!(!service.is_connected());
        assert!(service.is_settled());
        assert!(service.error().unwrap().contains("ldap"));
    }

    #[test]
    fn file_services_open_json_documents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("depot2.json");
        let spec = ServiceSpec::new(format!("file://{}", path.display()));
        let service = Service::new(spec, &config()).unwrap();
        assert_eq!(service.depot_id(), "depot2.example.org");

        service.connect(&ServiceRegistry::new()).unwrap();
        service
            .backend()
            .unwrap()
            .insert_object(&Object::opsi_client("c9.example.org"))
            .unwrap();
        service.refresh().unwrap();
        assert!(service.has_client("c9.example.org"));
    }

    #[test]
    fn cache_shares_services_by_url() {
        let cache = ServiceCache::new();
        let other = cache.clone();
        let spec = ServiceSpec::new("https://depot1:4447/rpc");

        let first = cache.get_or_create(&spec, &config()).unwrap();
        let second = other.get_or_create(&spec, &config()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        other.clear();
        assert!(cache.is_empty());
    }
}

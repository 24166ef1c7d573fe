//! Copies a selected slice of one backend's dataset into another.

use crate::config::ReplicatorOptions;
use crate::error::SyncResult;
use crate::progress::ProgressSubject;
use hostbase_backend::{depot_type_for, Filter, IdSelection, SharedBackend};
use hostbase_object::{Object, ObjectClass, ObjectType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

/// Classes in write order. Referenced classes come before the classes
/// referencing them.
pub const REPLICATION_ORDER: [ObjectClass; 15] = [
    ObjectClass::Host,
    ObjectClass::Product,
    ObjectClass::Config,
    ObjectClass::Group,
    ObjectClass::AuditHardware,
    ObjectClass::AuditSoftware,
    ObjectClass::ProductDependency,
    ObjectClass::ProductProperty,
    ObjectClass::ProductOnDepot,
    ObjectClass::ProductOnClient,
    ObjectClass::ProductPropertyState,
    ObjectClass::ConfigState,
    ObjectClass::ObjectToGroup,
    ObjectClass::AuditHardwareOnHost,
    ObjectClass::AuditSoftwareOnClient,
];

/// License classes, written after [`REPLICATION_ORDER`] when requested.
pub const LICENSE_ORDER: [ObjectClass; 5] = [
    ObjectClass::LicenseContract,
    ObjectClass::SoftwareLicense,
    ObjectClass::LicensePool,
    ObjectClass::SoftwareLicenseToLicensePool,
    ObjectClass::LicenseOnClient,
];

/// Which part of the dataset a replication run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationScope {
    /// Config servers.
    pub servers: IdSelection,
    /// Depot servers.
    pub depots: IdSelection,
    /// Clients.
    pub clients: IdSelection,
    /// Host and product groups.
    pub groups: IdSelection,
    /// Products.
    pub products: IdSelection,
    /// Copy inventory classes.
    pub audit: bool,
    /// Copy license classes.
    pub licenses: bool,
}

impl ReplicationScope {
    /// Everything except licenses.
    pub fn new() -> Self {
        Self {
            servers: IdSelection::All,
            depots: IdSelection::All,
            clients: IdSelection::All,
            groups: IdSelection::All,
            products: IdSelection::All,
            audit: true,
            licenses: false,
        }
    }

    /// Everything, licenses included.
    pub fn everything() -> Self {
        Self::new().with_licenses(true)
    }

    /// Sets the config server selection.
    pub fn with_servers(mut self, servers: IdSelection) -> Self {
        self.servers = servers;
        self
    }

    /// Sets the depot selection.
    pub fn with_depots(mut self, depots: IdSelection) -> Self {
        self.depots = depots;
        self
    }

    /// Sets the client selection.
    pub fn with_clients(mut self, clients: IdSelection) -> Self {
        self.clients = clients;
        self
    }

    /// Sets the group selection.
    pub fn with_groups(mut self, groups: IdSelection) -> Self {
        self.groups = groups;
        self
    }

    /// Sets the product selection.
    pub fn with_products(mut self, products: IdSelection) -> Self {
        self.products = products;
        self
    }

    /// Sets whether inventory classes are copied.
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Sets whether license classes are copied.
    pub fn with_licenses(mut self, licenses: bool) -> Self {
        self.licenses = licenses;
        self
    }

    /// Returns the classes a run visits, in write order.
    pub fn classes(&self) -> Vec<ObjectClass> {
        let mut classes: Vec<ObjectClass> = REPLICATION_ORDER
            .into_iter()
            .filter(|class| self.audit || !class.is_audit())
            .collect();
        if self.licenses {
            classes.extend(LICENSE_ORDER);
        }
        classes
    }

    /// Host selection covering servers, depots and clients together.
    ///
    /// Explicit ids are united. Without any explicit id the hosts are all
    /// if any kind selects all, none otherwise.
    pub fn hosts(&self) -> IdSelection {
        let selections = [&self.servers, &self.depots, &self.clients];
        let explicit: Vec<String> = selections
            .iter()
            .filter_map(|selection| selection.ids())
            .flatten()
            .cloned()
            .collect();
        if !explicit.is_empty() {
            IdSelection::Exactly(explicit)
        } else if selections.iter().any(|selection| selection.is_all()) {
            IdSelection::All
        } else {
            IdSelection::None
        }
    }
}

impl Default for ReplicationScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-class counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassReport {
    /// Records read from the source.
    pub read: usize,
    /// Records written to the destination.
    pub written: usize,
    /// Records that failed to write.
    pub failed: usize,
}

/// Outcome of a replication run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Counters per visited class.
    pub classes: BTreeMap<ObjectClass, ClassReport>,
    /// Groups whose parent chain could not be resolved.
    pub unplaceable_groups: Vec<String>,
    /// Config server rename performed, as `(old, new)`.
    pub renamed: Option<(String, String)>,
}

impl ReplicationReport {
    /// Returns the total number of records written.
    pub fn written(&self) -> usize {
        self.classes.values().map(|report| report.written).sum()
    }

    /// Returns the total number of failed writes.
    pub fn failed(&self) -> usize {
        self.classes.values().map(|report| report.failed).sum()
    }

    /// Returns the counters of one class.
    pub fn class(&self, class: ObjectClass) -> ClassReport {
        self.classes.get(&class).copied().unwrap_or_default()
    }
}

/// Copies records from a read backend to a write backend.
///
/// # Example
///
/// ```rust
/// use hostbase_backend::{Backend, Filter, IdSelection, InMemoryBackend};
/// use hostbase_object::{Object, ObjectClass};
/// use hostbase_sync::{BackendReplicator, ReplicationScope, ReplicatorOptions};
/// use std::sync::Arc;
///
/// let source = Arc::new(InMemoryBackend::new());
/// source.insert_object(&Object::opsi_client("c1.example.org")).unwrap();
/// source.insert_object(&Object::opsi_client("c2.example.org")).unwrap();
///
/// let destination = Arc::new(InMemoryBackend::new());
/// let replicator = BackendReplicator::new(source, destination.clone(), ReplicatorOptions::new());
/// let scope = ReplicationScope::new().with_clients(IdSelection::exactly(["c1.example.org"]));
/// replicator.replicate(&scope).unwrap();
///
/// let hosts = destination.get_objects(ObjectClass::Host, &Filter::new()).unwrap();
/// assert_eq!(hosts.len(), 1);
/// ```
pub struct BackendReplicator {
    read: SharedBackend,
    write: SharedBackend,
    options: ReplicatorOptions,
    overall: ProgressSubject,
    current: ProgressSubject,
}

impl BackendReplicator {
    /// Creates a replicator copying from `read` into `write`.
    pub fn new(read: SharedBackend, write: SharedBackend, options: ReplicatorOptions) -> Self {
        Self {
            read,
            write,
            options,
            overall: ProgressSubject::new("replicator_overall"),
            current: ProgressSubject::new("replicator_current"),
        }
    }

    /// Progress over classes.
    pub fn overall_progress(&self) -> &ProgressSubject {
        &self.overall
    }

    /// Progress within the class being copied.
    pub fn current_progress(&self) -> &ProgressSubject {
        &self.current
    }

    /// Returns the options the replicator was built with.
    pub fn options(&self) -> &ReplicatorOptions {
        &self.options
    }

    /// Copies the records selected by `scope`.
    ///
    /// # Errors
    ///
    /// Fails if the destination cannot be provisioned or a source read
    /// fails. In strict mode a failed bulk write aborts the run; otherwise
    /// failed records are logged and counted.
    pub fn replicate(&self, scope: &ReplicationScope) -> SyncResult<ReplicationReport> {
        let mut report = ReplicationReport::default();

        if self.options.cleanup_first {
            self.write.backend_delete_base()?;
        }
        self.write.backend_create_base()?;

        let hosts = scope.hosts();
        let products = self.narrow_products(scope)?;

        let classes = scope.classes();
        self.overall.reset();
        self.overall.set_title("Replicating");
        self.overall.set_end(classes.len() as u64);
        info!(
            classes = classes.len(),
            strict = self.options.strict,
            "starting replication"
        );

        for class in classes {
            self.overall.set_message(format!("Replicating {}", class.name()));
            let mut class_report = ClassReport::default();

            for mut objects in self.read_class(class, scope, &hosts, &products)? {
                if class == ObjectClass::Group {
                    let (ordered, unplaceable) = sort_groups(objects);
                    for group in &unplaceable {
                        let id = group.id().unwrap_or_default();
                        error!(group_id = id, "cannot resolve parent chain of group");
                        report.unplaceable_groups.push(id.to_string());
                    }
                    objects = ordered;
                    objects.extend(unplaceable);
                }
                class_report.read += objects.len();
                self.write_objects(class, &objects, &mut class_report)?;
            }

            debug!(
                class = class.name(),
                read = class_report.read,
                written = class_report.written,
                failed = class_report.failed,
                "replicated class"
            );
            report.classes.insert(class, class_report);
            self.overall.add_to_state(1);
        }

        if let Some(new_id) = self.options.new_server_id.clone() {
            report.renamed = self.rename_server(&new_id)?;
        }

        info!(
            written = report.written(),
            failed = report.failed(),
            "replication finished"
        );
        Ok(report)
    }

    /// Intersects the product selection with the products present on the
    /// selected depots. Nothing is narrowed when the depots carry no
    /// product at all.
    fn narrow_products(&self, scope: &ReplicationScope) -> SyncResult<IdSelection> {
        let IdSelection::Exactly(_) = scope.depots else {
            return Ok(scope.products.clone());
        };
        let on_depots = self.read.get_objects(
            ObjectClass::ProductOnDepot,
            &Filter::new()
                .with_selection("depotId", &scope.depots)
                .with_selection("productId", &scope.products),
        )?;
        let present: BTreeSet<String> = on_depots
            .iter()
            .filter_map(|object| object.get_str("productId"))
            .map(str::to_string)
            .collect();
        if present.is_empty() {
            return Ok(scope.products.clone());
        }

        let narrowed = match &scope.products {
            IdSelection::All => IdSelection::exactly(present),
            IdSelection::None => IdSelection::None,
            IdSelection::Exactly(ids) => {
                IdSelection::exactly(ids.iter().filter(|id| present.contains(*id)).cloned())
            }
        };
        debug!(?narrowed, "narrowed products to depot contents");
        Ok(narrowed)
    }

    /// Reads one class. Hosts come in three passes, one per host type.
    fn read_class(
        &self,
        class: ObjectClass,
        scope: &ReplicationScope,
        hosts: &IdSelection,
        products: &IdSelection,
    ) -> SyncResult<Vec<Vec<Object>>> {
        if class == ObjectClass::Host {
            let passes = [
                (ObjectType::OpsiConfigserver, &scope.servers),
                (ObjectType::OpsiDepotserver, &scope.depots),
                (ObjectType::OpsiClient, &scope.clients),
            ];
            let mut read = Vec::with_capacity(passes.len());
            for (object_type, selection) in passes {
                if selection.is_none() {
                    continue;
                }
                let filter = Filter::new()
                    .with_value("type", object_type.name())
                    .with_selection("id", selection);
                let mut objects = self.read.get_objects(class, &filter)?;
                // The depot filter matches config servers too.
                objects.retain(|object| object.object_type() == object_type);
                read.push(objects);
            }
            return Ok(read);
        }

        let filter = match class {
            ObjectClass::Product => Filter::new().with_selection("id", products),
            ObjectClass::Group => Filter::new().with_selection("id", &scope.groups),
            ObjectClass::ProductDependency | ObjectClass::ProductProperty => {
                Filter::new().with_selection("productId", products)
            }
            ObjectClass::ProductOnDepot => Filter::new()
                .with_selection("productId", products)
                .with_selection("depotId", &scope.depots),
            ObjectClass::ProductOnClient => Filter::new()
                .with_selection("productId", products)
                .with_selection("clientId", &scope.clients),
            ObjectClass::ProductPropertyState => Filter::new()
                .with_selection("productId", products)
                .with_selection("objectId", hosts),
            ObjectClass::ConfigState => Filter::new().with_selection("objectId", hosts),
            ObjectClass::ObjectToGroup => match (products.ids(), hosts.ids()) {
                (Some(product_ids), Some(host_ids)) => Filter::new().with(
                    "objectId",
                    product_ids.iter().chain(host_ids).cloned(),
                ),
                _ => Filter::new(),
            },
            ObjectClass::AuditHardwareOnHost => Filter::new().with_selection("hostId", hosts),
            ObjectClass::AuditSoftwareOnClient | ObjectClass::LicenseOnClient => {
                Filter::new().with_selection("clientId", &scope.clients)
            }
            _ => Filter::new(),
        };
        Ok(vec![self.read.get_objects(class, &filter)?])
    }

    fn write_objects(
        &self,
        class: ObjectClass,
        objects: &[Object],
        report: &mut ClassReport,
    ) -> SyncResult<()> {
        self.current.reset();
        self.current
            .set_title(format!("Writing {} objects", class.name()));
        if objects.is_empty() {
            return Ok(());
        }

        if self.options.strict {
            self.current.set_end(1);
            self.write.create_objects(objects)?;
            report.written += objects.len();
            self.current.add_to_state(1);
            return Ok(());
        }

        self.current.set_end(objects.len() as u64);
        for object in objects {
            match self.write.insert_object(object) {
                Ok(()) => report.written += 1,
                Err(err) => {
                    error!(class = class.name(), ident = %object.ident(), %err, "failed to replicate object");
                    report.failed += 1;
                }
            }
            self.current.add_to_state(1);
        }
        Ok(())
    }

    /// Renames the config server to `new_id` and retypes every depot so
    /// that only the renamed one is a config server.
    fn rename_server(&self, new_id: &str) -> SyncResult<Option<(String, String)>> {
        let old_id = match self.options.old_server_id.clone() {
            Some(id) => Some(id),
            None => self.detect_server_id()?,
        };
        let Some(old_id) = old_id else {
            warn!(new_id, "no server to rename");
            return Ok(None);
        };

        if old_id != new_id {
            self.write.host_rename_depotserver(&old_id, new_id)?;
        }

        let depots = self.write.get_objects(
            ObjectClass::Host,
            &Filter::new().with_value("type", ObjectType::OpsiDepotserver.name()),
        )?;
        for depot in depots {
            let Some(id) = depot.id() else { continue };
            let wanted = depot_type_for(id, new_id);
            if depot.object_type() != wanted {
                self.write.insert_object(&depot.with_type(wanted)?)?;
            }
        }
        info!(old_id = %old_id, new_id, "renamed config server");
        Ok(Some((old_id, new_id.to_string())))
    }

    /// The destination's config server, else its first depot.
    fn detect_server_id(&self) -> SyncResult<Option<String>> {
        for object_type in [ObjectType::OpsiConfigserver, ObjectType::OpsiDepotserver] {
            let ids = self
                .write
                .host_get_idents(&Filter::new().with_value("type", object_type.name()))?;
            if let Some(id) = ids.into_iter().next() {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for BackendReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendReplicator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Orders groups so every group follows its parent.
///
/// A group whose parent is not among `groups` counts as a root. Returns
/// the ordered groups and, separately, the groups that could never be
/// placed (cycles).
pub fn sort_groups(groups: Vec<Object>) -> (Vec<Object>, Vec<Object>) {
    let known: BTreeSet<String> = groups
        .iter()
        .filter_map(|group| group.id().map(str::to_string))
        .collect();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(groups.len());
    let mut remaining = groups;

    while !remaining.is_empty() {
        let (ready, waiting): (Vec<Object>, Vec<Object>) =
            remaining.into_iter().partition(|group| {
                match group.get_str("parentGroupId") {
                    Some(parent) if known.contains(parent) => placed.contains(parent),
                    _ => true,
                }
            });
        if ready.is_empty() {
            return (ordered, waiting);
        }
        for group in ready {
            if let Some(id) = group.id() {
                placed.insert(id.to_string());
            }
            ordered.push(group);
        }
        remaining = waiting;
    }
    (ordered, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, parent: Option<&str>) -> Object {
        let group = Object::host_group(id);
        match parent {
            Some(parent) => group.with("parentGroupId", parent),
            None => group,
        }
    }

    fn ids(groups: &[Object]) -> Vec<&str> {
        groups.iter().filter_map(Object::id).collect()
    }

    #[test]
    fn groups_follow_parents() {
        let (ordered, unplaceable) = sort_groups(vec![
            group("leaf", Some("mid")),
            group("mid", Some("root")),
            group("root", None),
        ]);
        assert_eq!(ids(&ordered), vec!["root", "mid", "leaf"]);
        assert!(unplaceable.is_empty());
    }

    #[test]
    fn missing_parent_is_root() {
        let (ordered, unplaceable) = sort_groups(vec![group("orphan", Some("elsewhere"))]);
        assert_eq!(ids(&ordered), vec!["orphan"]);
        assert!(unplaceable.is_empty());
    }

    #[test]
    fn cycles_are_reported() {
        let (ordered, unplaceable) = sort_groups(vec![
            group("a", Some("b")),
            group("b", Some("a")),
            group("c", None),
        ]);
        assert_eq!(ids(&ordered), vec!["c"]);
        assert_eq!(ids(&unplaceable), vec!["a", "b"]);
    }

    #[test]
    fn host_selection_union() {
        let scope = ReplicationScope::new()
            .with_servers(IdSelection::exactly(["s"]))
            .with_clients(IdSelection::exactly(["c"]));
        assert_eq!(
            scope.hosts(),
            IdSelection::Exactly(vec!["s".into(), "c".into()])
        );

        let scope = ReplicationScope::new()
            .with_servers(IdSelection::None)
            .with_depots(IdSelection::None)
            .with_clients(IdSelection::None);
        assert_eq!(scope.hosts(), IdSelection::None);
        assert_eq!(ReplicationScope::new().hosts(), IdSelection::All);
    }

    #[test]
    fn class_sequence() {
        let classes = ReplicationScope::new().with_audit(false).classes();
        assert_eq!(classes.first(), Some(&ObjectClass::Host));
        assert_eq!(classes.last(), Some(&ObjectClass::ObjectToGroup));
        assert!(!classes.iter().any(ObjectClass::is_audit));

        let classes = ReplicationScope::everything().classes();
        assert_eq!(classes.len(), 20);
        assert_eq!(classes.last(), Some(&ObjectClass::LicenseOnClient));
    }
}

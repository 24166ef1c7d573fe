//! Integration tests for the backend replicator.

use hostbase_backend::{Backend, Filter, IdSelection, InMemoryBackend};
use hostbase_object::{Object, ObjectClass, ObjectType, DEPOT_ASSIGNMENT_CONFIG_ID};
use hostbase_sync::{
    BackendReplicator, ProgressObserver, ProgressSnapshot, ReplicationScope, ReplicatorOptions,
};
use hostbase_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn product_ids(backend: &dyn Backend) -> Vec<String> {
    let mut ids: Vec<String> = backend
        .get_objects(ObjectClass::Product, &Filter::new())
        .unwrap()
        .iter()
        .filter_map(|product| product.id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

#[test]
fn full_replication_copies_everything() {
    let master = shared_sample_backend();
    let destination = Arc::new(InMemoryBackend::new());

    let report = BackendReplicator::new(master.clone(), destination.clone(), ReplicatorOptions::new())
        .replicate(&ReplicationScope::everything())
        .unwrap();

    assert_eq!(object_keys(&*destination), object_keys(&*master));
    assert_eq!(report.failed(), 0);
    assert_eq!(report.written(), destination.len());
}

#[test]
fn replication_is_idempotent() {
    let master = shared_sample_backend();
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new()
        .with_depots(IdSelection::exactly([DEPOT1]))
        .with_clients(IdSelection::exactly([CLIENT1, CLIENT2]));

    let replicator =
        BackendReplicator::new(master.clone(), destination.clone(), ReplicatorOptions::new());
    replicator.replicate(&scope).unwrap();
    let first = object_keys(&*destination);
    replicator.replicate(&scope).unwrap();
    assert_eq!(object_keys(&*destination), first);

    // Without the wipe, records are replaced by ident, never duplicated.
    BackendReplicator::new(
        master,
        destination.clone(),
        ReplicatorOptions::new().with_cleanup_first(false),
    )
    .replicate(&scope)
    .unwrap();
    assert_eq!(object_keys(&*destination), first);
}

#[test]
fn cleanup_first_wipes_destination() {
    let destination = Arc::new(InMemoryBackend::new());
    destination
        .insert_object(&Object::opsi_client("stale.example.org"))
        .unwrap();

    BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
        .replicate(&ReplicationScope::new())
        .unwrap();
    assert!(!host_ids(&*destination, ObjectType::OpsiClient).contains(&"stale.example.org".to_string()));

    destination
        .insert_object(&Object::opsi_client("stale.example.org"))
        .unwrap();
    BackendReplicator::new(
        shared_sample_backend(),
        destination.clone(),
        ReplicatorOptions::new().with_cleanup_first(false),
    )
    .replicate(&ReplicationScope::new())
    .unwrap();
    assert!(host_ids(&*destination, ObjectType::OpsiClient).contains(&"stale.example.org".to_string()));
}

#[test]
fn host_passes_honour_each_selection() {
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new()
        .with_servers(IdSelection::None)
        .with_depots(IdSelection::exactly([DEPOT1]))
        .with_clients(IdSelection::None);

    BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
        .replicate(&scope)
        .unwrap();

    let hosts = destination
        .get_objects(ObjectClass::Host, &Filter::new())
        .unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].object_type(), ObjectType::OpsiDepotserver);
    assert_eq!(hosts[0].id(), Some(DEPOT1));

    // The depot pass never picks up the config server.
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new()
        .with_servers(IdSelection::None)
        .with_clients(IdSelection::None);
    BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
        .replicate(&scope)
        .unwrap();
    assert!(host_ids(&*destination, ObjectType::OpsiConfigserver).is_empty());
    assert_eq!(host_ids(&*destination, ObjectType::OpsiDepotserver), vec![DEPOT1, DEPOT2]);
}

#[test]
fn depot_narrows_products() {
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new().with_depots(IdSelection::exactly([DEPOT1]));
    BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
        .replicate(&scope)
        .unwrap();
    assert_eq!(product_ids(&*destination), vec!["firefox", "office"]);

    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new()
        .with_depots(IdSelection::exactly([DEPOT1]))
        .with_products(IdSelection::exactly(["firefox", "7zip"]));
    BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
        .replicate(&scope)
        .unwrap();
    assert_eq!(product_ids(&*destination), vec!["firefox"]);

    // Product-scoped classes follow the narrowed selection.
    let dependencies = destination
        .get_objects(ObjectClass::ProductDependency, &Filter::new())
        .unwrap();
    assert!(dependencies.is_empty());
}

#[test]
fn empty_depot_does_not_narrow() {
    let master = sample_backend();
    master
        .insert_object(&Object::opsi_depotserver("empty.example.org"))
        .unwrap();
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new().with_depots(IdSelection::exactly(["empty.example.org"]));

    BackendReplicator::new(Arc::new(master), destination.clone(), ReplicatorOptions::new())
        .replicate(&scope)
        .unwrap();
    assert_eq!(product_ids(&*destination), vec!["7zip", "firefox", "office"]);
}

#[test]
fn groups_are_written_after_their_parents() {
    let master = sample_backend();
    // Sorts before its ancestors in the source.
    master
        .insert_object(&Object::host_group("aaa-child").with("parentGroupId", "lab"))
        .unwrap();
    let destination = Arc::new(RecordingBackend::in_memory());

    BackendReplicator::new(Arc::new(master), destination.clone(), ReplicatorOptions::new())
        .replicate(&ReplicationScope::new())
        .unwrap();

    let order: Vec<String> = destination
        .calls()
        .into_iter()
        .filter(|call| call.method == "insert_object" && call.class == Some(ObjectClass::Group))
        .flat_map(|call| call.idents)
        .collect();
    let position = |id: &str| order.iter().position(|written| written == id).unwrap();
    assert!(position("clients") < position("lab"));
    assert!(position("lab") < position("aaa-child"));
    assert!(position("clients") < position("office"));
}

#[test]
fn group_with_parent_outside_selection_still_replicates() {
    let destination = Arc::new(InMemoryBackend::new());
    let scope = ReplicationScope::new().with_groups(IdSelection::exactly(["lab"]));

    let report =
        BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
            .replicate(&scope)
            .unwrap();

    let groups = destination
        .get_objects(ObjectClass::Group, &Filter::new())
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].get_str("parentGroupId"), Some("clients"));
    assert!(report.unplaceable_groups.is_empty());
}

#[test]
fn group_cycles_are_written_anyway() {
    let master = InMemoryBackend::new();
    master
        .create_objects(&[
            Object::host_group("a").with("parentGroupId", "b"),
            Object::host_group("b").with("parentGroupId", "a"),
        ])
        .unwrap();
    let destination = Arc::new(InMemoryBackend::new());

    let report = BackendReplicator::new(Arc::new(master), destination.clone(), ReplicatorOptions::new())
        .replicate(&ReplicationScope::new())
        .unwrap();

    assert_eq!(report.unplaceable_groups, vec!["a", "b"]);
    assert_eq!(report.class(ObjectClass::Group).written, 2);
}

#[test]
fn audit_classes_are_optional() {
    let destination = Arc::new(InMemoryBackend::new());
    let report =
        BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
            .replicate(&ReplicationScope::new().with_audit(false))
            .unwrap();

    for class in [
        ObjectClass::AuditSoftware,
        ObjectClass::AuditSoftwareOnClient,
        ObjectClass::AuditHardwareOnHost,
    ] {
        assert!(destination.get_objects(class, &Filter::new()).unwrap().is_empty());
        assert!(!report.classes.contains_key(&class));
    }
    // Licenses are off unless asked for.
    assert!(destination
        .get_objects(ObjectClass::LicensePool, &Filter::new())
        .unwrap()
        .is_empty());
}

#[test]
fn lenient_mode_skips_failed_records() {
    let destination = Arc::new(RecordingBackend::in_memory());
    destination.fail_method("insert_object");

    let report =
        BackendReplicator::new(shared_sample_backend(), destination.clone(), ReplicatorOptions::new())
            .replicate(&ReplicationScope::new())
            .unwrap();

    assert_eq!(report.written(), 0);
    assert_eq!(report.failed(), sample_backend().len() - 4);
    assert_eq!(destination.call_count("create_objects"), 0);
}

#[test]
fn strict_mode_writes_in_bulk_and_aborts() {
    let destination = Arc::new(RecordingBackend::in_memory());
    let options = ReplicatorOptions::new().with_strict(true);

    BackendReplicator::new(shared_sample_backend(), destination.clone(), options.clone())
        .replicate(&ReplicationScope::new())
        .unwrap();
    assert_eq!(destination.call_count("insert_object"), 0);
    // One bulk write per host type.
    assert_eq!(destination.call_count_for("create_objects", ObjectClass::Host), 3);

    destination.fail_method("create_objects");
    let result = BackendReplicator::new(shared_sample_backend(), destination.clone(), options)
        .replicate(&ReplicationScope::new());
    assert!(result.is_err());
}

#[test]
fn rename_makes_new_id_the_config_server() {
    let destination = Arc::new(InMemoryBackend::new());
    let options = ReplicatorOptions::new().with_new_server_id("NewConfig.example.org");

    let report = BackendReplicator::new(shared_sample_backend(), destination.clone(), options)
        .replicate(&ReplicationScope::new())
        .unwrap();

    assert_eq!(
        report.renamed,
        Some((CONFIG_SERVER.to_string(), "newconfig.example.org".to_string()))
    );
    assert_eq!(
        host_ids(&*destination, ObjectType::OpsiConfigserver),
        vec!["newconfig.example.org"]
    );
    let depots: Vec<Object> = destination
        .get_objects(
            ObjectClass::Host,
            &Filter::new().with("id", [DEPOT1, DEPOT2]),
        )
        .unwrap();
    assert!(depots
        .iter()
        .all(|depot| depot.object_type() == ObjectType::OpsiDepotserver));

    let server = destination
        .get_objects(
            ObjectClass::Host,
            &Filter::new().with_value("id", "newconfig.example.org"),
        )
        .unwrap();
    assert_eq!(
        server[0].get_str("depotRemoteUrl"),
        Some("smb://newconfig.example.org/depot")
    );

    let config = destination
        .get_objects(
            ObjectClass::Config,
            &Filter::new().with_value("id", DEPOT_ASSIGNMENT_CONFIG_ID),
        )
        .unwrap();
    assert_eq!(
        config[0].get("defaultValues"),
        Some(&serde_json::json!(["newconfig.example.org"]))
    );
}

#[test]
fn rename_can_promote_a_depot() {
    let destination = Arc::new(InMemoryBackend::new());
    let options = ReplicatorOptions::new()
        .with_old_server_id(CONFIG_SERVER)
        .with_new_server_id(DEPOT1);

    // Renaming onto an existing depot id merges the two records.
    BackendReplicator::new(shared_sample_backend(), destination.clone(), options)
        .replicate(&ReplicationScope::new().with_audit(false))
        .unwrap();

    assert_eq!(host_ids(&*destination, ObjectType::OpsiConfigserver), vec![DEPOT1]);
}

#[derive(Default)]
struct Ticks(Mutex<Vec<ProgressSnapshot>>);

impl ProgressObserver for Ticks {
    fn progress_changed(&self, snapshot: &ProgressSnapshot) {
        self.0.lock().push(snapshot.clone());
    }
}

#[test]
fn progress_ticks_once_per_class() {
    let replicator = BackendReplicator::new(
        shared_sample_backend(),
        Arc::new(InMemoryBackend::new()),
        ReplicatorOptions::new(),
    );
    let ticks = Arc::new(Ticks::default());
    replicator.overall_progress().attach(ticks.clone());

    let scope = ReplicationScope::new().with_audit(false);
    replicator.replicate(&scope).unwrap();

    let last = replicator.overall_progress().snapshot();
    assert_eq!(last.end, scope.classes().len() as u64);
    assert_eq!(last.state, last.end);
    assert_eq!(last.percent(), 100);
    assert!(!ticks.0.lock().is_empty());
}

//! Integration tests for the client cache backend.

use hostbase_backend::{Backend, Filter, HostKeyCipher, ModulesDescriptor, SharedBackend};
use hostbase_object::{Object, ObjectClass, ObjectType};
use hostbase_sync::{CacheConfig, ClientCacheBackend, Command, Modification};
use hostbase_testkit::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    master: Arc<RecordingBackend>,
    work: SharedBackend,
    snapshot: SharedBackend,
    cache: ClientCacheBackend,
    dir: TempDir,
}

fn unsynced_cache() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let master = Arc::new(RecordingBackend::new(shared_sample_backend()));
    let work = empty_backend();
    let snapshot = empty_backend();
    let cache = ClientCacheBackend::builder()
        .work_backend(work.clone())
        .snapshot_backend(snapshot.clone())
        .master_backend(master.clone())
        .client_id(CLIENT1)
        .depot_id(DEPOT1)
        .config(CacheConfig::in_dir(dir.path()))
        .build()
        .unwrap();
    Fixture {
        master,
        work,
        snapshot,
        cache,
        dir,
    }
}

fn synced_cache() -> Fixture {
    let fixture = unsynced_cache();
    fixture.cache.replicate_master_to_work_backend().unwrap();
    fixture.master.clear_calls();
    fixture
}

fn product_state(backend: &dyn Backend, product_id: &str) -> Option<Object> {
    backend
        .get_objects(
            ObjectClass::ProductOnClient,
            &Filter::new()
                .with_value("productId", product_id)
                .with_value("clientId", CLIENT1),
        )
        .unwrap()
        .into_iter()
        .next()
}

fn local_state(product_id: &str) -> Object {
    Object::product_on_client(product_id, "LocalbootProduct", CLIENT1)
}

#[test]
fn replicate_pulls_only_this_client_and_depot() {
    let f = synced_cache();

    assert_eq!(host_ids(&*f.work, ObjectType::OpsiClient), vec![CLIENT1]);
    assert_eq!(
        host_ids(&*f.work, ObjectType::OpsiDepotserver),
        vec![CONFIG_SERVER, DEPOT1]
    );
    for class in [
        ObjectClass::AuditSoftware,
        ObjectClass::AuditSoftwareOnClient,
        ObjectClass::AuditHardwareOnHost,
    ] {
        assert!(f.work.get_objects(class, &Filter::new()).unwrap().is_empty());
    }
    assert!(f.cache.tracker().is_empty());

    // The snapshot is the work store before the license side writes.
    let work_keys = object_keys(&*f.work);
    let snapshot_keys = object_keys(&*f.snapshot);
    assert!(snapshot_keys.is_subset(&work_keys));
    assert!(snapshot_keys.contains(&format!("Host {CLIENT1}")));
}

#[test]
fn replicate_reserves_licenses_for_pending_actions() {
    let f = synced_cache();

    let reservations = f
        .master
        .get_objects(
            ObjectClass::LicenseOnClient,
            &Filter::new().with_value("clientId", CLIENT1),
        )
        .unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].get_str("licensePoolId"), Some(OFFICE_POOL));

    let local = f
        .work
        .get_objects(ObjectClass::LicenseOnClient, &Filter::new())
        .unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(
        f.work
            .get_objects(ObjectClass::LicensePool, &Filter::new())
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        f.work
            .get_objects(ObjectClass::SoftwareLicense, &Filter::new())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn failed_license_reservation_is_not_fatal() {
    let f = unsynced_cache();
    f.master.fail_method("license_on_client_get_or_create");

    f.cache.replicate_master_to_work_backend().unwrap();
    assert!(f
        .work
        .get_objects(ObjectClass::LicenseOnClient, &Filter::new())
        .unwrap()
        .is_empty());
}

#[test]
fn master_errors_propagate_from_replicate() {
    let f = unsynced_cache();
    f.master.fail_method("user_get_credentials");
    assert!(f.cache.replicate_master_to_work_backend().is_err());
}

#[test]
fn replicate_writes_local_files() {
    let f = synced_cache();

    let modules = fs::read_to_string(f.dir.path().join("modules")).unwrap();
    assert!(modules.contains("multiplex = yes"));
    assert!(modules.contains("customer = Example Org"));
    let descriptor = ModulesDescriptor::from_modules_file(&modules);
    assert!(descriptor.is_enabled("license_management"));

    let version = fs::read_to_string(f.dir.path().join("version")).unwrap();
    assert_eq!(version, "4.3.0.0");

    let passwd = fs::read_to_string(f.dir.path().join("passwd")).unwrap();
    assert!(!passwd.contains(SERVICE_PASSWORD));
    let (user, encrypted) = passwd.trim_end().split_once(':').unwrap();
    assert_eq!(user, "pcpatch");
    let cipher = HostKeyCipher::new(&host_key(CLIENT1)).unwrap();
    assert_eq!(cipher.decrypt(encrypted).unwrap(), SERVICE_PASSWORD);

    let schema: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(f.dir.path().join("hwaudit.json")).unwrap())
            .unwrap();
    assert_eq!(schema, sample_audit_hardware_config());
}

#[test]
fn admin_calls_are_served_locally() {
    let f = synced_cache();

    assert_eq!(f.cache.backend_info().unwrap().opsi_version, "4.3.0.0");
    assert_eq!(
        f.cache.audit_hardware_get_config().unwrap(),
        sample_audit_hardware_config()
    );
    let credentials = f.cache.user_get_credentials("pcpatch", CLIENT1).unwrap();
    let cipher = HostKeyCipher::new(&host_key(CLIENT1)).unwrap();
    assert_eq!(cipher.decrypt(&credentials.password).unwrap(), SERVICE_PASSWORD);
    assert_eq!(f.master.total_calls(), 0);
}

#[test]
fn delete_applies_when_master_only_touched_modification_time() {
    let f = synced_cache();
    let firefox = product_state(&*f.master, "firefox").unwrap();
    f.master
        .update_object(&firefox.clone_ident_only().with("modificationTime", "2030-01-01 00:00:00"))
        .unwrap();

    f.cache.delete_objects(&[local_state("firefox")]).unwrap();
    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.deleted, 1);
    assert!(product_state(&*f.master, "firefox").is_none());
    assert!(f.cache.tracker().is_empty());
}

#[test]
fn delete_suppressed_when_master_changed_the_record() {
    let f = synced_cache();
    f.master
        .update_object(&local_state("firefox").with("actionRequest", "uninstall"))
        .unwrap();

    f.cache.delete_objects(&[local_state("firefox")]).unwrap();
    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.deleted, 0);
    assert_eq!(report.skipped, 1);
    let kept = product_state(&*f.master, "firefox").unwrap();
    assert_eq!(kept.get_str("actionRequest"), Some("uninstall"));
    assert_eq!(f.master.call_count("delete_objects"), 0);
}

#[test]
fn server_side_action_request_wins() {
    let f = synced_cache();
    f.master
        .update_object(&local_state("firefox").with("actionRequest", "uninstall"))
        .unwrap();

    f.cache
        .update_object(
            &local_state("firefox")
                .with("actionRequest", "setup")
                .with("installationStatus", "installed")
                .with("actionProgress", "done")
                .with("actionResult", "successful"),
        )
        .unwrap();
    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.action_requests_dropped, 1);
    let pushed = product_state(&*f.master, "firefox").unwrap();
    assert_eq!(pushed.get_str("actionRequest"), Some("uninstall"));
    assert_eq!(pushed.get_str("installationStatus"), Some("installed"));
    assert_eq!(pushed.get_str("actionProgress"), Some("done"));
    assert_eq!(pushed.get_str("actionResult"), Some("successful"));
}

#[test]
fn local_action_request_propagates_without_conflict() {
    let f = synced_cache();
    f.cache
        .update_object(&local_state("firefox").with("actionRequest", "setup"))
        .unwrap();

    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.action_requests_dropped, 0);
    assert_eq!(
        product_state(&*f.master, "firefox")
            .unwrap()
            .get_str("actionRequest"),
        Some("setup")
    );
}

#[test]
fn new_local_state_is_created_on_master() {
    let f = synced_cache();
    f.cache
        .insert_object(&local_state("7zip").with("actionRequest", "setup"))
        .unwrap();

    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.created, 1);
    let created = product_state(&*f.master, "7zip").unwrap();
    assert_eq!(created.get_str("actionRequest"), Some("setup"));
}

#[test]
fn product_states_go_out_in_bulk() {
    let f = synced_cache();
    f.cache
        .update_objects(&[
            local_state("firefox").with("actionRequest", "setup"),
            local_state("office").with("installationStatus", "installed"),
        ])
        .unwrap();

    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(f.master.call_count("update_objects"), 1);
    assert_eq!(f.master.call_count("update_object"), 0);
}

#[test]
fn hardware_inventory_is_replaced() {
    let f = synced_cache();
    f.cache
        .insert_object(
            &Object::audit_hardware_on_host(CLIENT1, "NETWORK_CONTROLLER").with("name", "eth0"),
        )
        .unwrap();

    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.audit_pushed, 1);
    assert_eq!(f.master.call_count("audit_hardware_on_host_set_obsolete"), 1);
    let inventory = f
        .master
        .get_objects(
            ObjectClass::AuditHardwareOnHost,
            &Filter::new().with_value("hostId", CLIENT1),
        )
        .unwrap();
    assert_eq!(inventory.len(), 2);
    for item in inventory {
        let expected = if item.get_str("hardwareClass") == Some("NETWORK_CONTROLLER") {
            1
        } else {
            0
        };
        assert_eq!(item.get("state"), Some(&serde_json::json!(expected)));
    }
}

#[test]
fn software_inventory_is_replaced() {
    let f = synced_cache();
    f.cache
        .create_objects(&[
            Object::audit_software("7zip", "7-Zip", "23.01"),
            Object::audit_software_on_client("7zip", "7-Zip", "23.01", CLIENT1),
        ])
        .unwrap();

    f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(
        f.master
            .get_objects(ObjectClass::AuditSoftware, &Filter::new())
            .unwrap()
            .len(),
        2
    );
    let on_client = f
        .master
        .get_objects(
            ObjectClass::AuditSoftwareOnClient,
            &Filter::new().with_value("clientId", CLIENT1),
        )
        .unwrap();
    assert_eq!(on_client.len(), 1);
    assert_eq!(on_client[0].get_str("softwareId"), Some("7zip"));
}

#[test]
fn software_items_update_known_records() {
    let f = synced_cache();
    f.cache
        .create_objects(&[
            Object::audit_software("firefox", "Mozilla Firefox", "115.0").with("installSize", 2048),
            Object::audit_software("7zip", "7-Zip", "23.01"),
        ])
        .unwrap();

    let report = f.cache.update_master_from_work_backend().unwrap();

    assert_eq!(report.audit_pushed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(f.master.call_count_for("update_object", ObjectClass::AuditSoftware), 2);
    assert_eq!(f.master.call_count_for("insert_object", ObjectClass::AuditSoftware), 1);
    assert_eq!(f.master.call_count_for("create_objects", ObjectClass::AuditSoftware), 0);
    let firefox = f
        .master
        .get_objects(
            ObjectClass::AuditSoftware,
            &Filter::new().with_value("softwareId", "firefox"),
        )
        .unwrap();
    assert_eq!(firefox.len(), 1);
    assert_eq!(firefox[0].get("installSize"), Some(&serde_json::json!(2048)));
}

#[test]
fn failed_push_keeps_modifications() {
    let f = synced_cache();
    f.master.fail_method("update_objects");
    f.cache
        .update_object(&local_state("firefox").with("actionRequest", "setup"))
        .unwrap();

    assert!(f.cache.update_master_from_work_backend().is_err());
    assert_eq!(f.cache.tracker().len(), 1);

    f.master.heal_method("update_objects");
    let report = f.cache.update_master_from_work_backend().unwrap();
    assert_eq!(report.updated, 1);
    assert!(f.cache.tracker().is_empty());
}

#[test]
fn unresolvable_modifications_are_skipped() {
    let f = synced_cache();
    let report = f
        .cache
        .update_master_from_modifications(&[
            Modification::by_ident(ObjectClass::ProductOnClient, "firefox", Command::Update),
            Modification::by_ident(
                ObjectClass::ProductOnClient,
                format!("missing;LocalbootProduct;{CLIENT1}"),
                Command::Update,
            ),
            Modification::of(
                Command::Update,
                &local_state("office").with("actionRequest", "uninstall"),
            ),
        ])
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.updated, 1);
}

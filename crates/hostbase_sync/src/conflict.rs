//! Reconciliation rules for product states changed on both sides.
//!
//! A client cache pushes its local ProductOnClient changes to the master.
//! The master may have changed the same record since the last sync; the
//! snapshot (the state at last sync) tells the two cases apart.

use hostbase_object::{objects_differ, Object};
use serde_json::Value;

/// Attributes a local update may carry to the master.
pub const ACTION_STATE_ATTRIBUTES: [&str; 4] = [
    "installationStatus",
    "actionProgress",
    "actionResult",
    "actionRequest",
];

/// Attributes ignored when deciding whether the master changed a record.
pub const VOLATILE_ATTRIBUTES: [&str; 1] = ["modificationTime"];

/// Why a local change was not pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The master no longer has the record.
    DeletedOnServer,
    /// The master changed the record since the last sync.
    ModifiedOnServer,
}

/// What to send to the master for one local change.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Delete the record on the master.
    Delete(Object),
    /// Update the existing master record.
    Update {
        /// Ident plus the carried action state.
        object: Object,
        /// True if the local action request lost against the master's.
        action_request_dropped: bool,
    },
    /// The master lacks the record; create it.
    Create(Object),
    /// Leave the master alone.
    Skip(SkipReason),
}

/// Decides a local delete.
///
/// `snapshot` is the record as it was at last sync, `master` the master's
/// current record. The delete goes through only if the master still holds
/// exactly what was known locally (modification time aside).
pub fn resolve_delete(local: &Object, snapshot: Option<&Object>, master: Option<&Object>) -> Resolution {
    let Some(master) = master else {
        return Resolution::Skip(SkipReason::DeletedOnServer);
    };
    match snapshot {
        Some(known) if !objects_differ(known, master, &VOLATILE_ATTRIBUTES) => {
            Resolution::Delete(local.clone_ident_only())
        }
        _ => Resolution::Skip(SkipReason::ModifiedOnServer),
    }
}

/// Decides a local insert or update.
///
/// Only the action state travels. If the master's action request moved
/// away from the snapshot's, the local one is dropped (set to null so an
/// update leaves the master's value untouched) while the other three
/// attributes still propagate.
pub fn resolve_update(local: &Object, snapshot: Option<&Object>, master: Option<&Object>) -> Resolution {
    let mut object = local.clone_ident_only();
    for name in ACTION_STATE_ATTRIBUTES {
        if let Some(value) = local.get(name) {
            object.set(name, value.clone());
        }
    }

    let Some(master) = master else {
        let mut created = object;
        created.set_defaults();
        return Resolution::Create(created);
    };

    let mut action_request_dropped = false;
    if let Some(known) = snapshot {
        if known.get("actionRequest") != master.get("actionRequest") {
            object.set("actionRequest", Value::Null);
            action_request_dropped = true;
        }
    }
    Resolution::Update {
        object,
        action_request_dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poc(request: &str, time: &str) -> Object {
        let mut poc = Object::product_on_client("firefox", "LocalbootProduct", "c1")
            .with("actionRequest", request)
            .with("modificationTime", time);
        poc.set_defaults();
        poc
    }

    #[test]
    fn delete_applies_when_only_time_differs() {
        let known = poc("setup", "2024-01-01 10:00:00");
        let master = poc("setup", "2024-01-02 10:00:00");
        assert!(matches!(
            resolve_delete(&known, Some(&known), Some(&master)),
            Resolution::Delete(_)
        ));
    }

    #[test]
    fn delete_suppressed_when_master_changed() {
        let known = poc("setup", "2024-01-01 10:00:00");
        let master = poc("uninstall", "2024-01-02 10:00:00");
        assert_eq!(
            resolve_delete(&known, Some(&known), Some(&master)),
            Resolution::Skip(SkipReason::ModifiedOnServer)
        );
    }

    #[test]
    fn delete_of_record_gone_on_master() {
        let known = poc("setup", "2024-01-01 10:00:00");
        assert_eq!(
            resolve_delete(&known, Some(&known), None),
            Resolution::Skip(SkipReason::DeletedOnServer)
        );
    }

    #[test]
    fn update_carries_only_action_state() {
        let local = poc("setup", "2024-01-03 10:00:00")
            .with("installationStatus", "installed")
            .with("productVersion", "99");
        let known = poc("none", "2024-01-01 10:00:00");
        let master = poc("none", "2024-01-01 10:00:00");

        let Resolution::Update {
            object,
            action_request_dropped,
        } = resolve_update(&local, Some(&known), Some(&master))
        else {
            panic!("expected update");
        };
        assert!(!action_request_dropped);
        assert_eq!(object.get_str("actionRequest"), Some("setup"));
        assert_eq!(object.get_str("installationStatus"), Some("installed"));
        assert!(object.get("productVersion").is_none());
        assert!(object.get("modificationTime").is_none());
    }

    #[test]
    fn server_side_action_request_wins() {
        let local = poc("setup", "2024-01-03 10:00:00")
            .with("installationStatus", "installed")
            .with("actionResult", "successful");
        let known = poc("none", "2024-01-01 10:00:00");
        let master = poc("uninstall", "2024-01-02 10:00:00");

        let Resolution::Update {
            object,
            action_request_dropped,
        } = resolve_update(&local, Some(&known), Some(&master))
        else {
            panic!("expected update");
        };
        assert!(action_request_dropped);
        assert!(object.get("actionRequest").is_none());
        assert_eq!(object.get_str("installationStatus"), Some("installed"));
        assert_eq!(object.get_str("actionResult"), Some("successful"));
    }

    #[test]
    fn update_without_master_record_creates() {
        let local = poc("setup", "2024-01-03 10:00:00");
        assert!(matches!(
            resolve_update(&local, None, None),
            Resolution::Create(_)
        ));
    }
}

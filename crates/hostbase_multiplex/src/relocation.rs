//! Moving a client between services.
//!
//! A move copies the client and everything hanging off it to the
//! destination, writes the new depot assignment there, and only deletes
//! from the source once the destination shows the client. A client is
//! never absent from both services, and a failed move leaves the source as
//! it was.

use crate::service::Service;
use hostbase_backend::{Backend, Filter};
use hostbase_object::{Object, ObjectClass, ObjectType, DEPOT_ASSIGNMENT_CONFIG_ID};
use serde_json::Value;

/// How a depot assignment was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    /// A staged client was created on its first service.
    Materialized {
        /// Destination depot.
        depot_id: String,
    },
    /// The client already lived on the designated service.
    Updated {
        /// The service's depot.
        depot_id: String,
    },
    /// The client moved and was removed from the source.
    Moved {
        /// Source depot.
        from: String,
        /// Destination depot.
        to: String,
    },
    /// The move was not confirmed; the source is untouched.
    Failed {
        /// Source depot.
        from: String,
        /// Destination depot.
        to: String,
        /// What went wrong.
        reason: String,
    },
}

impl RelocationOutcome {
    /// Returns true unless the relocation failed.
    pub fn is_success(&self) -> bool {
        !matches!(self, RelocationOutcome::Failed { .. })
    }
}

/// Records of one class read from the source, and whether they reached
/// the destination.
struct Batch {
    label: &'static str,
    objects: Vec<Object>,
    copied: bool,
}

impl Batch {
    fn read(source: &dyn Backend, label: &'static str, class: ObjectClass, filter: Filter) -> Self {
        let objects = source.get_objects(class, &filter).unwrap_or_else(|e| {
            tracing::error!(step = label, error = %e, "failed to read from source");
            Vec::new()
        });
        Self {
            label,
            objects,
            copied: false,
        }
    }

    fn copy_to(&mut self, destination: &dyn Backend) {
        if self.objects.is_empty() {
            self.copied = true;
            return;
        }
        match destination.create_objects(&self.objects) {
            Ok(()) => {
                tracing::debug!(step = self.label, count = self.objects.len(), "copied to destination");
                self.copied = true;
            }
            Err(e) => {
                tracing::error!(step = self.label, error = %e, "failed to copy to destination");
            }
        }
    }

    fn remove_copy(&self, destination: &dyn Backend) {
        if !self.copied || self.objects.is_empty() {
            return;
        }
        if let Err(e) = destination.delete_objects(&self.objects) {
            tracing::error!(step = self.label, error = %e, "failed to remove copy from destination");
        }
    }

    fn delete_from(&self, source: &dyn Backend) {
        if self.objects.is_empty() {
            return;
        }
        if !self.copied {
            tracing::warn!(step = self.label, "not copied, keeping on source");
            return;
        }
        if let Err(e) = source.delete_objects(&self.objects) {
            tracing::error!(step = self.label, error = %e, "failed to delete from source");
        }
    }
}

/// Moves the client of depot assignment `state` from `source` to
/// `destination`. The caller holds the relocation lock.
///
/// If the destination refuses the new depot assignment, the records copied
/// so far are removed from it again and the source keeps everything.
pub(crate) fn move_client(source: &Service, destination: &Service, state: &Object) -> RelocationOutcome {
    let from = source.depot_id().to_string();
    let to = destination.depot_id().to_string();
    let fail = |reason: String| {
        tracing::error!(from = %from, to = %to, reason = %reason, "client relocation failed");
        RelocationOutcome::Failed {
            from: from.clone(),
            to: to.clone(),
            reason,
        }
    };
    let Some(client_id) = state.get_str("objectId") else {
        return fail("depot assignment names no client".into());
    };
    let (src, dst) = match (source.backend(), destination.backend()) {
        (Ok(src), Ok(dst)) => (src, dst),
        (Err(e), _) | (_, Err(e)) => return fail(e.to_string()),
    };
    tracing::info!(client_id, from = %from, to = %to, "moving client");

    let client_filter = Filter::new()
        .with_value("type", ObjectType::OpsiClient.name())
        .with_value("id", client_id);
    let mut host = Batch::read(&*src, "client", ObjectClass::Host, client_filter.clone());
    if host.objects.is_empty() {
        return fail(format!("client {client_id} not found on {from}"));
    }
    host.copy_to(&*dst);

    let mut memberships = Batch::read(
        &*src,
        "group memberships",
        ObjectClass::ObjectToGroup,
        Filter::new()
            .with_value("groupType", "HostGroup")
            .with_value("objectId", client_id),
    );
    memberships.copy_to(&*dst);

    let group_ids: Vec<Value> = memberships
        .objects
        .iter()
        .filter_map(|membership| membership.get("groupId").cloned())
        .collect();
    if !group_ids.is_empty() {
        let mut groups = Batch::read(
            &*src,
            "groups",
            ObjectClass::Group,
            Filter::new().with("id", group_ids),
        );
        groups.copy_to(&*dst);
    }

    let mut product_states = Batch::read(
        &*src,
        "product states",
        ObjectClass::ProductOnClient,
        Filter::new().with_value("clientId", client_id),
    );
    product_states.copy_to(&*dst);

    let mut property_states = Batch::read(
        &*src,
        "property states",
        ObjectClass::ProductPropertyState,
        Filter::new().with_value("objectId", client_id),
    );
    property_states.copy_to(&*dst);

    let mut config_states = Batch::read(
        &*src,
        "config states",
        ObjectClass::ConfigState,
        Filter::new().with_value("objectId", client_id),
    );
    let mut assignment = Batch {
        label: "depot assignment",
        objects: Vec::new(),
        copied: false,
    };
    let (assignments, others): (Vec<Object>, Vec<Object>) = config_states
        .objects
        .drain(..)
        .partition(|cs| cs.get_str("configId") == Some(DEPOT_ASSIGNMENT_CONFIG_ID));
    config_states.objects = others;
    assignment.objects = assignments;
    config_states.copy_to(&*dst);

    let mut software = Batch::read(
        &*src,
        "software inventory",
        ObjectClass::AuditSoftwareOnClient,
        Filter::new().with_value("clientId", client_id),
    );
    software.copy_to(&*dst);

    let mut hardware = Batch::read(
        &*src,
        "hardware inventory",
        ObjectClass::AuditHardwareOnHost,
        Filter::new().with_value("hostId", client_id),
    );
    hardware.copy_to(&*dst);

    if let Err(e) = dst.insert_object(state) {
        // Without the new assignment the source's one is the only record of
        // where the client lives.
        for batch in [
            &host,
            &memberships,
            &product_states,
            &property_states,
            &config_states,
            &software,
            &hardware,
        ] {
            batch.remove_copy(&*dst);
        }
        return fail(format!("failed to write depot assignment on {to}: {e}"));
    }
    assignment.copied = true;
    if let Err(e) = destination.refresh() {
        tracing::warn!(to = %to, error = %e, "failed to refresh destination");
    }

    let arrived = dst
        .get_objects(ObjectClass::Host, &client_filter)
        .map(|found| found.iter().any(|h| h.id() == Some(client_id)))
        .unwrap_or(false);
    if !arrived {
        return fail(format!("client {client_id} was not found on destination {to}"));
    }

    // Already unbound licenses no longer match, so repeating this is a no-op.
    let bound = Batch::read(
        &*src,
        "bound licenses",
        ObjectClass::SoftwareLicense,
        Filter::new().with_value("boundToHost", client_id),
    );
    for license in &bound.objects {
        if let Err(e) = src.insert_object(&license.clone().with("boundToHost", Value::Null)) {
            tracing::error!(license = ?license.id(), error = %e, "failed to unbind software license");
        }
    }

    host.delete_from(&*src);
    memberships.delete_from(&*src);
    product_states.delete_from(&*src);
    property_states.delete_from(&*src);
    config_states.delete_from(&*src);
    assignment.delete_from(&*src);
    software.delete_from(&*src);
    hardware.delete_from(&*src);
    let reservations = Batch {
        copied: true,
        ..Batch::read(
            &*src,
            "license reservations",
            ObjectClass::LicenseOnClient,
            Filter::new().with_value("clientId", client_id),
        )
    };
    reservations.delete_from(&*src);
    if let Err(e) = source.refresh() {
        tracing::warn!(from = %from, error = %e, "failed to refresh source");
    }

    tracing::info!(client_id, from = %from, to = %to, "client moved");
    RelocationOutcome::Moved { from, to }
}

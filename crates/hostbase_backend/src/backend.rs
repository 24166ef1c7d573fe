//! The uniform object CRUD contract.

use crate::credentials::Credentials;
use crate::error::{BackendError, BackendResult};
use crate::filter::Filter;
use crate::info::BackendInfo;
use hostbase_object::{Object, ObjectClass, ObjectType, DEPOT_ASSIGNMENT_CONFIG_ID};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attributes that reference a host id, per class.
const HOST_REFERENCES: &[(ObjectClass, &str)] = &[
    (ObjectClass::ConfigState, "objectId"),
    (ObjectClass::ProductOnDepot, "depotId"),
    (ObjectClass::ProductPropertyState, "objectId"),
    (ObjectClass::ObjectToGroup, "objectId"),
    (ObjectClass::AuditHardwareOnHost, "hostId"),
    (ObjectClass::SoftwareLicense, "boundToHost"),
];

/// A data store exposing the object CRUD contract.
///
/// Every backend answers the same per-class method family: filtered
/// reads, create-or-replace inserts, must-exist updates, bulk creates and
/// idempotent deletes. The extended operations have default
/// implementations built on those primitives.
///
/// # Invariants
///
/// - Records are keyed by class and ident; inserting an object with an
///   existing ident replaces the record.
/// - `update_object` merges the non-null attributes of its argument onto
///   the stored record and fails if none is stored.
/// - `delete_objects` ignores records that do not exist.
/// - Backends must be `Send + Sync` for concurrent access.
pub trait Backend: Send + Sync {
    /// Returns version and module license information.
    fn backend_info(&self) -> BackendResult<BackendInfo>;

    /// Provisions the backend's schema. Idempotent.
    fn backend_create_base(&self) -> BackendResult<()>;

    /// Removes every record. Idempotent.
    fn backend_delete_base(&self) -> BackendResult<()>;

    /// Returns the records of `class` matching `filter`.
    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>>;

    /// Creates or replaces a record by ident.
    fn insert_object(&self, object: &Object) -> BackendResult<()>;

    /// Updates an existing record by ident.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingObject`] if no record has the ident.
    fn update_object(&self, object: &Object) -> BackendResult<()>;

    /// Updates several records.
    fn update_objects(&self, objects: &[Object]) -> BackendResult<()> {
        for object in objects {
            self.update_object(object)?;
        }
        Ok(())
    }

    /// Creates several records, all or none.
    ///
    /// The default validates every ident before writing anything.
    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        for object in objects {
            validate_ident(object)?;
        }
        for object in objects {
            self.insert_object(object)?;
        }
        Ok(())
    }

    /// Deletes records by ident. Absent records are skipped.
    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()>;

    /// Returns the rendered idents of the matching records.
    fn get_idents(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<String>> {
        Ok(self
            .get_objects(class, filter)?
            .iter()
            .map(|object| object.ident().to_string())
            .collect())
    }

    /// Resolves a host filter (wildcards included) to host ids.
    fn host_get_idents(&self, filter: &Filter) -> BackendResult<Vec<String>> {
        self.get_idents(ObjectClass::Host, filter)
    }

    /// Renames a depot server and rewrites every reference to it.
    fn host_rename_depotserver(&self, old_id: &str, new_id: &str) -> BackendResult<()> {
        let hosts = self.get_objects(
            ObjectClass::Host,
            &Filter::new()
                .with_value("type", "OpsiDepotserver")
                .with_value("id", old_id),
        )?;
        let Some(host) = hosts.into_iter().next() else {
            return Err(BackendError::missing_object("Host", old_id));
        };

        let mut renamed = host.clone().with("id", new_id);
        let url_attributes: Vec<(String, String)> = renamed
            .attributes()
            .filter(|(name, _)| name.ends_with("Url"))
            .filter_map(|(name, value)| Some((name.to_string(), value.as_str()?.to_string())))
            .collect();
        for (name, url) in url_attributes {
            renamed.set(&name, url.replace(old_id, new_id));
        }
        self.insert_object(&renamed)?;

        for (class, attribute) in HOST_REFERENCES {
            let referencing =
                self.get_objects(*class, &Filter::new().with_value(attribute, old_id))?;
            for object in referencing {
                let moved = object.clone().with(attribute, new_id);
                if moved.ident() != object.ident() {
                    self.delete_objects(std::slice::from_ref(&object))?;
                }
                self.insert_object(&moved)?;
            }
        }

        // Depot assignments name the depot in their values.
        let assignments = self.get_objects(
            ObjectClass::ConfigState,
            &Filter::new()
                .with_value("configId", DEPOT_ASSIGNMENT_CONFIG_ID)
                .with_value("values", old_id),
        )?;
        for state in assignments {
            let values = replace_in_list(state.get("values"), old_id, new_id);
            self.insert_object(&state.with("values", values))?;
        }
        let configs = self.get_objects(
            ObjectClass::Config,
            &Filter::new().with_value("id", DEPOT_ASSIGNMENT_CONFIG_ID),
        )?;
        for config in configs {
            let defaults = replace_in_list(config.get("defaultValues"), old_id, new_id);
            let possible = replace_in_list(config.get("possibleValues"), old_id, new_id);
            self.insert_object(
                &config
                    .with("defaultValues", defaults)
                    .with("possibleValues", possible),
            )?;
        }

        self.delete_objects(&[host])?;
        tracing::info!(old_id, new_id, "renamed depot server");
        Ok(())
    }

    /// Marks a host's hardware inventory obsolete (`state = 0`).
    fn audit_hardware_on_host_set_obsolete(&self, host_id: &str) -> BackendResult<()> {
        let current = self.get_objects(
            ObjectClass::AuditHardwareOnHost,
            &Filter::new().with_value("hostId", host_id),
        )?;
        let obsolete: Vec<Object> = current
            .into_iter()
            .filter(|object| object.get("state") != Some(&Value::from(0)))
            .map(|object| object.with("state", 0))
            .collect();
        self.update_objects(&obsolete)
    }

    /// Drops a client's software inventory.
    fn audit_software_on_client_set_obsolete(&self, client_id: &str) -> BackendResult<()> {
        let current = self.get_objects(
            ObjectClass::AuditSoftwareOnClient,
            &Filter::new().with_value("clientId", client_id),
        )?;
        self.delete_objects(&current)
    }

    /// Returns the client's license reservation for a product, creating
    /// one from a free software license if none exists.
    ///
    /// With `license_pool_id` the reservation comes from that pool;
    /// otherwise from any pool listing the product.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NoFreeLicense`] if every candidate license
    /// is used up or bound to another host.
    fn license_on_client_get_or_create(
        &self,
        client_id: &str,
        product_id: &str,
        license_pool_id: Option<&str>,
    ) -> BackendResult<Object> {
        let pool_filter = match license_pool_id {
            Some(pool_id) => Filter::new().with_value("id", pool_id),
            None => Filter::new().with_value("productIds", product_id),
        };
        let pool_ids: Vec<Value> = self
            .get_objects(ObjectClass::LicensePool, &pool_filter)?
            .iter()
            .filter_map(|pool| pool.id().map(Value::from))
            .collect();
        let no_free_license = || BackendError::NoFreeLicense {
            product_id: product_id.to_string(),
            client_id: client_id.to_string(),
        };
        if pool_ids.is_empty() {
            return Err(no_free_license());
        }

        let existing = self.get_objects(
            ObjectClass::LicenseOnClient,
            &Filter::new()
                .with_value("clientId", client_id)
                .with("licensePoolId", pool_ids.clone()),
        )?;
        if let Some(reservation) = existing.into_iter().next() {
            return Ok(reservation);
        }

        let memberships = self.get_objects(
            ObjectClass::SoftwareLicenseToLicensePool,
            &Filter::new().with("licensePoolId", pool_ids),
        )?;
        for membership in memberships {
            let (Some(license_id), Some(pool_id)) = (
                membership.get_str("softwareLicenseId"),
                membership.get_str("licensePoolId"),
            ) else {
                continue;
            };
            let licenses = self.get_objects(
                ObjectClass::SoftwareLicense,
                &Filter::new().with_value("id", license_id),
            )?;
            let Some(license) = licenses.first() else {
                continue;
            };
            if license
                .get_str("boundToHost")
                .is_some_and(|bound| bound != client_id)
            {
                continue;
            }
            let max = license
                .get("maxInstallations")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            let used = self
                .get_objects(
                    ObjectClass::LicenseOnClient,
                    &Filter::new().with_value("softwareLicenseId", license_id),
                )?
                .len() as i64;
            if max > 0 && used >= max {
                continue;
            }

            let mut reservation = Object::license_on_client(license_id, pool_id, client_id);
            if let Some(key) = membership.get_str("licenseKey").filter(|k| !k.is_empty()) {
                reservation.set("licenseKey", key);
            }
            reservation.set_defaults();
            self.insert_object(&reservation)?;
            tracing::debug!(client_id, license_id, pool_id, "reserved software license");
            return Ok(reservation);
        }
        Err(no_free_license())
    }

    /// Returns `username`'s credentials with the password encrypted under
    /// `host_id`'s host key.
    fn user_get_credentials(&self, username: &str, host_id: &str) -> BackendResult<Credentials> {
        let _ = (username, host_id);
        Err(BackendError::not_supported("user_getCredentials"))
    }

    /// Stores `username`'s password.
    fn user_set_credentials(&self, username: &str, password: &str) -> BackendResult<()> {
        let _ = (username, password);
        Err(BackendError::not_supported("user_setCredentials"))
    }

    /// Returns the hardware inventory schema description.
    fn audit_hardware_get_config(&self) -> BackendResult<Value> {
        Err(BackendError::not_supported("auditHardware_getConfig"))
    }
}

/// Fails if any class ident attribute of `object` is unset.
pub fn validate_ident(object: &Object) -> BackendResult<()> {
    for name in object.class().ident_attributes() {
        if object.get(name).is_none() {
            return Err(hostbase_object::ObjectError::missing_attribute(
                object.object_type().name(),
                *name,
            )
            .into());
        }
    }
    Ok(())
}

fn replace_in_list(value: Option<&Value>, old: &str, new: &str) -> Value {
    match value {
        Some(Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item.as_str() {
                    Some(s) if s == old => Value::from(new),
                    _ => item.clone(),
                })
                .collect(),
        ),
        Some(other) => other.clone(),
        None => Value::Array(Vec::new()),
    }
}

/// Groups objects by class, keeping their order within a class.
pub fn group_by_class(objects: &[Object]) -> BTreeMap<ObjectClass, Vec<Object>> {
    let mut grouped: BTreeMap<ObjectClass, Vec<Object>> = BTreeMap::new();
    for object in objects {
        grouped
            .entry(object.class())
            .or_default()
            .push(object.clone());
    }
    grouped
}

/// Returns the host type a depot record should carry after a rename.
pub fn depot_type_for(id: &str, config_server_id: &str) -> ObjectType {
    if id == config_server_id {
        ObjectType::OpsiConfigserver
    } else {
        ObjectType::OpsiDepotserver
    }
}

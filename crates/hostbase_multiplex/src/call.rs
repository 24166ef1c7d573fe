//! Named backend calls.
//!
//! Remote callers address the backend by method name
//! (`productOnClient_getObjects`) and a JSON parameter list. Names parse
//! into the closed [`BackendCall`] enum; a name that fits no variant is
//! implemented by no service.

use crate::error::{MultiplexError, MultiplexResult};
use hostbase_backend::{Backend, BackendInfo, BackendResult, Filter};
use hostbase_object::{Object, ObjectClass};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One call of the backend contract.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `backend_info`.
    BackendInfo,
    /// `backend_createBase`.
    CreateBase,
    /// `backend_deleteBase`.
    DeleteBase,
    /// `<class>_getObjects`.
    GetObjects {
        /// Addressed class.
        class: ObjectClass,
        /// Record filter.
        filter: Filter,
    },
    /// `<class>_getIdents`.
    GetIdents {
        /// Addressed class.
        class: ObjectClass,
        /// Record filter.
        filter: Filter,
    },
    /// `<class>_insertObject`.
    InsertObject(Object),
    /// `<class>_updateObject`.
    UpdateObject(Object),
    /// `<class>_updateObjects`.
    UpdateObjects(Vec<Object>),
    /// `<class>_createObjects`.
    CreateObjects(Vec<Object>),
    /// `<class>_deleteObjects`.
    DeleteObjects(Vec<Object>),
    /// `host_renameOpsiDepotserver`.
    RenameDepotserver {
        /// Current id.
        old_id: String,
        /// New id.
        new_id: String,
    },
    /// `auditHardwareOnHost_setObsolete`.
    AuditHardwareSetObsolete(String),
    /// `auditSoftwareOnClient_setObsolete`.
    AuditSoftwareSetObsolete(String),
    /// `licenseOnClient_getOrCreateObject`.
    LicenseOnClientGetOrCreate {
        /// Client needing the license.
        client_id: String,
        /// Licensed product.
        product_id: String,
        /// Pool to take the license from.
        license_pool_id: Option<String>,
    },
}

/// Result of a call on one service, or the merge of several.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutput {
    /// Records.
    Objects(Vec<Object>),
    /// Rendered idents.
    Idents(Vec<String>),
    /// Backend information.
    Info(BackendInfo),
    /// Calls without a value.
    Done,
}

impl CallOutput {
    /// Concatenates outputs of one call from several services.
    pub fn concat(outputs: impl IntoIterator<Item = CallOutput>) -> CallOutput {
        let mut merged: Option<CallOutput> = None;
        for output in outputs {
            merged = Some(match (merged, output) {
                (None, output) => output,
                (Some(CallOutput::Objects(mut all)), CallOutput::Objects(more)) => {
                    all.extend(more);
                    CallOutput::Objects(all)
                }
                (Some(CallOutput::Idents(mut all)), CallOutput::Idents(more)) => {
                    all.extend(more);
                    CallOutput::Idents(all)
                }
                (Some(first), _) => first,
            });
        }
        merged.unwrap_or(CallOutput::Done)
    }

    /// Returns the records, if any.
    pub fn into_objects(self) -> Vec<Object> {
        match self {
            CallOutput::Objects(objects) => objects,
            _ => Vec::new(),
        }
    }

    /// Returns the idents, if any.
    pub fn into_idents(self) -> Vec<String> {
        match self {
            CallOutput::Idents(idents) => idents,
            _ => Vec::new(),
        }
    }

    /// Renders the output as a JSON result list.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            CallOutput::Objects(objects) => objects
                .iter()
                .map(|object| Value::Object(object.to_hash()))
                .collect(),
            CallOutput::Idents(idents) => idents.into_iter().map(Value::String).collect(),
            CallOutput::Info(info) => serde_json::to_value(info).into_iter().collect(),
            CallOutput::Done => Vec::new(),
        }
    }
}

fn object_param(method: &str, value: Option<&Value>) -> MultiplexResult<Object> {
    let value = value.ok_or_else(|| MultiplexError::bad_call(method, "missing object"))?;
    Ok(Object::from_value(value)?)
}

fn object_list_param(method: &str, value: Option<&Value>) -> MultiplexResult<Vec<Object>> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| Object::from_value(item).map_err(MultiplexError::from))
            .collect(),
        Some(single) => Ok(vec![Object::from_value(single)?]),
        None => Err(MultiplexError::bad_call(method, "missing object list")),
    }
}

fn string_param(method: &str, value: Option<&Value>, name: &str) -> MultiplexResult<String> {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MultiplexError::bad_call(method, format!("missing {name}")))
}

// Filters come last: `[attributes, filter]` or `[filter]`.
fn filter_param(params: &[Value]) -> Filter {
    match params.last() {
        Some(Value::Object(hash)) => Filter::from_json(hash),
        _ => Filter::new(),
    }
}

impl BackendCall {
    /// Parses a named call.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::NoServiceImplements`] for unknown names and
    /// [`MultiplexError::BadCall`] for parameters that do not fit.
    pub fn parse(method: &str, params: &[Value]) -> MultiplexResult<Self> {
        let unknown = || MultiplexError::NoServiceImplements(method.to_string());
        let (prefix, operation) = method.split_once('_').ok_or_else(unknown)?;

        match (prefix, operation) {
            ("backend", "info") => return Ok(BackendCall::BackendInfo),
            ("backend", "createBase") => return Ok(BackendCall::CreateBase),
            ("backend", "deleteBase") => return Ok(BackendCall::DeleteBase),
            ("host", "renameOpsiDepotserver") => {
                return Ok(BackendCall::RenameDepotserver {
                    old_id: string_param(method, params.first(), "old id")?,
                    new_id: string_param(method, params.get(1), "new id")?,
                })
            }
            ("auditHardwareOnHost", "setObsolete") => {
                return Ok(BackendCall::AuditHardwareSetObsolete(string_param(
                    method,
                    params.first(),
                    "host id",
                )?))
            }
            ("auditSoftwareOnClient", "setObsolete") => {
                return Ok(BackendCall::AuditSoftwareSetObsolete(string_param(
                    method,
                    params.first(),
                    "client id",
                )?))
            }
            ("licenseOnClient", "getOrCreateObject") => {
                return Ok(BackendCall::LicenseOnClientGetOrCreate {
                    client_id: string_param(method, params.first(), "client id")?,
                    license_pool_id: params.get(1).and_then(Value::as_str).map(str::to_string),
                    product_id: string_param(method, params.get(2), "product id")?,
                })
            }
            _ => {}
        }

        let class = ObjectClass::from_method_prefix(prefix).ok_or_else(unknown)?;
        let call = match operation {
            "getObjects" => BackendCall::GetObjects {
                class,
                filter: filter_param(params),
            },
            "getIdents" => BackendCall::GetIdents {
                class,
                filter: filter_param(params),
            },
            "insertObject" => BackendCall::InsertObject(object_param(method, params.first())?),
            "updateObject" => BackendCall::UpdateObject(object_param(method, params.first())?),
            "updateObjects" => {
                BackendCall::UpdateObjects(object_list_param(method, params.first())?)
            }
            "createObjects" => {
                BackendCall::CreateObjects(object_list_param(method, params.first())?)
            }
            "deleteObjects" => {
                BackendCall::DeleteObjects(object_list_param(method, params.first())?)
            }
            _ => return Err(unknown()),
        };
        if let Some(object) = call.objects().iter().find(|object| object.class() != class) {
            return Err(MultiplexError::bad_call(
                method,
                format!("{} is not a {}", object.object_type(), class),
            ));
        }
        Ok(call)
    }

    /// Returns the objects the call carries.
    pub fn objects(&self) -> &[Object] {
        match self {
            BackendCall::InsertObject(object) | BackendCall::UpdateObject(object) => {
                std::slice::from_ref(object)
            }
            BackendCall::UpdateObjects(objects)
            | BackendCall::CreateObjects(objects)
            | BackendCall::DeleteObjects(objects) => objects,
            _ => &[],
        }
    }

    /// Returns the class the call addresses, if any.
    pub fn class(&self) -> Option<ObjectClass> {
        match self {
            BackendCall::GetObjects { class, .. } | BackendCall::GetIdents { class, .. } => {
                Some(*class)
            }
            BackendCall::RenameDepotserver { .. } => Some(ObjectClass::Host),
            BackendCall::AuditHardwareSetObsolete(_) => Some(ObjectClass::AuditHardwareOnHost),
            BackendCall::AuditSoftwareSetObsolete(_) => Some(ObjectClass::AuditSoftwareOnClient),
            BackendCall::LicenseOnClientGetOrCreate { .. } => Some(ObjectClass::LicenseOnClient),
            _ => self.objects().first().map(Object::class),
        }
    }

    /// Renders the method name.
    pub fn method_name(&self) -> String {
        let prefix = self.class().map_or("backend", |class| class.method_prefix());
        let operation = match self {
            BackendCall::BackendInfo => "info",
            BackendCall::CreateBase => "createBase",
            BackendCall::DeleteBase => "deleteBase",
            BackendCall::GetObjects { .. } => "getObjects",
            BackendCall::GetIdents { .. } => "getIdents",
            BackendCall::InsertObject(_) => "insertObject",
            BackendCall::UpdateObject(_) => "updateObject",
            BackendCall::UpdateObjects(_) => "updateObjects",
            BackendCall::CreateObjects(_) => "createObjects",
            BackendCall::DeleteObjects(_) => "deleteObjects",
            BackendCall::RenameDepotserver { .. } => "renameOpsiDepotserver",
            BackendCall::AuditHardwareSetObsolete(_) | BackendCall::AuditSoftwareSetObsolete(_) => {
                "setObsolete"
            }
            BackendCall::LicenseOnClientGetOrCreate { .. } => "getOrCreateObject",
        };
        format!("{prefix}_{operation}")
    }

    /// Returns true if the call can change stored records.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            BackendCall::BackendInfo | BackendCall::GetObjects { .. } | BackendCall::GetIdents { .. }
        )
    }

    /// Collects every string the call mentions, for ownership lookups.
    ///
    /// Lists and maps are unpacked recursively.
    pub fn referenced_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        match self {
            BackendCall::GetObjects { filter, .. } | BackendCall::GetIdents { filter, .. } => {
                for value in filter.referenced_values() {
                    collect_strings(value, &mut ids);
                }
            }
            BackendCall::RenameDepotserver { old_id, new_id } => {
                ids.insert(old_id.clone());
                ids.insert(new_id.clone());
            }
            BackendCall::AuditHardwareSetObsolete(id) | BackendCall::AuditSoftwareSetObsolete(id) => {
                ids.insert(id.clone());
            }
            BackendCall::LicenseOnClientGetOrCreate { client_id, .. } => {
                ids.insert(client_id.clone());
            }
            _ => {
                for object in self.objects() {
                    for (_, value) in object.attributes() {
                        collect_strings(value, &mut ids);
                    }
                }
            }
        }
        ids
    }

    /// Runs the call against one backend.
    pub fn invoke(&self, backend: &dyn Backend) -> BackendResult<CallOutput> {
        Ok(match self {
            BackendCall::BackendInfo => CallOutput::Info(backend.backend_info()?),
            BackendCall::CreateBase => {
                backend.backend_create_base()?;
                CallOutput::Done
            }
            BackendCall::DeleteBase => {
                backend.backend_delete_base()?;
                CallOutput::Done
            }
            BackendCall::GetObjects { class, filter } => {
                CallOutput::Objects(backend.get_objects(*class, filter)?)
            }
            BackendCall::GetIdents { class: ObjectClass::Host, filter } => {
                CallOutput::Idents(backend.host_get_idents(filter)?)
            }
            BackendCall::GetIdents { class, filter } => {
                CallOutput::Idents(backend.get_idents(*class, filter)?)
            }
            BackendCall::InsertObject(object) => {
                backend.insert_object(object)?;
                CallOutput::Done
            }
            BackendCall::UpdateObject(object) => {
                backend.update_object(object)?;
                CallOutput::Done
            }
            BackendCall::UpdateObjects(objects) => {
                backend.update_objects(objects)?;
                CallOutput::Done
            }
            BackendCall::CreateObjects(objects) => {
                backend.create_objects(objects)?;
                CallOutput::Done
            }
            BackendCall::DeleteObjects(objects) => {
                backend.delete_objects(objects)?;
                CallOutput::Done
            }
            BackendCall::RenameDepotserver { old_id, new_id } => {
                backend.host_rename_depotserver(old_id, new_id)?;
                CallOutput::Done
            }
            BackendCall::AuditHardwareSetObsolete(host_id) => {
                backend.audit_hardware_on_host_set_obsolete(host_id)?;
                CallOutput::Done
            }
            BackendCall::AuditSoftwareSetObsolete(client_id) => {
                backend.audit_software_on_client_set_obsolete(client_id)?;
                CallOutput::Done
            }
            BackendCall::LicenseOnClientGetOrCreate {
                client_id,
                product_id,
                license_pool_id,
            } => CallOutput::Objects(vec![backend.license_on_client_get_or_create(
                client_id,
                product_id,
                license_pool_id.as_deref(),
            )?]),
        })
    }
}

fn collect_strings(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            ids.insert(s.clone());
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, ids);
            }
        }
        Value::Object(map) => collect_map_strings(map, ids),
        _ => {}
    }
}

fn collect_map_strings(map: &Map<String, Value>, ids: &mut BTreeSet<String>) {
    for value in map.values() {
        collect_strings(value, ids);
    }
}

//! The uniform in-memory object value.

use crate::error::{ObjectError, ObjectResult};
use crate::types::{AttributeDefault, ObjectClass, ObjectType, IDENT_SEPARATOR};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp layout used for every date attribute.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns the current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// The identity of an object: one rendered value per ident attribute.
///
/// Two objects of the same class with equal idents denote the same record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(Vec<String>);

impl Ident {
    /// Returns the rendered ident values.
    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.0 {
            if !first {
                write!(f, "{IDENT_SEPARATOR}")?;
            }
            f.write_str(value)?;
            first = false;
        }
        Ok(())
    }
}

fn render_ident_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A typed object: a concrete [`ObjectType`] plus its attribute values.
///
/// Attributes are kept in a sorted map; an absent attribute and an explicit
/// null are treated alike by comparisons.
#[derive(Debug, Clone)]
pub struct Object {
    object_type: ObjectType,
    attributes: BTreeMap<String, Value>,
}

impl Object {
    /// Creates an object from its ident values, in ident attribute order.
    pub fn new(object_type: ObjectType, ident_values: &[&str]) -> ObjectResult<Self> {
        let names = object_type.class().ident_attributes();
        if names.len() != ident_values.len() {
            return Err(ObjectError::bad_ident(
                ident_values.join(";"),
                object_type.class().name(),
            ));
        }
        let attributes = names
            .iter()
            .zip(ident_values)
            .map(|(name, value)| ((*name).to_string(), Value::String((*value).to_string())))
            .collect();
        Ok(Self {
            object_type,
            attributes,
        })
    }

    /// Creates an object from a rendered ident string.
    pub fn from_ident(object_type: ObjectType, ident: &str) -> ObjectResult<Self> {
        let pairs = object_type.class().parse_ident(ident)?;
        let attributes = pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value)))
            .collect();
        Ok(Self {
            object_type,
            attributes,
        })
    }

    fn build(object_type: ObjectType, pairs: &[(&str, &str)]) -> Self {
        Self {
            object_type,
            attributes: pairs
                .iter()
                .map(|(name, value)| ((*name).to_string(), Value::String((*value).to_string())))
                .collect(),
        }
    }

    /// Returns the concrete type.
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Returns the class the object is stored under.
    pub fn class(&self) -> ObjectClass {
        self.object_type.class()
    }

    /// Returns true if the object's type is `type_name` or a subtype of it.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.object_type.is_a(type_name)
    }

    /// Returns an attribute value. Absent and null both yield `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.attributes.get(name) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    /// Returns a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns the `id` attribute of entities that have one.
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// Iterates over all stored attributes, nulls included.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets an attribute. Names the type cannot hold are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        if self.object_type.schema().accepts(name) {
            self.attributes.insert(name.to_string(), value.into());
        } else {
            tracing::warn!(
                object_type = %self.object_type,
                attribute = name,
                "ignoring unknown attribute"
            );
        }
        self
    }

    /// Builder form of [`Object::set`].
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Removes an attribute.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Returns the names of the ident attributes, extras of open types
    /// included (sorted by name after the class's own).
    pub fn ident_attributes(&self) -> Vec<&str> {
        let schema = self.object_type.schema();
        let mut names: Vec<&str> = schema.class.ident_attributes().to_vec();
        if schema.open {
            names.extend(
                self.attributes
                    .keys()
                    .map(String::as_str)
                    .filter(|name| !schema.declares(name)),
            );
        }
        names
    }

    /// Returns the ident attributes with their values.
    pub fn ident_pairs(&self) -> Vec<(String, Value)> {
        self.ident_attributes()
            .into_iter()
            .map(|name| {
                let value = self.attributes.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Returns the identity of this object.
    pub fn ident(&self) -> Ident {
        Ident(
            self.ident_attributes()
                .into_iter()
                .map(|name| {
                    self.attributes
                        .get(name)
                        .map(render_ident_value)
                        .unwrap_or_default()
                })
                .collect(),
        )
    }

    /// Fills every unset (or null) optional attribute with its default.
    ///
    /// Calling this twice leaves the object unchanged the second time.
    pub fn set_defaults(&mut self) {
        let mut now: Option<String> = None;
        for (name, default) in self.object_type.schema().attributes {
            let unset = matches!(self.attributes.get(*name), None | Some(Value::Null));
            if !unset {
                continue;
            }
            let value = match default {
                AttributeDefault::Null => continue,
                AttributeDefault::Text(text) => Value::String((*text).to_string()),
                AttributeDefault::Bool(flag) => Value::Bool(*flag),
                AttributeDefault::Int(number) => Value::from(*number),
                AttributeDefault::EmptyList => Value::Array(Vec::new()),
                AttributeDefault::Now => Value::String(now.get_or_insert_with(timestamp).clone()),
            };
            self.attributes.insert((*name).to_string(), value);
        }
    }

    /// Returns a copy carrying only the ident attributes.
    #[must_use]
    pub fn clone_ident_only(&self) -> Self {
        let attributes = self
            .ident_pairs()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();
        Self {
            object_type: self.object_type,
            attributes,
        }
    }

    /// Reclassifies the object as another type of the same class, keeping
    /// every attribute the new type can hold.
    pub fn with_type(&self, object_type: ObjectType) -> ObjectResult<Self> {
        if object_type.class() != self.class() {
            return Err(ObjectError::ClassMismatch {
                from: self.object_type.name().to_string(),
                to: object_type.name().to_string(),
            });
        }
        let schema = object_type.schema();
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| schema.accepts(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(Self {
            object_type,
            attributes,
        })
    }

    /// Converts to the hash form: every declared attribute (null when
    /// unset), extra attributes of open types, and the `type` tag.
    pub fn to_hash(&self) -> Map<String, Value> {
        let schema = self.object_type.schema();
        let mut hash = Map::new();
        for name in schema.class.ident_attributes() {
            hash.insert((*name).to_string(), Value::Null);
        }
        for (name, _) in schema.attributes {
            hash.insert((*name).to_string(), Value::Null);
        }
        for (name, value) in &self.attributes {
            hash.insert(name.clone(), value.clone());
        }
        hash.insert(
            "type".to_string(),
            Value::String(self.object_type.name().to_string()),
        );
        hash
    }

    /// Like [`Object::to_hash`], with the rendered `ident` added.
    pub fn serialize_hash(&self) -> Map<String, Value> {
        let mut hash = self.to_hash();
        hash.insert("ident".to_string(), Value::String(self.ident().to_string()));
        hash
    }

    /// Rebuilds an object from its hash form.
    ///
    /// The `type` tag selects the concrete type. Every class ident
    /// attribute must be present and non-null. Keys the type cannot hold
    /// are dropped.
    pub fn from_hash(hash: &Map<String, Value>) -> ObjectResult<Self> {
        let type_name = hash
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ObjectError::MissingType)?;
        let object_type = ObjectType::from_name(type_name)?;
        let schema = object_type.schema();

        for name in schema.class.ident_attributes() {
            if matches!(hash.get(*name), None | Some(Value::Null)) {
                return Err(ObjectError::missing_attribute(type_name, *name));
            }
        }

        let attributes = hash
            .iter()
            .filter(|(name, _)| name.as_str() != "type" && name.as_str() != "ident")
            .filter(|(name, _)| schema.accepts(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(Self {
            object_type,
            attributes,
        })
    }

    /// Rebuilds an object from a JSON value holding a hash.
    pub fn from_value(value: &Value) -> ObjectResult<Self> {
        match value {
            Value::Object(hash) => Self::from_hash(hash),
            _ => Err(ObjectError::MissingType),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        !objects_differ(self, other, &[])
    }
}

impl Eq for Object {}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} '{}'>", self.object_type, self.ident())
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hash().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hash = Map::<String, Value>::deserialize(deserializer)?;
        Object::from_hash(&hash).map_err(serde::de::Error::custom)
    }
}

fn normalized(value: Option<&Value>) -> Value {
    match value {
        None => Value::Null,
        Some(Value::Array(items)) => {
            let mut items = items.clone();
            items.sort_by_key(|item| item.to_string());
            Value::Array(items)
        }
        Some(other) => other.clone(),
    }
}

/// Returns true if the two objects differ in type or in any attribute not
/// listed in `exclude`. Absent and null count as equal; lists compare
/// without regard to order.
pub fn objects_differ(a: &Object, b: &Object, exclude: &[&str]) -> bool {
    if a.object_type != b.object_type {
        return true;
    }
    a.attributes
        .keys()
        .chain(b.attributes.keys())
        .filter(|name| !exclude.contains(&name.as_str()))
        .any(|name| normalized(a.get(name)) != normalized(b.get(name)))
}

/// Convenience constructors for the types used most.
impl Object {
    /// A managed client.
    pub fn opsi_client(id: &str) -> Self {
        Self::build(ObjectType::OpsiClient, &[("id", id)])
    }

    /// A depot server.
    pub fn opsi_depotserver(id: &str) -> Self {
        Self::build(ObjectType::OpsiDepotserver, &[("id", id)])
    }

    /// The config server.
    pub fn opsi_configserver(id: &str) -> Self {
        Self::build(ObjectType::OpsiConfigserver, &[("id", id)])
    }

    /// A free-text configuration.
    pub fn unicode_config(id: &str) -> Self {
        Self::build(ObjectType::UnicodeConfig, &[("id", id)])
    }

    /// A localboot product.
    pub fn localboot_product(id: &str, product_version: &str, package_version: &str) -> Self {
        Self::build(
            ObjectType::LocalbootProduct,
            &[
                ("id", id),
                ("productVersion", product_version),
                ("packageVersion", package_version),
            ],
        )
    }

    /// A free-text product property.
    pub fn unicode_product_property(
        product_id: &str,
        product_version: &str,
        package_version: &str,
        property_id: &str,
    ) -> Self {
        Self::build(
            ObjectType::UnicodeProductProperty,
            &[
                ("productId", product_id),
                ("productVersion", product_version),
                ("packageVersion", package_version),
                ("propertyId", property_id),
            ],
        )
    }

    /// A product available on a depot.
    pub fn product_on_depot(
        product_id: &str,
        product_type: &str,
        product_version: &str,
        package_version: &str,
        depot_id: &str,
    ) -> Self {
        Self::build(
            ObjectType::ProductOnDepot,
            &[
                ("productId", product_id),
                ("productType", product_type),
                ("productVersion", product_version),
                ("packageVersion", package_version),
                ("depotId", depot_id),
            ],
        )
    }

    /// Product state of a client.
    pub fn product_on_client(product_id: &str, product_type: &str, client_id: &str) -> Self {
        Self::build(
            ObjectType::ProductOnClient,
            &[
                ("productId", product_id),
                ("productType", product_type),
                ("clientId", client_id),
            ],
        )
    }

    /// Product property values of an object.
    pub fn product_property_state(product_id: &str, property_id: &str, object_id: &str) -> Self {
        Self::build(
            ObjectType::ProductPropertyState,
            &[
                ("productId", product_id),
                ("propertyId", property_id),
                ("objectId", object_id),
            ],
        )
    }

    /// Config values of an object.
    pub fn config_state(config_id: &str, object_id: &str) -> Self {
        Self::build(
            ObjectType::ConfigState,
            &[("configId", config_id), ("objectId", object_id)],
        )
    }

    /// A host group.
    pub fn host_group(id: &str) -> Self {
        Self::build(ObjectType::HostGroup, &[("id", id)])
    }

    /// A group membership.
    pub fn object_to_group(group_type: &str, group_id: &str, object_id: &str) -> Self {
        Self::build(
            ObjectType::ObjectToGroup,
            &[
                ("groupType", group_type),
                ("groupId", group_id),
                ("objectId", object_id),
            ],
        )
    }

    /// A license contract.
    pub fn license_contract(id: &str) -> Self {
        Self::build(ObjectType::LicenseContract, &[("id", id)])
    }

    /// A retail software license.
    pub fn retail_software_license(id: &str, license_contract_id: &str) -> Self {
        Self::build(
            ObjectType::RetailSoftwareLicense,
            &[("id", id), ("licenseContractId", license_contract_id)],
        )
    }

    /// A license pool.
    pub fn license_pool(id: &str) -> Self {
        Self::build(ObjectType::LicensePool, &[("id", id)])
    }

    /// Pool membership of a software license.
    pub fn software_license_to_license_pool(software_license_id: &str, license_pool_id: &str) -> Self {
        Self::build(
            ObjectType::SoftwareLicenseToLicensePool,
            &[
                ("softwareLicenseId", software_license_id),
                ("licensePoolId", license_pool_id),
            ],
        )
    }

    /// A license reservation of a client.
    pub fn license_on_client(software_license_id: &str, license_pool_id: &str, client_id: &str) -> Self {
        Self::build(
            ObjectType::LicenseOnClient,
            &[
                ("softwareLicenseId", software_license_id),
                ("licensePoolId", license_pool_id),
                ("clientId", client_id),
            ],
        )
    }

    /// A software inventory item.
    pub fn audit_software(software_id: &str, display_name: &str, display_version: &str) -> Self {
        Self::build(
            ObjectType::AuditSoftware,
            &[
                ("softwareId", software_id),
                ("displayName", display_name),
                ("displayVersion", display_version),
            ],
        )
    }

    /// A software inventory item seen on a client.
    pub fn audit_software_on_client(
        software_id: &str,
        display_name: &str,
        display_version: &str,
        client_id: &str,
    ) -> Self {
        Self::build(
            ObjectType::AuditSoftwareOnClient,
            &[
                ("softwareId", software_id),
                ("displayName", display_name),
                ("displayVersion", display_version),
                ("clientId", client_id),
            ],
        )
    }

    /// A hardware inventory item seen on a host. Device attributes are
    /// added with [`Object::with`] and become part of the ident.
    pub fn audit_hardware_on_host(host_id: &str, hardware_class: &str) -> Self {
        Self::build(
            ObjectType::AuditHardwareOnHost,
            &[("hostId", host_id), ("hardwareClass", hardware_class)],
        )
    }
}

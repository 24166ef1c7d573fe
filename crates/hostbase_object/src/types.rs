//! Closed registry of object classes and concrete object types.
//!
//! Every object belongs to exactly one [`ObjectClass`] (the backend method
//! family it is stored under) and has exactly one concrete [`ObjectType`].
//! Type tags found in serialized hashes are resolved through
//! [`ObjectType::from_name`]; unknown tags are rejected instead of being
//! evaluated.

use crate::error::{ObjectError, ObjectResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when rendering an ident tuple as a string.
pub const IDENT_SEPARATOR: char = ';';

/// Whether a class has a standalone identity or links other objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Self-identifying object (Host, Product, Config, ...).
    Entity,
    /// Object identified by the combination of its references.
    Relationship,
}

/// The backend method family an object is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    /// Hosts: clients, depots, config servers.
    Host,
    /// Configuration definitions.
    Config,
    /// Per-object config values.
    ConfigState,
    /// Products.
    Product,
    /// Product properties.
    ProductProperty,
    /// Product dependencies.
    ProductDependency,
    /// Products installed on a depot.
    ProductOnDepot,
    /// Per-client product installation and action state.
    ProductOnClient,
    /// Per-object product property values.
    ProductPropertyState,
    /// Host and product groups.
    Group,
    /// Group memberships.
    ObjectToGroup,
    /// License contracts.
    LicenseContract,
    /// Software licenses.
    SoftwareLicense,
    /// License pools.
    LicensePool,
    /// Pool membership of software licenses.
    SoftwareLicenseToLicensePool,
    /// License reservations of clients.
    LicenseOnClient,
    /// Software inventory catalogue.
    AuditSoftware,
    /// Software inventory per client.
    AuditSoftwareOnClient,
    /// Hardware inventory catalogue.
    AuditHardware,
    /// Hardware inventory per host.
    AuditHardwareOnHost,
}

impl ObjectClass {
    /// All classes, in declaration order.
    pub const ALL: [ObjectClass; 20] = [
        ObjectClass::Host,
        ObjectClass::Config,
        ObjectClass::ConfigState,
        ObjectClass::Product,
        ObjectClass::ProductProperty,
        ObjectClass::ProductDependency,
        ObjectClass::ProductOnDepot,
        ObjectClass::ProductOnClient,
        ObjectClass::ProductPropertyState,
        ObjectClass::Group,
        ObjectClass::ObjectToGroup,
        ObjectClass::LicenseContract,
        ObjectClass::SoftwareLicense,
        ObjectClass::LicensePool,
        ObjectClass::SoftwareLicenseToLicensePool,
        ObjectClass::LicenseOnClient,
        ObjectClass::AuditSoftware,
        ObjectClass::AuditSoftwareOnClient,
        ObjectClass::AuditHardware,
        ObjectClass::AuditHardwareOnHost,
    ];

    /// Returns the class name (`"ProductOnClient"`).
    pub fn name(&self) -> &'static str {
        match self {
            ObjectClass::Host => "Host",
            ObjectClass::Config => "Config",
            ObjectClass::ConfigState => "ConfigState",
            ObjectClass::Product => "Product",
            ObjectClass::ProductProperty => "ProductProperty",
            ObjectClass::ProductDependency => "ProductDependency",
            ObjectClass::ProductOnDepot => "ProductOnDepot",
            ObjectClass::ProductOnClient => "ProductOnClient",
            ObjectClass::ProductPropertyState => "ProductPropertyState",
            ObjectClass::Group => "Group",
            ObjectClass::ObjectToGroup => "ObjectToGroup",
            ObjectClass::LicenseContract => "LicenseContract",
            ObjectClass::SoftwareLicense => "SoftwareLicense",
            ObjectClass::LicensePool => "LicensePool",
            ObjectClass::SoftwareLicenseToLicensePool => "SoftwareLicenseToLicensePool",
            ObjectClass::LicenseOnClient => "LicenseOnClient",
            ObjectClass::AuditSoftware => "AuditSoftware",
            ObjectClass::AuditSoftwareOnClient => "AuditSoftwareOnClient",
            ObjectClass::AuditHardware => "AuditHardware",
            ObjectClass::AuditHardwareOnHost => "AuditHardwareOnHost",
        }
    }

    /// Resolves a class name.
    pub fn from_name(name: &str) -> ObjectResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.name() == name)
            .ok_or_else(|| ObjectError::UnknownClass {
                class_name: name.to_string(),
            })
    }

    /// Returns the backend method prefix (`"productOnClient"`).
    pub fn method_prefix(&self) -> &'static str {
        match self {
            ObjectClass::Host => "host",
            ObjectClass::Config => "config",
            ObjectClass::ConfigState => "configState",
            ObjectClass::Product => "product",
            ObjectClass::ProductProperty => "productProperty",
            ObjectClass::ProductDependency => "productDependency",
            ObjectClass::ProductOnDepot => "productOnDepot",
            ObjectClass::ProductOnClient => "productOnClient",
            ObjectClass::ProductPropertyState => "productPropertyState",
            ObjectClass::Group => "group",
            ObjectClass::ObjectToGroup => "objectToGroup",
            ObjectClass::LicenseContract => "licenseContract",
            ObjectClass::SoftwareLicense => "softwareLicense",
            ObjectClass::LicensePool => "licensePool",
            ObjectClass::SoftwareLicenseToLicensePool => "softwareLicenseToLicensePool",
            ObjectClass::LicenseOnClient => "licenseOnClient",
            ObjectClass::AuditSoftware => "auditSoftware",
            ObjectClass::AuditSoftwareOnClient => "auditSoftwareOnClient",
            ObjectClass::AuditHardware => "auditHardware",
            ObjectClass::AuditHardwareOnHost => "auditHardwareOnHost",
        }
    }

    /// Resolves a backend method prefix.
    pub fn from_method_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.method_prefix() == prefix)
    }

    /// Returns whether this class is an entity or a relationship.
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectClass::Host
            | ObjectClass::Config
            | ObjectClass::Product
            | ObjectClass::ProductProperty
            | ObjectClass::Group
            | ObjectClass::LicenseContract
            | ObjectClass::SoftwareLicense
            | ObjectClass::LicensePool
            | ObjectClass::AuditSoftware
            | ObjectClass::AuditHardware => ObjectKind::Entity,
            _ => ObjectKind::Relationship,
        }
    }

    /// Returns the ordered ident attributes shared by every type of the class.
    ///
    /// Audit hardware classes additionally use every extra attribute they
    /// carry (see [`crate::Object::ident`]).
    pub fn ident_attributes(&self) -> &'static [&'static str] {
        match self {
            ObjectClass::Host
            | ObjectClass::Config
            | ObjectClass::Group
            | ObjectClass::LicenseContract
            | ObjectClass::LicensePool => &["id"],
            ObjectClass::ConfigState => &["configId", "objectId"],
            ObjectClass::Product => &["id", "productVersion", "packageVersion"],
            ObjectClass::ProductProperty => {
                &["productId", "productVersion", "packageVersion", "propertyId"]
            }
            ObjectClass::ProductDependency => &[
                "productId",
                "productVersion",
                "packageVersion",
                "productAction",
                "requiredProductId",
            ],
            ObjectClass::ProductOnDepot => &[
                "productId",
                "productType",
                "productVersion",
                "packageVersion",
                "depotId",
            ],
            ObjectClass::ProductOnClient => &["productId", "productType", "clientId"],
            ObjectClass::ProductPropertyState => &["productId", "propertyId", "objectId"],
            ObjectClass::ObjectToGroup => &["groupType", "groupId", "objectId"],
            ObjectClass::SoftwareLicense => &["id", "licenseContractId"],
            ObjectClass::SoftwareLicenseToLicensePool => &["softwareLicenseId", "licensePoolId"],
            ObjectClass::LicenseOnClient => &["softwareLicenseId", "licensePoolId", "clientId"],
            ObjectClass::AuditSoftware => &["softwareId", "displayName", "displayVersion"],
            ObjectClass::AuditSoftwareOnClient => {
                &["softwareId", "displayName", "displayVersion", "clientId"]
            }
            ObjectClass::AuditHardware => &["hardwareClass"],
            ObjectClass::AuditHardwareOnHost => &["hostId", "hardwareClass"],
        }
    }

    /// Returns true for the inventory classes skipped by `audit = false`.
    pub fn is_audit(&self) -> bool {
        matches!(
            self,
            ObjectClass::AuditSoftware
                | ObjectClass::AuditSoftwareOnClient
                | ObjectClass::AuditHardware
                | ObjectClass::AuditHardwareOnHost
        )
    }

    /// Returns true for the license management classes.
    pub fn is_license(&self) -> bool {
        matches!(
            self,
            ObjectClass::LicenseContract
                | ObjectClass::SoftwareLicense
                | ObjectClass::LicensePool
                | ObjectClass::SoftwareLicenseToLicensePool
                | ObjectClass::LicenseOnClient
        )
    }

    /// Parses an ident string into `(attribute, value)` pairs.
    ///
    /// Fails when the ident has fewer values than the class has ident
    /// attributes.
    pub fn parse_ident(&self, ident: &str) -> ObjectResult<Vec<(&'static str, String)>> {
        let attributes = self.ident_attributes();
        let values: Vec<&str> = ident.split(IDENT_SEPARATOR).collect();
        if values.len() < attributes.len() {
            return Err(ObjectError::bad_ident(ident, self.name()));
        }
        Ok(attributes
            .iter()
            .zip(values)
            .map(|(attribute, value)| (*attribute, value.to_string()))
            .collect())
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default applied by [`crate::Object::set_defaults`] to an unset attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeDefault {
    /// Stays null.
    Null,
    /// A fixed string.
    Text(&'static str),
    /// A fixed boolean.
    Bool(bool),
    /// A fixed integer.
    Int(i64),
    /// An empty list.
    EmptyList,
    /// The current local time, `YYYY-MM-DD HH:MM:SS`.
    Now,
}

/// Static description of a concrete object type.
#[derive(Debug)]
pub struct Schema {
    /// The concrete type.
    pub object_type: ObjectType,
    /// The class it is stored under.
    pub class: ObjectClass,
    /// Intermediate supertype names, most specific first (`OpsiDepotserver`
    /// for a config server). The class name is implied.
    pub supertypes: &'static [&'static str],
    /// Non-ident attributes and their defaults.
    pub attributes: &'static [(&'static str, AttributeDefault)],
    /// Whether attributes outside the declared set are kept.
    pub open: bool,
}

impl Schema {
    /// Returns true if `name` is a declared attribute (ident or not).
    pub fn declares(&self, name: &str) -> bool {
        self.class.ident_attributes().contains(&name)
            || self.attributes.iter().any(|(attr, _)| *attr == name)
    }

    /// Returns true if the schema can hold `name`.
    pub fn accepts(&self, name: &str) -> bool {
        self.open || self.declares(name)
    }
}

/// A concrete object type.
#[allow(clippy::enum_variant_names)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// Managed endpoint.
    OpsiClient,
    /// Distribution point.
    OpsiDepotserver,
    /// Authoritative master server (a depot server too).
    OpsiConfigserver,
    /// Free-text configuration.
    UnicodeConfig,
    /// Boolean configuration.
    BoolConfig,
    /// Config value of an object.
    ConfigState,
    /// Product installed by the client agent.
    LocalbootProduct,
    /// Product installed via network boot.
    NetbootProduct,
    /// Free-text product property.
    UnicodeProductProperty,
    /// Boolean product property.
    BoolProductProperty,
    /// Product dependency.
    ProductDependency,
    /// Product available on a depot.
    ProductOnDepot,
    /// Product state of a client.
    ProductOnClient,
    /// Product property value of an object.
    ProductPropertyState,
    /// Group of hosts.
    HostGroup,
    /// Group of products.
    ProductGroup,
    /// Group membership.
    ObjectToGroup,
    /// License contract.
    LicenseContract,
    /// Retail license.
    RetailSoftwareLicense,
    /// OEM license, always bound to one host.
    OEMSoftwareLicense,
    /// Volume license.
    VolumeSoftwareLicense,
    /// Concurrent-use license.
    ConcurrentSoftwareLicense,
    /// License pool.
    LicensePool,
    /// License pool membership.
    SoftwareLicenseToLicensePool,
    /// License reservation of a client.
    LicenseOnClient,
    /// Software inventory item.
    AuditSoftware,
    /// Software inventory item seen on a client.
    AuditSoftwareOnClient,
    /// Hardware inventory item.
    AuditHardware,
    /// Hardware inventory item seen on a host.
    AuditHardwareOnHost,
}

use AttributeDefault::{Bool, EmptyList, Int, Now, Null, Text};

const CLIENT_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("opsiHostKey", Null),
    ("description", Text("")),
    ("notes", Text("")),
    ("hardwareAddress", Null),
    ("ipAddress", Null),
    ("inventoryNumber", Text("")),
    ("created", Now),
    ("lastSeen", Now),
];

const DEPOT_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("opsiHostKey", Null),
    ("depotLocalUrl", Null),
    ("depotRemoteUrl", Null),
    ("repositoryLocalUrl", Null),
    ("repositoryRemoteUrl", Null),
    ("description", Text("")),
    ("notes", Text("")),
    ("hardwareAddress", Null),
    ("ipAddress", Null),
    ("inventoryNumber", Text("")),
    ("networkAddress", Null),
    ("maxBandwidth", Int(0)),
    ("isMasterDepot", Bool(true)),
];

const CONFIG_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("description", Text("")),
    ("possibleValues", EmptyList),
    ("defaultValues", EmptyList),
    ("editable", Bool(true)),
    ("multiValue", Bool(false)),
];

const PRODUCT_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("name", Text("")),
    ("licenseRequired", Bool(false)),
    ("setupScript", Text("")),
    ("uninstallScript", Text("")),
    ("updateScript", Text("")),
    ("alwaysScript", Text("")),
    ("onceScript", Text("")),
    ("customScript", Text("")),
    ("priority", Int(0)),
    ("description", Text("")),
    ("advice", Text("")),
    ("changelog", Text("")),
    ("productClassIds", EmptyList),
    ("windowsSoftwareIds", EmptyList),
];

const NETBOOT_PRODUCT_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("name", Text("")),
    ("licenseRequired", Bool(false)),
    ("setupScript", Text("")),
    ("uninstallScript", Text("")),
    ("updateScript", Text("")),
    ("alwaysScript", Text("")),
    ("onceScript", Text("")),
    ("customScript", Text("")),
    ("priority", Int(0)),
    ("description", Text("")),
    ("advice", Text("")),
    ("changelog", Text("")),
    ("productClassIds", EmptyList),
    ("windowsSoftwareIds", EmptyList),
    ("pxeConfigTemplate", Text("")),
];

const GROUP_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("description", Text("")),
    ("notes", Text("")),
    ("parentGroupId", Null),
];

const SOFTWARE_LICENSE_ATTRIBUTES: &[(&str, AttributeDefault)] = &[
    ("maxInstallations", Int(1)),
    ("boundToHost", Null),
    ("expirationDate", Null),
];

const SEEN_ATTRIBUTES: &[(&str, AttributeDefault)] =
    &[("firstseen", Now), ("lastseen", Now), ("state", Int(1))];

static SCHEMAS: [Schema; 29] = [
    Schema {
        object_type: ObjectType::OpsiClient,
        class: ObjectClass::Host,
        supertypes: &[],
        attributes: CLIENT_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::OpsiDepotserver,
        class: ObjectClass::Host,
        supertypes: &[],
        attributes: DEPOT_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::OpsiConfigserver,
        class: ObjectClass::Host,
        supertypes: &["OpsiDepotserver"],
        attributes: DEPOT_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::UnicodeConfig,
        class: ObjectClass::Config,
        supertypes: &[],
        attributes: CONFIG_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::BoolConfig,
        class: ObjectClass::Config,
        supertypes: &[],
        attributes: &[("description", Text("")), ("defaultValues", EmptyList)],
        open: false,
    },
    Schema {
        object_type: ObjectType::ConfigState,
        class: ObjectClass::ConfigState,
        supertypes: &[],
        attributes: &[("values", EmptyList)],
        open: false,
    },
    Schema {
        object_type: ObjectType::LocalbootProduct,
        class: ObjectClass::Product,
        supertypes: &[],
        attributes: PRODUCT_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::NetbootProduct,
        class: ObjectClass::Product,
        supertypes: &[],
        attributes: NETBOOT_PRODUCT_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::UnicodeProductProperty,
        class: ObjectClass::ProductProperty,
        supertypes: &[],
        attributes: CONFIG_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::BoolProductProperty,
        class: ObjectClass::ProductProperty,
        supertypes: &[],
        attributes: &[("description", Text("")), ("defaultValues", EmptyList)],
        open: false,
    },
    Schema {
        object_type: ObjectType::ProductDependency,
        class: ObjectClass::ProductDependency,
        supertypes: &[],
        attributes: &[
            ("requiredProductVersion", Null),
            ("requiredPackageVersion", Null),
            ("requiredAction", Null),
            ("requiredInstallationStatus", Null),
            ("requirementType", Null),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::ProductOnDepot,
        class: ObjectClass::ProductOnDepot,
        supertypes: &[],
        attributes: &[("locked", Bool(false))],
        open: false,
    },
    Schema {
        object_type: ObjectType::ProductOnClient,
        class: ObjectClass::ProductOnClient,
        supertypes: &[],
        attributes: &[
            ("installationStatus", Text("not_installed")),
            ("actionRequest", Text("none")),
            ("actionProgress", Text("")),
            ("actionResult", Text("none")),
            ("productVersion", Null),
            ("packageVersion", Null),
            ("lastStateChange", Now),
            ("modificationTime", Now),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::ProductPropertyState,
        class: ObjectClass::ProductPropertyState,
        supertypes: &[],
        attributes: &[("values", EmptyList)],
        open: false,
    },
    Schema {
        object_type: ObjectType::HostGroup,
        class: ObjectClass::Group,
        supertypes: &[],
        attributes: GROUP_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::ProductGroup,
        class: ObjectClass::Group,
        supertypes: &[],
        attributes: GROUP_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::ObjectToGroup,
        class: ObjectClass::ObjectToGroup,
        supertypes: &[],
        attributes: &[],
        open: false,
    },
    Schema {
        object_type: ObjectType::LicenseContract,
        class: ObjectClass::LicenseContract,
        supertypes: &[],
        attributes: &[
            ("description", Text("")),
            ("notes", Text("")),
            ("partner", Text("")),
            ("conclusionDate", Now),
            ("notificationDate", Null),
            ("expirationDate", Null),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::RetailSoftwareLicense,
        class: ObjectClass::SoftwareLicense,
        supertypes: &[],
        attributes: SOFTWARE_LICENSE_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::OEMSoftwareLicense,
        class: ObjectClass::SoftwareLicense,
        supertypes: &[],
        attributes: SOFTWARE_LICENSE_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::VolumeSoftwareLicense,
        class: ObjectClass::SoftwareLicense,
        supertypes: &[],
        attributes: SOFTWARE_LICENSE_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::ConcurrentSoftwareLicense,
        class: ObjectClass::SoftwareLicense,
        supertypes: &[],
        attributes: SOFTWARE_LICENSE_ATTRIBUTES,
        open: false,
    },
    Schema {
        object_type: ObjectType::LicensePool,
        class: ObjectClass::LicensePool,
        supertypes: &[],
        attributes: &[
            ("description", Text("")),
            ("productIds", EmptyList),
            ("windowsSoftwareIds", EmptyList),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::SoftwareLicenseToLicensePool,
        class: ObjectClass::SoftwareLicenseToLicensePool,
        supertypes: &[],
        attributes: &[("licenseKey", Text(""))],
        open: false,
    },
    Schema {
        object_type: ObjectType::LicenseOnClient,
        class: ObjectClass::LicenseOnClient,
        supertypes: &[],
        attributes: &[("licenseKey", Text("")), ("notes", Text(""))],
        open: false,
    },
    Schema {
        object_type: ObjectType::AuditSoftware,
        class: ObjectClass::AuditSoftware,
        supertypes: &[],
        attributes: &[
            ("uninstallString", Text("")),
            ("binaryName", Text("")),
            ("installSize", Int(-1)),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::AuditSoftwareOnClient,
        class: ObjectClass::AuditSoftwareOnClient,
        supertypes: &[],
        attributes: &[
            ("firstseen", Now),
            ("lastseen", Now),
            ("state", Int(1)),
            ("usageFrequency", Int(-1)),
            ("lastUsed", Null),
        ],
        open: false,
    },
    Schema {
        object_type: ObjectType::AuditHardware,
        class: ObjectClass::AuditHardware,
        supertypes: &[],
        attributes: &[],
        open: true,
    },
    Schema {
        object_type: ObjectType::AuditHardwareOnHost,
        class: ObjectClass::AuditHardwareOnHost,
        supertypes: &[],
        attributes: SEEN_ATTRIBUTES,
        open: true,
    },
];

impl ObjectType {
    /// All concrete types, in registry order.
    pub fn all() -> impl Iterator<Item = ObjectType> {
        SCHEMAS.iter().map(|schema| schema.object_type)
    }

    /// Returns the static schema of this type.
    pub fn schema(&self) -> &'static Schema {
        // The registry is ordered exactly like the enum declaration.
        &SCHEMAS[*self as usize]
    }

    /// Returns the class this type is stored under.
    pub fn class(&self) -> ObjectClass {
        self.schema().class
    }

    /// Returns the type tag (`"OpsiClient"`).
    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::OpsiClient => "OpsiClient",
            ObjectType::OpsiDepotserver => "OpsiDepotserver",
            ObjectType::OpsiConfigserver => "OpsiConfigserver",
            ObjectType::UnicodeConfig => "UnicodeConfig",
            ObjectType::BoolConfig => "BoolConfig",
            ObjectType::ConfigState => "ConfigState",
            ObjectType::LocalbootProduct => "LocalbootProduct",
            ObjectType::NetbootProduct => "NetbootProduct",
            ObjectType::UnicodeProductProperty => "UnicodeProductProperty",
            ObjectType::BoolProductProperty => "BoolProductProperty",
            ObjectType::ProductDependency => "ProductDependency",
            ObjectType::ProductOnDepot => "ProductOnDepot",
            ObjectType::ProductOnClient => "ProductOnClient",
            ObjectType::ProductPropertyState => "ProductPropertyState",
            ObjectType::HostGroup => "HostGroup",
            ObjectType::ProductGroup => "ProductGroup",
            ObjectType::ObjectToGroup => "ObjectToGroup",
            ObjectType::LicenseContract => "LicenseContract",
            ObjectType::RetailSoftwareLicense => "RetailSoftwareLicense",
            ObjectType::OEMSoftwareLicense => "OEMSoftwareLicense",
            ObjectType::VolumeSoftwareLicense => "VolumeSoftwareLicense",
            ObjectType::ConcurrentSoftwareLicense => "ConcurrentSoftwareLicense",
            ObjectType::LicensePool => "LicensePool",
            ObjectType::SoftwareLicenseToLicensePool => "SoftwareLicenseToLicensePool",
            ObjectType::LicenseOnClient => "LicenseOnClient",
            ObjectType::AuditSoftware => "AuditSoftware",
            ObjectType::AuditSoftwareOnClient => "AuditSoftwareOnClient",
            ObjectType::AuditHardware => "AuditHardware",
            ObjectType::AuditHardwareOnHost => "AuditHardwareOnHost",
        }
    }

    /// Resolves a type tag. Unknown tags are an explicit error.
    pub fn from_name(name: &str) -> ObjectResult<Self> {
        Self::all()
            .find(|object_type| object_type.name() == name)
            .ok_or_else(|| ObjectError::unknown_type(name))
    }

    /// Returns true if this type is `type_name` or one of its supertypes,
    /// the class name included (`OpsiConfigserver` is an `OpsiDepotserver`
    /// and a `Host`).
    pub fn is_a(&self, type_name: &str) -> bool {
        self.name() == type_name
            || self.class().name() == type_name
            || self.schema().supertypes.contains(&type_name)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_enum_order() {
        for object_type in ObjectType::all() {
            assert_eq!(object_type.schema().object_type, object_type);
            assert_eq!(ObjectType::from_name(object_type.name()), Ok(object_type));
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            ObjectType::from_name("__import__('os')"),
            Err(ObjectError::unknown_type("__import__('os')"))
        );
        assert!(ObjectClass::from_name("Nope").is_err());
    }

    #[test]
    fn subtype_matching() {
        assert!(ObjectType::OpsiConfigserver.is_a("OpsiDepotserver"));
        assert!(ObjectType::OpsiConfigserver.is_a("Host"));
        assert!(!ObjectType::OpsiDepotserver.is_a("OpsiConfigserver"));
        assert!(!ObjectType::OpsiClient.is_a("OpsiDepotserver"));
        assert!(ObjectType::HostGroup.is_a("Group"));
    }

    #[test]
    fn method_prefix_roundtrip() {
        for class in ObjectClass::ALL {
            assert_eq!(ObjectClass::from_method_prefix(class.method_prefix()), Some(class));
        }
        assert_eq!(ObjectClass::ProductOnClient.kind(), ObjectKind::Relationship);
        assert_eq!(ObjectClass::Host.kind(), ObjectKind::Entity);
    }

    #[test]
    fn parse_ident() {
        let pairs = ObjectClass::ProductOnClient
            .parse_ident("firefox;LocalbootProduct;client1.example.org")
            .unwrap();
        assert_eq!(pairs[0], ("productId", "firefox".to_string()));
        assert_eq!(pairs[2], ("clientId", "client1.example.org".to_string()));

        let err = ObjectClass::ProductOnClient.parse_ident("firefox").unwrap_err();
        assert!(matches!(err, ObjectError::BadIdent { .. }));
    }
}

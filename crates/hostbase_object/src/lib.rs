//! # Hostbase Object
//!
//! The typed object model shared by every hostbase backend.
//!
//! Objects are split into closed classes ([`ObjectClass`]) and concrete
//! types ([`ObjectType`]). Each class has a fixed tuple of ident attributes
//! that identifies a record; two objects of one class with equal idents are
//! the same logical record.
//!
//! ## Usage
//!
//! ```
//! use hostbase_object::{Object, ObjectType};
//!
//! let mut poc = Object::product_on_client("firefox", "LocalbootProduct", "c1.example.org")
//!     .with("actionRequest", "setup");
//! poc.set_defaults();
//!
//! assert_eq!(poc.ident().to_string(), "firefox;LocalbootProduct;c1.example.org");
//! assert_eq!(poc.get_str("installationStatus"), Some("not_installed"));
//!
//! let back = Object::from_hash(&poc.to_hash()).unwrap();
//! assert_eq!(back.object_type(), ObjectType::ProductOnClient);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod object;
mod types;

pub use error::{ObjectError, ObjectResult};
pub use object::{objects_differ, timestamp, Ident, Object, TIMESTAMP_FORMAT};
pub use types::{AttributeDefault, ObjectClass, ObjectKind, ObjectType, Schema, IDENT_SEPARATOR};

/// Config id whose state assigns a client to its depot.
pub const DEPOT_ASSIGNMENT_CONFIG_ID: &str = "clientconfig.depot.id";

//! # Hostbase Backend
//!
//! The uniform object CRUD contract and its local implementations.
//!
//! Every store (local, file, remote service, cache, multiplexer) implements
//! [`Backend`]. Callers only ever talk to that trait: filtered reads,
//! create-or-replace inserts, must-exist updates, bulk creates and
//! idempotent deletes, keyed by object class and ident.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and local work/snapshot stores
//! - [`FileBackend`] - A JSON document on disk
//!
//! ## Example
//!
//! ```rust
//! use hostbase_backend::{Backend, Filter, InMemoryBackend};
//! use hostbase_object::{Object, ObjectClass};
//!
//! let backend = InMemoryBackend::new();
//! backend.insert_object(&Object::opsi_client("pc1.lab.example.org")).unwrap();
//! backend.insert_object(&Object::opsi_client("pc2.office.example.org")).unwrap();
//!
//! let lab = backend
//!     .host_get_idents(&Filter::new().with_value("id", "*.lab.example.org"))
//!     .unwrap();
//! assert_eq!(lab, vec!["pc1.lab.example.org".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod credentials;
mod error;
mod file;
mod filter;
mod info;
mod memory;
mod selection;

pub use backend::{depot_type_for, group_by_class, validate_ident, Backend};
pub use credentials::{Credentials, HostKeyCipher, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use filter::{Constraint, Filter};
pub use info::{BackendInfo, ModulesDescriptor};
pub use memory::InMemoryBackend;
pub use selection::IdSelection;

use std::sync::Arc;

/// A shared, thread-safe backend handle.
pub type SharedBackend = Arc<dyn Backend>;

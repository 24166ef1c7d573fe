//! # Hostbase Testkit
//!
//! Test utilities for hostbase.
//!
//! This crate provides:
//! - A sample dataset covering every object class
//! - Temporary file backends
//! - An instrumented backend that counts calls and injects faults
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use hostbase_backend::{Backend, Filter};
//! use hostbase_object::ObjectClass;
//! use hostbase_testkit::prelude::*;
//!
//! let master = sample_backend();
//! let clients = master
//!     .get_objects(ObjectClass::Host, &Filter::new().with_value("type", "OpsiClient"))
//!     .unwrap();
//! assert_eq!(clients.len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;

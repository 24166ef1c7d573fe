//! # Hostbase Multiplex
//!
//! One backend in front of several backend services, typically one per
//! depot.
//!
//! This crate provides:
//! - [`MultiplexBackend`]: routes every backend call to the services that
//!   hold the records it touches and merges their answers
//! - [`Service`] and [`ServiceCache`]: connected services and the ids they
//!   are known to hold
//! - [`LicenseGate`]: the signed module license that unlocks multiplexing
//! - [`BackendCall`]: the named call surface remote callers use
//!
//! ## Routing Model
//!
//! A call goes to every connected service that owns an id the call
//! mentions; if none does, it goes to all of them. Service calls run on a
//! worker pool under a timeout, and a failing service is logged and left
//! out of the merged result.
//!
//! ## Key Invariants
//!
//! - A new client lives in the multiplexer until its depot assignment
//!   arrives, then on exactly one service
//! - A moving client is deleted from its old service only after the new
//!   service shows it
//! - Moves run one at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod call;
mod config;
mod error;
mod license;
mod pool;
mod relocation;
mod service;

pub use backend::{MultiplexBackend, MultiplexBackendBuilder};
pub use call::{BackendCall, CallOutput};
pub use config::{MultiplexConfig, ServiceSpec, DEFAULT_SERVICE_PORT};
pub use error::{MultiplexError, MultiplexResult};
pub use license::{sign_descriptor, LicenseGate, MULTIPLEX_MODULE};
pub use pool::{Job, JobOutcome, WorkerPool};
pub use relocation::RelocationOutcome;
pub use service::{
    FileServiceFactory, Membership, Service, ServiceCache, ServiceFactory, ServiceRegistry,
};

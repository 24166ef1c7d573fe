//! # Hostbase Sync
//!
//! Moving records between backends.
//!
//! This crate provides:
//! - [`BackendReplicator`]: copies a selected slice of one backend's
//!   dataset into another, in dependency order
//! - [`ClientCacheBackend`]: one client's offline view of a master
//!   backend, with deferred reconciliation of local changes
//! - The reconciliation rules for product states changed on both sides
//!
//! ## Reconciliation Model
//!
//! The cache keeps three stores:
//! 1. **Work**: answers every call and takes every local write
//! 2. **Snapshot**: the work store as it was after the last sync
//! 3. **Master**: the authoritative remote store
//!
//! Comparing the snapshot with the master tells a stale local change from
//! a fresh one. The master wins whenever it changed a record the client
//! also touched, except for the installation outcome, which only the
//! client knows.
//!
//! ## Key Invariants
//!
//! - Classes are written in a fixed order; referenced before referencing
//! - A group is written after its parent
//! - One bad record never aborts a lenient replication or a reconciliation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod conflict;
mod error;
mod modification;
mod progress;
mod replicator;

pub use cache::{ClientCacheBackend, ClientCacheBuilder, ReconcileReport, SERVICE_USER};
pub use config::{CacheConfig, ReplicatorOptions};
pub use conflict::{
    resolve_delete, resolve_update, Resolution, SkipReason, ACTION_STATE_ATTRIBUTES,
    VOLATILE_ATTRIBUTES,
};
pub use error::{SyncError, SyncResult};
pub use modification::{Command, Modification, ModificationTracker};
pub use progress::{ProgressObserver, ProgressSnapshot, ProgressSubject};
pub use replicator::{
    sort_groups, BackendReplicator, ClassReport, ReplicationReport, ReplicationScope,
    LICENSE_ORDER, REPLICATION_ORDER,
};

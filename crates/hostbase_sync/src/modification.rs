//! Log of local modifications pending reconciliation.

use hostbase_object::{Object, ObjectClass};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What a local mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Create or replace.
    Insert,
    /// Must-exist update.
    Update,
    /// Delete.
    Delete,
}

/// One local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    /// Class of the modified record.
    pub object_class: ObjectClass,
    /// Rendered ident of the modified record.
    pub ident: String,
    /// What was done.
    pub command: Command,
    /// The object as written, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Object>,
}

impl Modification {
    /// Records `command` applied to `object`.
    pub fn of(command: Command, object: &Object) -> Self {
        Self {
            object_class: object.class(),
            ident: object.ident().to_string(),
            command,
            object: Some(object.clone()),
        }
    }

    /// Records a mutation known only by class and ident.
    pub fn by_ident(object_class: ObjectClass, ident: impl Into<String>, command: Command) -> Self {
        Self {
            object_class,
            ident: ident.into(),
            command,
            object: None,
        }
    }
}

/// Ordered, thread-safe log of local modifications.
///
/// # Invariants
///
/// - Entries are kept in the order the mutations happened
/// - Draining hands out every pending entry exactly once
#[derive(Debug, Default)]
pub struct ModificationTracker {
    entries: Mutex<VecDeque<Modification>>,
}

impl ModificationTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a modification.
    pub fn record(&self, modification: Modification) {
        self.entries.lock().push_back(modification);
    }

    /// Appends one modification per object.
    pub fn record_all(&self, command: Command, objects: &[Object]) {
        let mut entries = self.entries.lock();
        entries.extend(objects.iter().map(|object| Modification::of(command, object)));
    }

    /// Returns a copy of the pending entries.
    pub fn pending(&self) -> Vec<Modification> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Removes and returns every pending entry.
    pub fn drain(&self) -> Vec<Modification> {
        self.entries.lock().drain(..).collect()
    }

    /// Puts entries back in front of the log, keeping their order.
    pub fn restore(&self, modifications: Vec<Modification>) {
        let mut entries = self.entries.lock();
        for modification in modifications.into_iter().rev() {
            entries.push_front(modification);
        }
    }

    /// Returns the number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every pending entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

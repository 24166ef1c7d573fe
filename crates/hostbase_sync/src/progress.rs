//! Observable progress counters.

use parking_lot::RwLock;
use std::sync::Arc;

/// A point-in-time view of a progress subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Subject id.
    pub id: String,
    /// Current title.
    pub title: String,
    /// Current message.
    pub message: String,
    /// Units done.
    pub state: u64,
    /// Units expected.
    pub end: u64,
}

impl ProgressSnapshot {
    /// Returns completion in percent, 0 when `end` is 0.
    pub fn percent(&self) -> u64 {
        if self.end == 0 {
            0
        } else {
            (self.state.min(self.end) * 100) / self.end
        }
    }
}

/// Receives every change of a subject it is attached to.
pub trait ProgressObserver: Send + Sync {
    /// Called after each change.
    fn progress_changed(&self, snapshot: &ProgressSnapshot);
}

/// A progress counter that notifies attached observers on every change.
///
/// Progress is informational only; nothing depends on its values.
pub struct ProgressSubject {
    state: RwLock<ProgressSnapshot>,
    observers: RwLock<Vec<Arc<dyn ProgressObserver>>>,
}

impl ProgressSubject {
    /// Creates a subject with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ProgressSnapshot {
                id: id.into(),
                ..ProgressSnapshot::default()
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Attaches an observer.
    pub fn attach(&self, observer: Arc<dyn ProgressObserver>) {
        self.observers.write().push(observer);
    }

    /// Returns the current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().clone()
    }

    /// Zeroes the counter and clears the message.
    pub fn reset(&self) {
        self.update(|s| {
            s.state = 0;
            s.end = 0;
            s.message.clear();
        });
    }

    /// Sets the expected number of units.
    pub fn set_end(&self, end: u64) {
        self.update(|s| s.end = end);
    }

    /// Sets the title.
    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.update(|s| s.title = title);
    }

    /// Sets the message.
    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.message = message);
    }

    /// Sets the number of units done.
    pub fn set_state(&self, state: u64) {
        self.update(|s| s.state = state);
    }

    /// Adds to the number of units done.
    pub fn add_to_state(&self, units: u64) {
        self.update(|s| s.state = s.state.saturating_add(units));
    }

    fn update(&self, change: impl FnOnce(&mut ProgressSnapshot)) {
        let snapshot = {
            let mut state = self.state.write();
            change(&mut state);
            state.clone()
        };
        for observer in self.observers.read().iter() {
            observer.progress_changed(&snapshot);
        }
    }
}

impl std::fmt::Debug for ProgressSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubject")
            .field("state", &*self.state.read())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    impl ProgressObserver for Collect {
        fn progress_changed(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().push(snapshot.state);
        }
    }

    #[test]
    fn observers_see_every_change() {
        let subject = ProgressSubject::new("overall");
        let seen = Arc::new(Collect::default());
        subject.attach(seen.clone());

        subject.set_end(4);
        subject.add_to_state(1);
        subject.add_to_state(2);
        assert_eq!(subject.snapshot().percent(), 75);
        assert_eq!(*seen.0.lock(), vec![0, 1, 3]);

        subject.reset();
        assert_eq!(subject.snapshot().state, 0);
        assert_eq!(subject.snapshot().id, "overall");
    }

    #[test]
    fn percent_of_empty_subject() {
        assert_eq!(ProgressSnapshot::default().percent(), 0);
    }
}

//! Shared task registry.
//!
//! Single source of truth for completion queries: a mapping from task
//! identity to the latest known `Task`, guarded by one coarse lock.
//! An entry exists iff a task with that identity has been accepted for
//! dispatch. The controller inserts `Pending` entries at submission,
//! the sink overwrites them with the final status.
//!
//! The lock is held only for the map read or write itself, never across
//! a blocking send/receive or a handler invocation.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use super::task::Task;

#[derive(Debug)]
pub(crate) struct TaskRegistry<K, P> {
    tasks: Mutex<HashMap<K, Task<K, P>>>,
}

impl<K, P> TaskRegistry<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task as accepted for dispatch.
    ///
    /// Returns `false` without touching the map when the identity is
    /// already present. The check and the insert happen under one lock
    /// acquisition, so concurrent submitters of the same identity are
    /// linearized: exactly one of them observes `true`.
    pub fn insert_pending(&self, task: &Task<K, P>) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(task.identity()) {
            return false;
        }
        tasks.insert(task.identity().clone(), task.clone());
        true
    }

    /// Remove an entry. Used to back out a registration whose dispatch
    /// send failed, so the registry never shows a task no worker will
    /// ever receive.
    pub fn remove(&self, identity: &K) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.remove(identity);
    }

    /// Record a finished task, overwriting its `Pending` entry.
    pub fn record(&self, task: Task<K, P>) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(task.identity().clone(), task);
    }

    /// True iff every entry is terminal. Vacuously true when empty.
    pub fn all_done(&self) -> bool {
        let tasks = self.tasks.lock().unwrap();
        tasks.values().all(|t| t.status().is_terminal())
    }

    /// A copy of the current contents, taken under the lock.
    pub fn snapshot(&self) -> HashMap<K, Task<K, P>> {
        let tasks = self.tasks.lock().unwrap();
        tasks.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

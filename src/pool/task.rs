//! Task value type and its status lifecycle.
//!
//! A `Task` is the unit of work handed to the pool: a caller-chosen
//! identity (the sole deduplication key), an opaque payload only the
//! handler interprets, and a status that moves from `Pending` to exactly
//! one terminal state.

use std::fmt;
use std::hash::Hash;

/// Lifecycle status of a task.
///
/// The status starts at `Pending` and transitions at most once, to
/// `Done` or `Failed`. Stop instructions are carried out-of-band as a
/// [`ControlSignal`](super::envelope::ControlSignal) and are never
/// encoded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted for dispatch, not yet finished.
    Pending,
    /// Handler returned success.
    Done,
    /// Handler returned failure.
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal (`Done` or `Failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// A unit of work.
///
/// `K` is the identity type (any hashable, cloneable key: a URI string,
/// an integer, ...). `P` is the payload, opaque to the engine.
#[derive(Debug, Clone)]
pub struct Task<K, P> {
    identity: K,
    payload: P,
    status: TaskStatus,
}

impl<K, P> Task<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    /// Create a new task in the `Pending` state.
    pub fn new(identity: K, payload: P) -> Self {
        Self {
            identity,
            payload,
            status: TaskStatus::Pending,
        }
    }

    pub fn identity(&self) -> &K {
        &self.identity
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// Mark the task `Done`. Only valid while `Pending`; a terminal
    /// status is never overwritten.
    pub(crate) fn set_done(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Done;
        }
    }

    /// Mark the task `Failed`. Same single-transition rule as `set_done`.
    pub(crate) fn set_failed(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending() {
        let task = Task::new(1u32, "payload");
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(!task.is_done());
        assert!(!task.is_failed());
    }

    #[test]
    fn status_transitions_once() {
        let mut task = Task::new("uri", ());
        task.set_done();
        assert!(task.is_done());
        assert!(task.status().is_terminal());
    }

    #[test]
    fn failed_is_terminal() {
        let mut task = Task::new(7u64, vec![1u8, 2]);
        task.set_failed();
        assert!(task.is_failed());
        assert!(task.status().is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}

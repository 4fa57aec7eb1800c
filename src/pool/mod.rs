//! Process-local task-distribution engine.
//!
//! Callers submit units of work identified by a unique key, a fixed-size
//! pool of worker threads executes them through a caller-supplied
//! handler, and a dedicated sink records final status so callers can
//! poll for completion. The engine knows nothing about streams, URIs or
//! manifests; the payload is opaque and only the handler interprets it.

pub mod controller;
pub mod error;
pub mod task;

mod envelope;
mod registry;
mod sink;
mod worker;

pub use controller::{DEFAULT_WORKERS, Pool, PoolConfig, PoolState, SubmitOutcome};
pub use error::PoolError;
pub use task::{Task, TaskStatus};

use std::sync::Arc;

/// Caller-supplied task handler, invoked synchronously on a worker
/// thread. `true` means success (`Done`), `false` failure (`Failed`).
/// It runs to natural completion, never interrupted by shutdown, and
/// must translate its internal failures into a `false` return rather
/// than panicking.
pub type TaskHandler<K, P> = Arc<dyn Fn(&Task<K, P>) -> bool + Send + Sync>;

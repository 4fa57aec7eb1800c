// Foreman: process-local task-distribution engine
//
// A fixed pool of worker threads executes caller-submitted tasks
// through a caller-supplied handler; a single sink aggregates results
// into a shared registry that callers poll for completion. The `bot`
// and `fetch` modules are the thin crawler collaborators built on top.

pub mod bot;
pub mod fetch;
pub mod logging;
pub mod pool;

// Re-export the engine surface
pub use pool::{
    DEFAULT_WORKERS, Pool, PoolConfig, PoolError, PoolState, SubmitOutcome, Task, TaskHandler,
    TaskStatus,
};

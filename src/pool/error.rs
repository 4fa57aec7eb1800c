use thiserror::Error;

/// Errors surfaced by the pool controller.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool is not running; call start() first")]
    NotStarted,
    #[error("Pool is already running")]
    AlreadyRunning,
    #[error("Pool is shutting down")]
    ShuttingDown,
    #[error("Thread setup error: {0}")]
    ThreadSetup(String),
    #[error("Startup barrier failed: {0}")]
    BarrierFailed(String),
    #[error("Dispatch channel closed: {0}")]
    DispatchClosed(String),
}

//! # Pool Controller
//!
//! Owns the engine lifecycle: spawning the sink and workers, running the
//! startup barrier, publishing the dispatch channel, dedup-on-submit,
//! and the ordered shutdown/join sequence.
//!
//! A `Pool` is an explicit owned instance; several independent pools may
//! coexist in one process. All fields use interior mutability so a
//! shared `Arc<Pool>` can serve concurrent submitters.
//!
//! ## Lifecycle
//! `Unstarted → Starting (barrier in progress) → Running (dispatch open)
//! → Stopping (signals issued, joins in progress) → Stopped`. `start`
//! drives `Unstarted→Running`; `shutdown` drives any state to `Stopped`
//! and is safe to call from `Starting` (cleanup after a failed barrier)
//! and from `Stopped` (no-op).

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use flume::Sender;
use tracing::{debug, error, info};

use super::TaskHandler;
use super::envelope::ControlSignal;
use super::error::PoolError;
use super::registry::TaskRegistry;
use super::sink::Sink;
use super::task::Task;
use super::worker::Worker;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 3;

/// Configuration for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Never started.
    Unstarted,
    /// Startup barrier in progress.
    Starting,
    /// Dispatch open, workers polling.
    Running,
    /// Stop signals issued, joins in progress.
    Stopping,
    /// All threads joined, dispatch cleared.
    Stopped,
}

/// What happened to a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Registered as `Pending` and sent on the dispatch channel.
    Dispatched,
    /// Identity already registered; the task was dropped.
    Duplicate,
}

/// The task-distribution engine.
///
/// Callers submit [`Task`]s keyed by a unique identity; a fixed set of
/// worker threads executes them through the caller-supplied handler, a
/// single sink records final statuses, and callers poll [`Pool::all_done`]
/// or [`Pool::snapshot`] for completion.
pub struct Pool<K, P> {
    config: PoolConfig,

    /// Lifecycle state, see [`PoolState`].
    state: Mutex<PoolState>,

    /// Shared task registry; replaced wholesale on each `start`.
    registry: Mutex<Arc<TaskRegistry<K, P>>>,

    /// Dispatch sender published only once the barrier has completed.
    dispatch_tx: Mutex<Option<Sender<Task<K, P>>>>,

    /// One control sender per spawned worker.
    worker_controls: Mutex<Vec<Sender<ControlSignal>>>,

    /// The sink's control sender.
    sink_control: Mutex<Option<Sender<ControlSignal>>>,

    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    sink_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<K, P> Pool<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::Unstarted),
            registry: Mutex::new(Arc::new(TaskRegistry::new())),
            dispatch_tx: Mutex::new(None),
            worker_controls: Mutex::new(Vec::new()),
            sink_control: Mutex::new(None),
            worker_handles: Mutex::new(Vec::new()),
            sink_handle: Mutex::new(None),
        }
    }

    /// Start the pool: spawn the sink and workers, run the startup
    /// barrier, then open dispatch.
    ///
    /// Legal only from `Unstarted` or `Stopped`; starting again after a
    /// stop resets the registry, thread set and dispatch channel. On any
    /// spawn or barrier failure the partially started threads are reaped
    /// via [`Pool::shutdown`] before the error is returned.
    pub fn start(&self, handler: TaskHandler<K, P>) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                PoolState::Unstarted | PoolState::Stopped => *state = PoolState::Starting,
                PoolState::Starting | PoolState::Running => {
                    return Err(PoolError::AlreadyRunning);
                }
                PoolState::Stopping => return Err(PoolError::ShuttingDown),
            }
        }

        match self.spawn_all(handler) {
            Ok(dispatch_tx) => {
                *self.dispatch_tx.lock().unwrap() = Some(dispatch_tx);
                *self.state.lock().unwrap() = PoolState::Running;
                info!("pool running with {} workers", self.config.workers);
                Ok(())
            }
            Err(e) => {
                error!("pool start failed: {e}");
                self.shutdown();
                Err(e)
            }
        }
    }

    /// Spawn sink and workers, then hold the barrier. Returns the
    /// dispatch sender ready for publication.
    fn spawn_all(&self, handler: TaskHandler<K, P>) -> Result<Sender<Task<K, P>>, PoolError> {
        // Fresh registry for this generation.
        let registry = Arc::new(TaskRegistry::new());
        *self.registry.lock().unwrap() = registry.clone();

        // Result path is a rendezvous: a worker's send completes only
        // when the sink takes the envelope.
        let (result_tx, result_rx) = flume::bounded(0);

        let (sink_control_tx, sink_control_rx) = flume::bounded(1);
        let sink = Sink::new(registry, result_rx, sink_control_rx);
        let sink_handle = sink
            .spawn()
            .map_err(|e| PoolError::ThreadSetup(format!("sink: {e}")))?;
        *self.sink_control.lock().unwrap() = Some(sink_control_tx);
        *self.sink_handle.lock().unwrap() = Some(sink_handle);

        let (dispatch_tx, dispatch_rx) = flume::unbounded();
        let (ready_tx, ready_rx) = flume::bounded(self.config.workers);

        for _ in 0..self.config.workers {
            let (control_tx, control_rx) = flume::bounded(1);
            let worker = Worker::new(
                handler.clone(),
                dispatch_rx.clone(),
                control_rx,
                result_tx.clone(),
                ready_tx.clone(),
            );
            let worker_id = worker.id();
            let handle = worker
                .spawn()
                .map_err(|e| PoolError::ThreadSetup(format!("worker [{worker_id}]: {e}")))?;
            self.worker_controls.lock().unwrap().push(control_tx);
            self.worker_handles.lock().unwrap().push(handle);
        }
        // Only worker clones remain; if every worker exits the barrier
        // recv below fails instead of hanging.
        drop(ready_tx);

        // Startup barrier: tasks submitted before every worker is
        // actively polling could otherwise be stranded, so dispatch
        // opens only after each worker has reported in and been acked.
        for n in 0..self.config.workers {
            let ready = ready_rx.recv().map_err(|_| {
                PoolError::BarrierFailed(format!(
                    "worker exited before sync ({n} of {} ready)",
                    self.config.workers
                ))
            })?;
            debug!("sync with worker {} [{}]", n, ready.worker_id);
            ready.ack.send(()).map_err(|_| {
                PoolError::BarrierFailed(format!("worker [{}] exited during sync", ready.worker_id))
            })?;
        }

        Ok(dispatch_tx)
    }

    /// Submit a task for execution.
    ///
    /// Fails with [`PoolError::NotStarted`] when dispatch is not open;
    /// the task is dropped. A task whose identity is already registered
    /// is dropped silently with [`SubmitOutcome::Duplicate`]: at most
    /// one dispatch per identity, regardless of concurrent submitters.
    pub fn submit(&self, task: Task<K, P>) -> Result<SubmitOutcome, PoolError> {
        let dispatch_tx = {
            let guard = self.dispatch_tx.lock().unwrap();
            match &*guard {
                Some(tx) => tx.clone(),
                None => {
                    error!(
                        "submit of task {:?} rejected: pool not running",
                        task.identity()
                    );
                    return Err(PoolError::NotStarted);
                }
            }
        };

        self.dispatch_with(&dispatch_tx, task)
    }

    /// Register the task and send it on the given dispatch sender.
    ///
    /// If the send fails (a shutdown can drop every worker receiver
    /// between the sender lookup above and the send here), the just
    /// inserted entry is backed out: the registry only ever shows tasks
    /// that were actually accepted for dispatch.
    fn dispatch_with(
        &self,
        dispatch_tx: &Sender<Task<K, P>>,
        task: Task<K, P>,
    ) -> Result<SubmitOutcome, PoolError> {
        let registry = self.registry_handle();
        if !registry.insert_pending(&task) {
            info!("task {:?} already submitted, dropped", task.identity());
            return Ok(SubmitOutcome::Duplicate);
        }

        // Registry lock is already released here: a concurrent duplicate
        // submit sees the entry even while this send is still pending.
        debug!("dispatching task {:?}", task.identity());
        if let Err(e) = dispatch_tx.send(task) {
            let task = e.into_inner();
            error!(
                "dispatch of task {:?} failed, backing out its registration",
                task.identity()
            );
            registry.remove(task.identity());
            return Err(PoolError::DispatchClosed("channel disconnected".to_string()));
        }
        Ok(SubmitOutcome::Dispatched)
    }

    /// Stop every worker and the sink, and join them.
    ///
    /// Idempotent, and safe after a partial `start`. Order is fixed:
    /// dispatch is closed, workers are signaled and joined first, the
    /// sink last, so an in-flight result from a draining worker is
    /// still recorded and acked before the sink goes down. After return
    /// no worker or sink thread remains alive.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                PoolState::Unstarted | PoolState::Stopped => return,
                _ => *state = PoolState::Stopping,
            }
        }
        info!("stopping pool");

        // Close dispatch; an idle worker also observes this as stop.
        self.dispatch_tx.lock().unwrap().take();

        let controls = std::mem::take(&mut *self.worker_controls.lock().unwrap());
        for control in &controls {
            // A worker that already exited has dropped its receiver.
            let _ = control.send(ControlSignal::Stop);
        }
        let handles = std::mem::take(&mut *self.worker_handles.lock().unwrap());
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked outside the handler boundary");
            }
        }

        if let Some(control) = self.sink_control.lock().unwrap().take() {
            let _ = control.send(ControlSignal::Stop);
        }
        if let Some(handle) = self.sink_handle.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("sink thread panicked");
            }
        }

        *self.state.lock().unwrap() = PoolState::Stopped;
        info!("pool stopped");
    }

    /// True iff every registered task has reached a terminal status.
    /// Vacuously true when nothing has been submitted.
    pub fn all_done(&self) -> bool {
        self.registry_handle().all_done()
    }

    /// A copy of the registry taken under its lock.
    pub fn snapshot(&self) -> HashMap<K, Task<K, P>> {
        self.registry_handle().snapshot()
    }

    /// Number of tasks accepted for dispatch in this generation.
    pub fn task_count(&self) -> usize {
        self.registry_handle().len()
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock().unwrap()
    }

    fn registry_handle(&self) -> Arc<TaskRegistry<K, P>> {
        self.registry.lock().unwrap().clone()
    }
}

impl<K, P> Default for Pool<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl<K, P> fmt::Debug for Pool<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("workers", &self.config.workers)
            .field("state", &*self.state.lock().unwrap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_dispatch_send_backs_out_the_registration() {
        let pool: Pool<u32, ()> = Pool::default();
        // Every receiver dropped, as after a shutdown that raced the
        // sender lookup in submit.
        let (tx, rx) = flume::unbounded::<Task<u32, ()>>();
        drop(rx);

        let err = pool.dispatch_with(&tx, Task::new(1, ())).unwrap_err();
        assert!(matches!(err, PoolError::DispatchClosed(_)));
        // No phantom Pending entry is left behind.
        assert_eq!(pool.task_count(), 0);
        assert!(pool.all_done());
    }
}

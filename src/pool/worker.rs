//! # Worker Thread Implementation
//!
//! One worker per pool slot, each on a dedicated OS thread. A worker
//! announces readiness to the controller, blocks for the controller's
//! acknowledgement (its leg of the startup barrier), then loops on a
//! blocking select over two sources: its private control channel and
//! the shared dispatch channel.
//!
//! ## Core Algorithm
//! 1. Send `ReadySignal`, block until the controller acks.
//! 2. Select over control + dispatch; control ready means exit.
//! 3. Run the handler synchronously to completion; stop signals are
//!    only observed between tasks, never mid-handler.
//! 4. Send the finished task to the sink and block until the sink has
//!    recorded it and acked (backpressure rendezvous), then poll again.
//!
//! ## Safety Considerations
//! - Handler panics are caught at this boundary; the worker logs and
//!   exits, permanently reducing pool capacity for the run.
//! - A disconnected dispatch or result channel is treated as stop.

use std::fmt;
use std::hash::Hash;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use flume::{Receiver, Selector, Sender};
use tracing::{debug, error};
use uuid::Uuid;

use super::TaskHandler;
use super::envelope::{ControlSignal, ReadySignal, ResultEnvelope};
use super::task::Task;

pub(crate) struct Worker<K, P> {
    /// Unique identifier for this worker, used in logs and thread name.
    id: Uuid,

    /// Caller-supplied task handler.
    handler: TaskHandler<K, P>,

    /// Shared dispatch channel all workers pull tasks from.
    task_rx: Receiver<Task<K, P>>,

    /// Private control channel carrying the stop signal.
    control_rx: Receiver<ControlSignal>,

    /// Result path to the sink.
    result_tx: Sender<ResultEnvelope<K, P>>,

    /// Startup barrier channel back to the controller.
    ready_tx: Sender<ReadySignal>,
}

/// Outcome of one select over the worker's two sources.
enum Event<K, P> {
    Control(Result<ControlSignal, flume::RecvError>),
    Task(Result<Task<K, P>, flume::RecvError>),
}

impl<K, P> Worker<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    pub fn new(
        handler: TaskHandler<K, P>,
        task_rx: Receiver<Task<K, P>>,
        control_rx: Receiver<ControlSignal>,
        result_tx: Sender<ResultEnvelope<K, P>>,
        ready_tx: Sender<ReadySignal>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("create worker [{}]", id);
        Self {
            id,
            handler,
            task_rx,
            control_rx,
            result_tx,
            ready_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Launches the worker loop on a named OS thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("worker-{}", self.id))
            .spawn(move || self.run())
    }

    fn run(self) {
        // Sync with the controller before touching the dispatch channel.
        let (ack_tx, ack_rx) = flume::bounded(1);
        let ready = ReadySignal {
            worker_id: self.id,
            ack: ack_tx,
        };
        if self.ready_tx.send(ready).is_err() {
            error!("[worker-{}] controller gone before sync, exiting", self.id);
            return;
        }
        debug!("[worker-{}] waiting for start ack", self.id);
        if ack_rx.recv().is_err() {
            error!("[worker-{}] start ack never arrived, exiting", self.id);
            return;
        }
        debug!("[worker-{}] started", self.id);

        loop {
            let event = Selector::new()
                .recv(&self.control_rx, Event::Control)
                .recv(&self.task_rx, Event::Task)
                .wait();

            let task = match event {
                Event::Control(_) => {
                    // Stop signal, or the controller dropped the channel.
                    debug!("[worker-{}] stop received", self.id);
                    break;
                }
                Event::Task(Err(_)) => {
                    debug!("[worker-{}] dispatch channel closed", self.id);
                    break;
                }
                Event::Task(Ok(task)) => task,
            };

            debug!("[worker-{}] working on {:?}", self.id, task.identity());
            let mut task = task;
            match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(&task))) {
                Ok(true) => {
                    debug!("[worker-{}] task {:?} done", self.id, task.identity());
                    task.set_done();
                }
                Ok(false) => {
                    debug!("[worker-{}] task {:?} failed", self.id, task.identity());
                    task.set_failed();
                }
                Err(panic_err) => {
                    let msg = match panic_err.downcast::<String>() {
                        Ok(s) => *s,
                        Err(e) => match e.downcast::<&'static str>() {
                            Ok(s) => (*s).to_string(),
                            Err(_) => "unknown panic".to_string(),
                        },
                    };
                    error!(
                        "[worker-{}] handler panicked on {:?}: {}; worker exiting",
                        self.id,
                        task.identity(),
                        msg
                    );
                    // No restart: pool capacity stays reduced for the run.
                    break;
                }
            }

            // Rendezvous with the sink: block until the result is recorded.
            let (ack_tx, ack_rx) = flume::bounded(1);
            let envelope = ResultEnvelope {
                task,
                worker_id: self.id,
                ack: ack_tx,
            };
            debug!("[worker-{}] sending result", self.id);
            if self.result_tx.send(envelope).is_err() {
                error!("[worker-{}] sink gone, result dropped", self.id);
                break;
            }
            if ack_rx.recv().is_err() {
                error!("[worker-{}] sink gone before ack", self.id);
                break;
            }
        }

        debug!("[worker-{}] terminated", self.id);
    }
}

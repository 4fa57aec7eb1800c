//! # Sink Thread Implementation
//!
//! The single result aggregator. It runs the same dual-source select as
//! a worker: a private control channel and the shared result channel.
//! Each received result is written into the registry under its lock and
//! then acknowledged back to the originating worker. Because there is
//! exactly one sink and delivery is a blocking rendezvous, results are
//! recorded strictly one at a time, system-wide.

use std::fmt;
use std::hash::Hash;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use flume::{Receiver, Selector};
use tracing::{debug, error};
use uuid::Uuid;

use super::envelope::{ControlSignal, ResultEnvelope};
use super::registry::TaskRegistry;

pub(crate) struct Sink<K, P> {
    id: Uuid,
    registry: Arc<TaskRegistry<K, P>>,
    result_rx: Receiver<ResultEnvelope<K, P>>,
    control_rx: Receiver<ControlSignal>,
}

enum Event<K, P> {
    Control(Result<ControlSignal, flume::RecvError>),
    Result(Result<ResultEnvelope<K, P>, flume::RecvError>),
}

impl<K, P> Sink<K, P>
where
    K: Eq + Hash + Clone + Send + fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    pub fn new(
        registry: Arc<TaskRegistry<K, P>>,
        result_rx: Receiver<ResultEnvelope<K, P>>,
        control_rx: Receiver<ControlSignal>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("create sink [{}]", id);
        Self {
            id,
            registry,
            result_rx,
            control_rx,
        }
    }

    /// Launches the sink loop on a named OS thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("sink-{}", self.id))
            .spawn(move || self.run())
    }

    fn run(self) {
        loop {
            let event = Selector::new()
                .recv(&self.control_rx, Event::Control)
                .recv(&self.result_rx, Event::Result)
                .wait();

            match event {
                Event::Control(_) => {
                    debug!("[sink-{}] stop received", self.id);
                    break;
                }
                Event::Result(Err(_)) => {
                    debug!("[sink-{}] result channel closed", self.id);
                    break;
                }
                Event::Result(Ok(envelope)) => {
                    debug!(
                        "[sink-{}] received result of task {:?} from worker {}",
                        self.id,
                        envelope.task.identity(),
                        envelope.worker_id
                    );
                    self.registry.record(envelope.task);
                    // Ack only after the registry write, so the worker's
                    // next poll happens-after its result became visible.
                    if envelope.ack.send(()).is_err() {
                        error!(
                            "[sink-{}] worker {} gone before ack",
                            self.id, envelope.worker_id
                        );
                    }
                }
            }
        }

        debug!("[sink-{}] terminated", self.id);
    }
}

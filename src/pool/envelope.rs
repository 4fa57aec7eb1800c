//! Typed messages exchanged over the pool's internal channels.
//!
//! Control traffic, result delivery and the startup handshake each get
//! their own message type so a stop instruction can never be mistaken
//! for task data. Messages that require a rendezvous carry their own
//! acknowledgement sender: the receiver replies on it once the message
//! has been fully acted upon, and the originator blocks on the paired
//! receiver until then.

use flume::Sender;
use uuid::Uuid;

use super::task::Task;

/// Out-of-band instruction delivered on a private control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    /// Exit the receiving thread's main loop.
    Stop,
}

/// A finished task on its way from a worker to the sink.
///
/// The worker blocks on the paired ack receiver until the sink has
/// written the task into the registry, which bounds the sink to one
/// unacknowledged result at a time system-wide.
pub(crate) struct ResultEnvelope<K, P> {
    pub task: Task<K, P>,
    pub worker_id: Uuid,
    pub ack: Sender<()>,
}

/// A worker announcing it is about to enter its polling loop.
///
/// One leg of the startup barrier: the controller acks each ready
/// worker individually and opens dispatch only after all have reported.
pub(crate) struct ReadySignal {
    pub worker_id: Uuid,
    pub ack: Sender<()>,
}

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Weak,
};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;
use wms_realtime_proto::{ChangeEvent, ChannelStatus, Topic};

use crate::error::TransportError;

/// Identifies one connection attempt. Callbacks carrying an older id than the manager's
/// current attempt are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConnectionId(pub(crate) u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "C-{}", self.0) }
}

/// The remote change-data stream.
///
/// `open` must not block: it starts one subscription attempt for `channel` covering `topics`
/// and reports progress through `sink` from whatever task the transport runs on. Dropping or
/// closing the returned handle ends the attempt.
pub trait ChangeTransport: Send + Sync + 'static {
    fn open(&self, channel: &str, topics: &[Topic], sink: TransportSink) -> Result<Box<dyn ChannelHandle>, TransportError>;
}

pub trait ChannelHandle: Send + Sync {
    /// Idempotent
    fn close(&self);
}

pub(crate) trait ConnectionEvents: Send + Sync {
    fn on_status(&self, connection: ConnectionId, status: ChannelStatus);
    fn on_change(&self, connection: ConnectionId, event: ChangeEvent);
}

/// What a transport reports for one connection attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Status(ConnectionId, ChannelStatus),
    Change(ConnectionId, ChangeEvent),
}

static DETACHED_IDS: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
enum SinkTarget {
    Manager(Weak<dyn ConnectionEvents>),
    Channel(mpsc::UnboundedSender<TransportSignal>),
}

/// Fire-and-forget callback surface handed to a transport for a single attempt.
#[derive(Clone)]
pub struct TransportSink {
    connection: ConnectionId,
    target: SinkTarget,
}

impl TransportSink {
    pub(crate) fn new(connection: ConnectionId, target: Weak<dyn ConnectionEvents>) -> Self {
        Self { connection, target: SinkTarget::Manager(target) }
    }

    /// A sink that forwards into a channel instead of a manager, for driving a transport on its own.
    /// Each detached sink gets its own id.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let connection = ConnectionId(DETACHED_IDS.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { connection, target: SinkTarget::Channel(tx) }, rx)
    }

    pub fn connection_id(&self) -> ConnectionId { self.connection }

    pub fn status(&self, status: ChannelStatus) {
        match &self.target {
            SinkTarget::Manager(target) => match target.upgrade() {
                Some(target) => target.on_status(self.connection, status),
                None => trace!("{} status {} after manager dropped", self.connection, status),
            },
            SinkTarget::Channel(tx) => {
                let _ = tx.send(TransportSignal::Status(self.connection, status));
            }
        }
    }

    pub fn change(&self, event: ChangeEvent) {
        match &self.target {
            SinkTarget::Manager(target) => {
                if let Some(target) = target.upgrade() {
                    target.on_change(self.connection, event);
                }
            }
            SinkTarget::Channel(tx) => {
                let _ = tx.send(TransportSignal::Change(self.connection, event));
            }
        }
    }
}

impl std::fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("TransportSink").field("connection", &self.connection).finish() }
}

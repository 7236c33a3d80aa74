//! Typed events emitted by transports and the connection supervisor

use crate::codec::PushFrame;
use crate::error::SdkError;
use crate::types::{
    ConnectionInfo, LatestBlockhash, LatestSlot, LeaderHint, PriorityFee, Protocol,
    TipInstruction, TransactionUpdate,
};
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the shared event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything a connection reports asynchronously
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Initial connection established
    Connected(ConnectionInfo),
    /// Streaming connection dropped without a caller-initiated disconnect
    ConnectionLost { protocol: Protocol, reason: String },
    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect succeeded and subscriptions were replayed
    Reconnected(ConnectionInfo),
    /// Caller-initiated disconnect completed
    Disconnected,
    LeaderHint(LeaderHint),
    TipInstruction(TipInstruction),
    PriorityFee(PriorityFee),
    LatestBlockhash(LatestBlockhash),
    LatestSlot(LatestSlot),
    /// Status change for a transaction after its submit call settled
    TransactionUpdate(TransactionUpdate),
    /// Background failure with no caller waiting on it
    Error(SdkError),
}

impl From<PushFrame> for TransportEvent {
    fn from(frame: PushFrame) -> Self {
        match frame {
            PushFrame::LeaderHint(f) => TransportEvent::LeaderHint(f.into()),
            PushFrame::TipInstruction(f) => TransportEvent::TipInstruction(f.into()),
            PushFrame::PriorityFee(f) => TransportEvent::PriorityFee(f.into()),
            PushFrame::LatestBlockhash(f) => TransportEvent::LatestBlockhash(f.into()),
            PushFrame::LatestSlot(f) => TransportEvent::LatestSlot(f.into()),
        }
    }
}

/// Create the broadcast channel shared by a supervisor and its transports
pub fn event_channel() -> broadcast::Sender<TransportEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

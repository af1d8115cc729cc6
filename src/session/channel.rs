//! Move Channel
//!
//! The rendezvous primitive between the two turn-takers of one session.
//! Each turn uses it twice:
//!
//! 1. the submitter publishes the judged move into a capacity-1 mailbox and
//!    the opponent takes it (bounded by the per-move deadline),
//! 2. the opponent acknowledges once it has consumed the move and settled
//!    the who-plays-next bookkeeping, releasing the submitter (also bounded
//!    by the deadline).
//!
//! The capacity-1 mailbox enforces the at-most-one-outstanding-move
//! invariant: a second publish before the first was taken is a protocol
//! violation, not a silent overwrite.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::time::timeout;

use crate::game::MoveRecord;

/// Move Channel errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// A move was published before the previous one was consumed.
    #[error("Previous move has not been consumed yet")]
    MovePending,

    /// A second acknowledgment was sent before the first was received.
    #[error("Previous acknowledgment has not been received yet")]
    AckPending,

    /// Nothing arrived within the deadline.
    #[error("No signal arrived within the deadline")]
    Timeout,

    /// The other half of the channel is gone.
    #[error("Peer endpoint is gone")]
    PeerGone,
}

/// Pairwise rendezvous between the two participants of one session.
///
/// Both mailboxes have capacity 1. Receivers sit behind async mutexes so the
/// channel can be shared by reference between the two connection tasks; the
/// strict turn alternation means the locks never contend.
pub struct MoveChannel {
    move_tx: mpsc::Sender<MoveRecord>,
    move_rx: tokio::sync::Mutex<mpsc::Receiver<MoveRecord>>,
    ack_tx: mpsc::Sender<()>,
    ack_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl MoveChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (move_tx, move_rx) = mpsc::channel(1);
        let (ack_tx, ack_rx) = mpsc::channel(1);
        Self {
            move_tx,
            move_rx: tokio::sync::Mutex::new(move_rx),
            ack_tx,
            ack_rx: tokio::sync::Mutex::new(ack_rx),
        }
    }

    /// Publish a judged move for the opponent to take. Never blocks.
    pub fn publish(&self, record: MoveRecord) -> Result<(), ChannelError> {
        self.move_tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::MovePending,
            TrySendError::Closed(_) => ChannelError::PeerGone,
        })
    }

    /// Take the outstanding move, waiting up to `deadline` for one to arrive.
    pub async fn take(&self, deadline: Duration) -> Result<MoveRecord, ChannelError> {
        let mut rx = self.move_rx.lock().await;

        // fast path: the move may have been published before we got here
        match rx.try_recv() {
            Ok(record) => return Ok(record),
            Err(TryRecvError::Disconnected) => return Err(ChannelError::PeerGone),
            Err(TryRecvError::Empty) => {}
        }

        match timeout(deadline, rx.recv()).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(ChannelError::PeerGone),
            Err(_) => Err(ChannelError::Timeout),
        }
    }

    /// Signal that the taken move was consumed and the turn is settled.
    pub fn acknowledge(&self) -> Result<(), ChannelError> {
        self.ack_tx.try_send(()).map_err(|e| match e {
            TrySendError::Full(()) => ChannelError::AckPending,
            TrySendError::Closed(()) => ChannelError::PeerGone,
        })
    }

    /// Wait up to `deadline` for the opponent's acknowledgment.
    pub async fn await_ack(&self, deadline: Duration) -> Result<(), ChannelError> {
        let mut rx = self.ack_rx.lock().await;

        match rx.try_recv() {
            Ok(()) => return Ok(()),
            Err(TryRecvError::Disconnected) => return Err(ChannelError::PeerGone),
            Err(TryRecvError::Empty) => {}
        }

        match timeout(deadline, rx.recv()).await {
            Ok(Some(())) => Ok(()),
            Ok(None) => Err(ChannelError::PeerGone),
            Err(_) => Err(ChannelError::Timeout),
        }
    }
}

impl Default for MoveChannel {
    fn default() -> Self {
        Self::new()
    }
}

//! Reply destinations.
//!
//! A [`Mailbox`] is the addressable identity a request names as its reply
//! destination; the matching [`Inbox`] is held by the caller. Delivery never
//! blocks the worker: the channel is unbounded.

use crate::models::Reply;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Creates a connected mailbox/inbox pair.
#[must_use]
pub fn mailbox() -> (Mailbox, Inbox) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let id = NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed);
    (Mailbox { id, sender }, Inbox { id, receiver })
}

/// Sending side of a reply channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Mailbox {
    id: u64,
    sender: mpsc::UnboundedSender<Reply>,
}

impl Mailbox {
    /// Process-unique identity of this mailbox.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once the inbox has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Delivers a reply.
    ///
    /// Hands the reply back when the inbox is gone so the caller can decide
    /// what to release.
    pub(crate) fn deliver(&self, reply: Reply) -> std::result::Result<(), Reply> {
        self.sender.send(reply).map_err(|err| err.0)
    }
}

/// Receiving side of a reply channel.
#[derive(Debug)]
pub struct Inbox {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Reply>,
}

impl Inbox {
    /// Identity of the paired mailbox.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next reply.
    ///
    /// Returns `None` once every mailbox clone is dropped and the inbox is
    /// drained.
    pub async fn recv(&mut self) -> Option<Reply> {
        self.receiver.recv().await
    }

    /// Blocks the current thread until the next reply arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Reply> {
        self.receiver.blocking_recv()
    }

    /// Returns the next reply if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Reply> {
        self.receiver.try_recv().ok()
    }

    /// Number of replies waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if no replies are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

//! Unbounded multi-producer, single-consumer command queue.
//!
//! Producers push from any thread and never block. The owning worker pops
//! and blocks while the queue is empty. Items come out in exactly the order
//! they went in.

use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// FIFO queue shared between producers and one consumer.
pub struct CommandQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> CommandQueue<T> {
    /// Creates an empty, open queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandPushFailed`] if the queue storage cannot grow
    /// or the queue has been closed. The item is dropped in both cases.
    pub fn push(&self, item: T) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::CommandPushFailed("queue is closed".to_string()));
        }
        state
            .items
            .try_reserve(1)
            .map_err(|e| Error::CommandPushFailed(e.to_string()))?;
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Appends an item even if the queue is closed.
    ///
    /// Used for the terminal stop command, which must reach a worker that
    /// may already be winding down.
    pub(crate) fn push_unchecked(&self, item: T) {
        let mut state = self.lock();
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
    }

    /// Removes the head item, blocking until one is available.
    pub fn pop(&self) -> T {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return item;
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => {
                    tracing::warn!("command queue mutex was poisoned while waiting, recovering");
                    metrics::counter!("courier_queue_poison_recovery_total").increment(1);
                    poisoned.into_inner()
                },
            };
        }
    }

    /// Rejects all further [`push`](Self::push) calls.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Acquires the state lock, recovering from poison.
    ///
    /// Every critical section only moves items in or out of the deque, so a
    /// panic elsewhere cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("command queue mutex was poisoned, recovering");
                metrics::counter!("courier_queue_poison_recovery_total").increment(1);
                poisoned.into_inner()
            },
        }
    }
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

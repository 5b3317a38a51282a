//! Reusable write tasks.
//!
//! Every synchronous send schedules one [`WriteTask`] on the channel's [`EventLoop`](crate::event_loop::EventLoop).
//! The boxed slot backing a task is taken from a [`WriteTaskPool`] and returned to it as soon as the task has handed
//! its message to the channel, so a connection under steady load stops allocating for its writes.
//!
//! A slot is owned by exactly one task at a time. Checkout moves it out of the pool and checkin moves it back after
//! every field was cleared, so no reference to a previous channel, message or listener survives into the next use.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use tracing::{trace, warn};

use crate::{
    channel::{Channel, WritePromise},
    error::ConnectionError,
    message::WireMessage,
    throttle::BackpressureGate,
};

#[derive(Default)]
struct WriteSlot {
    channel: Option<Arc<dyn Channel>>,
    message: Option<WireMessage>,
    promise: Option<WritePromise>,
}

impl WriteSlot {
    fn is_clear(&self) -> bool {
        self.channel.is_none() && self.message.is_none() && self.promise.is_none()
    }
}

/// A bounded free-list of write task slots.
pub struct WriteTaskPool {
    free: Mutex<Vec<Box<WriteSlot>>>,
    capacity: usize,
    allocated: AtomicUsize,
}

impl WriteTaskPool {
    /// Creates a pool retaining at most `capacity` idle slots.
    pub fn new(capacity: usize) -> Self {
        WriteTaskPool {
            free: Mutex::new(Vec::with_capacity(capacity.min(64))),
            capacity,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Number of idle slots ready for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total number of slots ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Maximum number of idle slots retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn checkout(&self) -> Box<WriteSlot> {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match reused {
            Some(slot) => slot,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        }
    }

    fn checkin(&self, slot: Box<WriteSlot>) {
        debug_assert!(slot.is_clear(), "write slot returned to pool while in use");
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(slot);
        } else {
            trace!(capacity = self.capacity, "write task pool full, dropping slot");
        }
    }
}

impl fmt::Debug for WriteTaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTaskPool")
            .field("idle", &self.idle())
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// A single write waiting to be performed on a channel's event loop.
pub struct WriteTask {
    slot: Option<Box<WriteSlot>>,
    pool: Arc<WriteTaskPool>,
}

impl WriteTask {
    /// Checks a slot out of `pool` and binds it to `channel` and `message`.
    ///
    /// The bound promise releases the message's bytes back to `gate` when the write completes. If the write fails,
    /// the failure is fired into the channel's error path and the channel is closed.
    pub fn checkout(
        pool: &Arc<WriteTaskPool>,
        channel: Arc<dyn Channel>,
        message: WireMessage,
        gate: Arc<BackpressureGate>,
    ) -> Self {
        let mut slot = pool.checkout();
        let bytes = message.data_length();
        let is_append = message.is_append();

        slot.promise = Some(WritePromise::new({
            let channel = channel.clone();
            move |res| {
                if is_append {
                    gate.release(bytes);
                }
                if let Err(err) = res {
                    let err = ConnectionError::WriteFailed(err);
                    warn!(%err, "write failed, closing channel");
                    channel.fire_exception_caught(&err);
                    channel.close();
                }
            }
        }));
        slot.channel = Some(channel);
        slot.message = Some(message);

        WriteTask {
            slot: Some(slot),
            pool: pool.clone(),
        }
    }

    /// Hands the message to the channel.
    ///
    /// Must be called on the channel's event loop. The slot goes back to the pool once the channel's `write` call
    /// returns, which is before the write itself completes.
    pub fn run(mut self) {
        if let Some(slot) = self.slot.as_mut() {
            if let (Some(channel), Some(message), Some(promise)) =
                (slot.channel.take(), slot.message.take(), slot.promise.take())
            {
                channel.write(message, promise);
            }
        }
    }

    /// Recycles the task without writing and without notifying its promise.
    pub fn discard(mut self) {
        if let Some(slot) = self.slot.as_mut() {
            if let Some(promise) = slot.promise.take() {
                promise.disarm();
            }
        }
    }

    /// The message length accounted against the backpressure gate, if any message is still bound.
    pub fn data_length(&self) -> Option<usize> {
        self.slot
            .as_ref()
            .and_then(|slot| slot.message.as_ref())
            .map(WireMessage::data_length)
    }
}

impl Drop for WriteTask {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            // A task dropped before running fails its promise here.
            drop(slot.promise.take());
            slot.message = None;
            slot.channel = None;
            self.pool.checkin(slot);
        }
    }
}

impl fmt::Debug for WriteTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self
            .slot
            .as_ref()
            .and_then(|slot| slot.message.as_ref())
            .map(WireMessage::message_type);
        f.debug_struct("WriteTask")
            .field("message", &message)
            .finish()
    }
}

//! The transport seen from a client connection.
//!
//! A [`Channel`] is owned by the flow multiplexer and shared by every flow of one physical connection. Writes are
//! handed to it together with a [`WritePromise`], a one-shot listener the channel completes once the bytes have
//! been written or the write has failed.

use std::fmt;

use crate::{
    error::{ConnectionError, TransportError, WriteResult},
    event_loop::EventLoop,
    message::WireMessage,
};

/// The underlying bidirectional transport used by a flow.
///
/// All methods may be called from any thread. Implementations queue writes internally and only put bytes on the
/// socket when flushed.
pub trait Channel: fmt::Debug + Send + Sync + 'static {
    /// The sequential execution context that owns this channel's writes.
    fn event_loop(&self) -> &EventLoop;

    /// Queues a message for writing without flushing it.
    ///
    /// The channel must eventually complete `promise`, or drop it.
    fn write(&self, message: WireMessage, promise: WritePromise);

    /// Flushes all queued writes to the socket.
    fn flush(&self);

    /// Queues a message and flushes immediately.
    fn write_and_flush(&self, message: WireMessage, promise: WritePromise) {
        self.write(message, promise);
        self.flush();
    }

    /// Propagates a failure into the channel's error handling path.
    fn fire_exception_caught(&self, error: &ConnectionError);

    /// Forcibly closes the channel, failing any pending writes.
    fn close(&self);
}

type Listener = Box<dyn FnOnce(WriteResult) + Send + 'static>;

/// A one-shot completion listener for a single write.
///
/// The listener runs on whichever thread completes the promise, so it must be cheap and must not block. A promise
/// which is dropped without being completed is failed with [`TransportError::Abandoned`], guaranteeing the listener
/// runs exactly once.
#[must_use = "the channel must complete the write promise"]
pub struct WritePromise {
    listener: Option<Listener>,
}

impl WritePromise {
    /// Creates a promise notifying `listener` on completion.
    pub fn new<F>(listener: F) -> Self
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        WritePromise {
            listener: Some(Box::new(listener)),
        }
    }

    /// Completes the write with the given outcome.
    pub fn complete(mut self, result: WriteResult) {
        self.notify(result);
    }

    /// Marks the write as successful.
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// Marks the write as failed.
    pub fn fail(self, err: TransportError) {
        self.complete(Err(err));
    }

    /// Drops the listener without notifying it.
    ///
    /// Used when a write is discarded before it was ever handed to a channel.
    pub(crate) fn disarm(mut self) {
        self.listener = None;
    }

    fn notify(&mut self, result: WriteResult) {
        if let Some(listener) = self.listener.take() {
            listener(result);
        }
    }
}

impl Drop for WritePromise {
    fn drop(&mut self) {
        self.notify(Err(TransportError::Abandoned));
    }
}

impl fmt::Debug for WritePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePromise")
            .field("pending", &self.listener.is_some())
            .finish()
    }
}

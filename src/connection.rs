//! A client connection bound to one flow of a multiplexed transport.
//!
//! [`ClientConnection`] is the handle producers use to send commands and appends to a segment store. It never
//! touches the socket itself: synchronous sends schedule a [`WriteTask`] on the channel's event loop, asynchronous
//! sends hand the message to the channel together with a completion listener.
//!
//! # Backpressure
//!
//! Append data is throttled by a [`BackpressureGate`] sized by
//! [`ConnectionConfig::max_outstanding_bytes`]. [`send_append`](ClientConnection::send_append) schedules the write
//! first and then waits for permits matching the payload length. Permits come back when the transport completes
//! the write, successfully or not. Control commands are never throttled.
//!
//! # Closing
//!
//! [`close`](ClientConnection::close) is idempotent. Once it returned, every send fails with
//! [`ConnectionError::Closed`], and producers waiting on the byte budget are woken with the same error.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use tracing::{debug, error, warn};

use crate::{
    channel::{Channel, WritePromise},
    combiner::PromiseCombiner,
    config::ConnectionConfig,
    error::ConnectionError,
    flow::FlowHandler,
    message::{Append, WireCommand, WireMessage},
    metrics::{segment_tags, CLIENT_APPEND_LATENCY},
    task::{WriteTask, WriteTaskPool},
    throttle::BackpressureGate,
};

/// A logical connection for one flow.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use flowconn::{ClientConnection, FlowHandler, message::{Append, KeepAlive}};
/// use uuid::Uuid;
///
/// async fn produce(flow: Arc<dyn FlowHandler>) -> Result<(), flowconn::error::ConnectionError> {
///     let connection = ClientConnection::new("segment-store-1:12345", 1, flow);
///
///     connection.send(KeepAlive)?;
///     connection
///         .send_append(Append::new("scope/stream/0", Uuid::new_v4(), 0, &b"event"[..]))
///         .await?;
///     connection.send_async(KeepAlive, |res| {
///         if let Err(err) = res {
///             eprintln!("keep-alive failed: {err}");
///         }
///     });
///
///     connection.close();
///     Ok(())
/// }
/// ```
pub struct ClientConnection {
    connection_name: String,
    flow_id: u32,
    flow: Arc<dyn FlowHandler>,
    closed: AtomicBool,
    throttle: Arc<BackpressureGate>,
    tasks: Arc<WriteTaskPool>,
}

impl ClientConnection {
    /// Creates a connection with the default [`ConnectionConfig`].
    pub fn new(connection_name: impl Into<String>, flow_id: u32, flow: Arc<dyn FlowHandler>) -> Self {
        ClientConnection::with_config(connection_name, flow_id, flow, ConnectionConfig::default())
    }

    /// Creates a connection with an explicit configuration.
    pub fn with_config(
        connection_name: impl Into<String>,
        flow_id: u32,
        flow: Arc<dyn FlowHandler>,
        config: ConnectionConfig,
    ) -> Self {
        ClientConnection {
            connection_name: connection_name.into(),
            flow_id,
            flow,
            closed: AtomicBool::new(false),
            throttle: Arc::new(BackpressureGate::new(config.max_outstanding_bytes)),
            tasks: Arc::new(WriteTaskPool::new(config.task_pool_capacity)),
        }
    }

    /// The name of the endpoint this connection talks to.
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// The id of the flow this connection is bound to.
    pub fn flow_id(&self) -> u32 {
        self.flow_id
    }

    /// The flow handler owning the transport.
    pub fn flow_handler(&self) -> &Arc<dyn FlowHandler> {
        &self.flow
    }

    /// The byte budget throttling appends.
    pub fn throttle(&self) -> &BackpressureGate {
        &self.throttle
    }

    /// The pool backing this connection's write tasks.
    pub fn task_pool(&self) -> &WriteTaskPool {
        &self.tasks
    }

    /// Returns `true` once [`close`](ClientConnection::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends a control command.
    ///
    /// The command is scheduled on the channel's event loop and this returns as soon as it is queued, before it is
    /// flushed. Commands are not subject to backpressure.
    pub fn send<C>(&self, command: C) -> Result<(), ConnectionError>
    where
        C: WireCommand,
    {
        self.check_closed()?;
        self.flow.set_recent_message();
        self.write(WireMessage::Command(Box::new(command)))
    }

    /// Sends an append, waiting for room in the byte budget.
    ///
    /// The write is scheduled before waiting, so concurrent producers hit the wire in the order they scheduled,
    /// not the order in which they obtained permits. There is no timeout; the wait ends when completed writes release
    /// enough bytes, or fails when the connection is closed.
    ///
    /// Dropping the future while it waits leaves the write scheduled. Its bytes are then owed to the gate and settled
    /// when the write completes.
    ///
    /// When the flow has a metric notifier configured, the time spent in this call is recorded as
    /// [`CLIENT_APPEND_LATENCY`].
    pub async fn send_append(&self, append: Append) -> Result<(), ConnectionError> {
        let started = Instant::now();
        self.check_closed()?;
        self.flow.set_recent_message();

        let notifier = self.flow.metric_notifier();
        let tags = if notifier.is_noop() {
            None
        } else {
            Some(segment_tags(&append.segment, &append.writer_id.to_string()))
        };

        let bytes = append.data_length();
        self.write(WireMessage::Append(append))?;
        self.throttle
            .acquire(bytes)
            .await
            .map_err(|_| self.closed_error())?;

        if let Some(tags) = tags {
            notifier.update_success_metric(CLIENT_APPEND_LATENCY, &tags, started.elapsed());
        }

        Ok(())
    }

    /// Blocking variant of [`send_append`](ClientConnection::send_append) for callers outside of an async context.
    ///
    /// Parks the calling thread while waiting for room in the byte budget. Must not be called from a thread driving
    /// the channel's event loop.
    pub fn blocking_send_append(&self, append: Append) -> Result<(), ConnectionError> {
        futures::executor::block_on(self.send_append(append))
    }

    /// Writes and flushes a command immediately, reporting the outcome to `callback`.
    ///
    /// Never fails directly. If the connection is closed or no channel is available, `callback` runs before this
    /// returns. Otherwise it runs on the transport's completion context once the write finished, so it must not
    /// block.
    pub fn send_async<C, F>(&self, command: C, callback: F)
    where
        C: WireCommand,
        F: FnOnce(Result<(), ConnectionError>) + Send + 'static,
    {
        let channel = match self
            .check_closed()
            .and_then(|()| {
                self.flow.set_recent_message();
                self.flow.channel()
            }) {
            Ok(channel) => channel,
            Err(err) => {
                debug!(
                    connection_name = %self.connection_name,
                    flow_id = self.flow_id,
                    command = command.command_type(),
                    %err,
                    "failed to write command"
                );
                return callback(Err(err));
            }
        };

        debug!(
            connection_name = %self.connection_name,
            flow_id = self.flow_id,
            ?command,
            ?channel,
            "write and flush command"
        );
        channel.write_and_flush(
            WireMessage::Command(Box::new(command)),
            WritePromise::new(move |res| callback(res.map_err(ConnectionError::from))),
        );
    }

    /// Writes a batch of appends with a single flush, reporting the combined outcome to `callback`.
    ///
    /// `callback` runs exactly once: with `Ok` if every write succeeded, otherwise with the first failure reported
    /// by the transport. An empty batch completes immediately without touching the channel. Batches bypass the
    /// byte budget.
    pub fn send_batch_async<F>(&self, appends: Vec<Append>, callback: F)
    where
        F: FnOnce(Result<(), ConnectionError>) + Send + 'static,
    {
        let channel = match self
            .check_closed()
            .and_then(|()| {
                self.flow.set_recent_message();
                self.flow.channel()
            }) {
            Ok(channel) => channel,
            Err(err) => {
                debug!(
                    connection_name = %self.connection_name,
                    flow_id = self.flow_id,
                    %err,
                    "failed to write append batch"
                );
                return callback(Err(ConnectionError::NotEstablished {
                    connection_name: self.connection_name.clone(),
                }));
            }
        };

        if appends.is_empty() {
            return callback(Ok(()));
        }

        let mut combiner = PromiseCombiner::new();
        for append in appends {
            channel.write(WireMessage::Append(append), combiner.add());
        }
        channel.flush();
        combiner.finish(move |res| callback(res.map_err(ConnectionError::from)));
    }

    /// Closes the connection and releases its flow.
    ///
    /// Only the first call has any effect.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.throttle.close();
            self.flow.close_flow(self);
        }
    }

    fn write(&self, message: WireMessage) -> Result<(), ConnectionError> {
        let channel: Arc<dyn Channel> = self.flow.channel()?;
        let task = WriteTask::checkout(&self.tasks, channel.clone(), message, self.throttle.clone());
        channel.event_loop().execute(task).map_err(|rejected| {
            warn!(
                connection_name = %self.connection_name,
                flow_id = self.flow_id,
                event_loop = channel.event_loop().name(),
                "event loop rejected write"
            );
            rejected.0.discard();
            ConnectionError::Rejected
        })
    }

    fn check_closed(&self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            error!(
                connection_name = %self.connection_name,
                flow_id = self.flow_id,
                "client connection is already closed"
            );
            return Err(self.closed_error());
        }

        Ok(())
    }

    fn closed_error(&self) -> ConnectionError {
        ConnectionError::Closed {
            flow_id: self.flow_id,
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("connection_name", &self.connection_name)
            .field("flow_id", &self.flow_id)
            .field("closed", &self.is_closed())
            .field("throttle", &self.throttle)
            .finish()
    }
}

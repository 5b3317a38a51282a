//! Defines error handling constructs for flowconn.
//!
//! Two layers of errors exist. [`TransportError`] is what a [`Channel`](crate::channel::Channel) reports when it
//! completes a [`WritePromise`](crate::channel::WritePromise), and [`ConnectionError`] is what callers of a
//! [`ClientConnection`](crate::connection::ClientConnection) observe, either returned directly or delivered to a
//! completion callback.

use std::{io, sync::Arc};

use thiserror::Error;

/// Result type delivered to write promise listeners.
pub type WriteResult = Result<(), TransportError>;

/// A failure reported by the underlying transport for a single write.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The channel was closed before or while the write was being performed.
    #[error("channel closed")]
    ChannelClosed,
    /// The write was dropped before the transport reported an outcome for it.
    #[error("write abandoned before completion")]
    Abandoned,
    /// An I/O error from the socket.
    #[error(transparent)]
    Io(Arc<io::Error>),
    /// Any other transport specific failure.
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Error returned by the send operations of a client connection.
#[derive(Clone, Debug, Error)]
pub enum ConnectionError {
    /// A send was attempted after the connection was closed.
    #[error("client connection already closed for flow {flow_id}")]
    Closed {
        /// The flow id of the closed connection.
        flow_id: u32,
    },
    /// The flow could not produce a usable channel.
    #[error("connection to {connection_name} is not established")]
    NotEstablished {
        /// Name of the connection which has no channel.
        connection_name: String,
    },
    /// The transport failed a write, or failed while the write was pending.
    #[error("connection failed: {0}")]
    WriteFailed(#[from] TransportError),
    /// The channel's event loop is no longer accepting work.
    #[error("event loop rejected the write")]
    Rejected,
}

impl ConnectionError {
    /// Returns `true` if the error was caused by sending on a closed connection.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionError::Closed { .. })
    }
}

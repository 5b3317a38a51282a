//! Outbound messages written on a client connection.
//!
//! A [`WireMessage`] is either a control [`WireCommand`], which is never throttled, or an [`Append`] carrying event
//! data for a segment. Appends are accounted against the connection's byte budget by their
//! [`data_length`](Append::data_length).
//!
//! Encoding messages onto the wire is left to the [`Channel`](crate::channel::Channel) implementation.

use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

/// A control command sent to the server.
///
/// # Example
///
/// ```
/// use flowconn::message::WireCommand;
///
/// #[derive(Debug)]
/// struct SetupAppend {
///     request_id: i64,
///     segment: String,
/// }
///
/// impl WireCommand for SetupAppend {
///     fn command_type(&self) -> &'static str {
///         "setup_append"
///     }
/// }
/// ```
pub trait WireCommand: fmt::Debug + Send + Sync + 'static {
    /// A short, stable name for the command, used in logs.
    fn command_type(&self) -> &'static str;
}

/// Keep-alive command sent periodically on idle flows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeepAlive;

impl WireCommand for KeepAlive {
    fn command_type(&self) -> &'static str {
        "keep_alive"
    }
}

/// Event data appended to a segment by a writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Append {
    /// Fully qualified name of the target segment.
    pub segment: String,
    /// The writer which produced the data.
    pub writer_id: Uuid,
    /// Event number of the last event contained in `data`.
    pub event_number: i64,
    /// Number of events contained in `data`.
    pub event_count: i32,
    /// Serialized event payload.
    pub data: Bytes,
    /// Request id used to correlate the server's acknowledgement.
    pub request_id: i64,
}

impl Append {
    /// Creates an append holding a single event.
    pub fn new(
        segment: impl Into<String>,
        writer_id: Uuid,
        event_number: i64,
        data: impl Into<Bytes>,
    ) -> Self {
        Append {
            segment: segment.into(),
            writer_id,
            event_number,
            event_count: 1,
            data: data.into(),
            request_id: event_number,
        }
    }

    /// Sets the number of events batched in this append.
    pub fn with_event_count(mut self, event_count: i32) -> Self {
        self.event_count = event_count;
        self
    }

    /// Length of the payload in bytes.
    #[inline]
    pub fn data_length(&self) -> usize {
        self.data.len()
    }
}

/// A message handed to the transport.
#[derive(Debug)]
pub enum WireMessage {
    /// A control command.
    Command(Box<dyn WireCommand>),
    /// A data append.
    Append(Append),
}

impl WireMessage {
    /// Number of bytes this message counts against the backpressure budget.
    ///
    /// Commands are control traffic and always count as zero.
    #[inline]
    pub fn data_length(&self) -> usize {
        match self {
            WireMessage::Command(_) => 0,
            WireMessage::Append(append) => append.data_length(),
        }
    }

    /// Returns `true` for appends.
    #[inline]
    pub fn is_append(&self) -> bool {
        matches!(self, WireMessage::Append(_))
    }

    /// Returns the append if this message is one.
    pub fn as_append(&self) -> Option<&Append> {
        match self {
            WireMessage::Append(append) => Some(append),
            WireMessage::Command(_) => None,
        }
    }

    /// Short name of the message kind, used in logs.
    pub fn message_type(&self) -> &'static str {
        match self {
            WireMessage::Command(cmd) => cmd.command_type(),
            WireMessage::Append(_) => "append",
        }
    }
}

impl From<Append> for WireMessage {
    fn from(append: Append) -> Self {
        WireMessage::Append(append)
    }
}

impl<C: WireCommand> From<Box<C>> for WireMessage {
    fn from(cmd: Box<C>) -> Self {
        WireMessage::Command(cmd)
    }
}

//! The flow multiplexer as seen from a single client connection.

use std::sync::Arc;

use crate::{
    channel::Channel, connection::ClientConnection, error::ConnectionError,
    metrics::MetricNotifier,
};

/// Owns the physical connection shared by many flows and routes their traffic.
///
/// A [`ClientConnection`] only ever talks to the transport through its flow handler.
pub trait FlowHandler: Send + Sync + 'static {
    /// Returns the channel backing this flow.
    ///
    /// Fails if the underlying connection was never established or is gone.
    fn channel(&self) -> Result<Arc<dyn Channel>, ConnectionError>;

    /// Records that the flow just saw outbound traffic, deferring keep-alives and idle timeouts.
    fn set_recent_message(&self);

    /// The metric sink for this flow.
    fn metric_notifier(&self) -> Arc<dyn MetricNotifier>;

    /// Releases the registration of `connection`'s flow.
    ///
    /// Called exactly once per connection.
    fn close_flow(&self, connection: &ClientConnection);
}

//! Connection configuration.

use serde::{Deserialize, Serialize};

/// Default byte budget for appends handed to the transport but not yet written.
///
/// Matches the largest append batch the client ever builds, so a single batch always fits.
pub const DEFAULT_MAX_OUTSTANDING_BYTES: usize = 32 * 1024;

/// Default number of idle write task slots retained per connection.
pub const DEFAULT_TASK_POOL_CAPACITY: usize = 1024;

/// Configuration for a [`ClientConnection`](crate::connection::ClientConnection).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Maximum number of append bytes outstanding on the transport before producers are throttled.
    pub max_outstanding_bytes: usize,
    /// Maximum number of idle write task slots kept for reuse.
    pub task_pool_capacity: usize,
}

impl ConnectionConfig {
    /// Sets the backpressure budget in bytes.
    pub fn with_max_outstanding_bytes(mut self, bytes: usize) -> Self {
        self.max_outstanding_bytes = bytes;
        self
    }

    /// Sets how many idle write task slots are retained.
    pub fn with_task_pool_capacity(mut self, capacity: usize) -> Self {
        self.task_pool_capacity = capacity;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_outstanding_bytes: DEFAULT_MAX_OUTSTANDING_BYTES,
            task_pool_capacity: DEFAULT_TASK_POOL_CAPACITY,
        }
    }
}

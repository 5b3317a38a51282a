//! Optional client side metrics.
//!
//! Measuring an append costs a clock read and a handful of string allocations for its tags, so connections only do
//! it when the flow's [`MetricNotifier`] is not the [`NoOpMetricNotifier`].

use std::{fmt, time::Duration};

/// Latency of a synchronous append, from entering the call until it returned.
pub const CLIENT_APPEND_LATENCY: &str = "segmentstore.client.append_latency_ms";

const TAG_SCOPE: &str = "scope";
const TAG_STREAM: &str = "stream";
const TAG_SEGMENT: &str = "segment";
const TAG_EPOCH: &str = "epoch";
const TAG_WRITER: &str = "writer";

const EPOCH_DELIMITER: &str = ".#epoch.";
const DEFAULT_SCOPE_OR_STREAM: &str = "default";

/// Metric tags as `(key, value)` pairs.
pub type Tags = Vec<(&'static str, String)>;

/// A sink for client metrics.
pub trait MetricNotifier: fmt::Debug + Send + Sync + 'static {
    /// Records a successful operation that took `elapsed`.
    fn update_success_metric(&self, metric: &'static str, tags: &[(&'static str, String)], elapsed: Duration);

    /// Returns `true` if this notifier discards everything it is given.
    ///
    /// Callers skip measuring entirely when this is `true`.
    fn is_noop(&self) -> bool {
        false
    }
}

/// The default notifier, which records nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoOpMetricNotifier;

impl MetricNotifier for NoOpMetricNotifier {
    fn update_success_metric(&self, _metric: &'static str, _tags: &[(&'static str, String)], _elapsed: Duration) {}

    fn is_noop(&self) -> bool {
        true
    }
}

/// Builds the tags identifying a segment and a writer.
///
/// Qualified segment names have the form `scope/stream/segment`, where the segment part may carry an
/// `.#epoch.<n>` suffix. Missing scope or stream parts are tagged as `default`, a missing epoch as `0`.
///
/// # Example
///
/// ```
/// use flowconn::metrics::segment_tags;
///
/// let tags = segment_tags("examples/orders/3.#epoch.2", "writer-1");
/// assert_eq!(tags[0], ("scope", "examples".to_string()));
/// assert_eq!(tags[2], ("segment", "3".to_string()));
/// assert_eq!(tags[3], ("epoch", "2".to_string()));
/// ```
pub fn segment_tags(qualified_segment: &str, writer_id: &str) -> Tags {
    let mut parts = qualified_segment.rsplitn(3, '/');
    let last = parts.next().unwrap_or_default();
    let stream = parts.next().unwrap_or(DEFAULT_SCOPE_OR_STREAM);
    let scope = parts.next().unwrap_or(DEFAULT_SCOPE_OR_STREAM);

    let (segment, epoch) = match last.split_once(EPOCH_DELIMITER) {
        Some((segment, epoch)) => (segment, epoch),
        None => (last, "0"),
    };

    vec![
        (TAG_SCOPE, scope.to_string()),
        (TAG_STREAM, stream.to_string()),
        (TAG_SEGMENT, segment.to_string()),
        (TAG_EPOCH, epoch.to_string()),
        (TAG_WRITER, writer_id.to_string()),
    ]
}

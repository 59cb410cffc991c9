//! Metric helpers for `docwire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Without the
//! `metrics` feature the helpers compile to no-ops.

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "docwire_connections_active";
/// Name of the counter tracking frames read or written.
pub const FRAMES_TOTAL: &str = "docwire_frames_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "docwire_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from the server.
    Inbound,
    /// Frames sent to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "label only used by metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Category label attached to [`ERRORS_TOTAL`].
#[derive(Clone, Copy, Debug)]
pub enum ErrorKind {
    /// A frame length prefix was rejected.
    Framing,
    /// A complete frame failed to decode.
    Decode,
    /// The transport failed, timed out or closed.
    Network,
}

impl ErrorKind {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "label only used by metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Framing => "framing",
            ErrorKind::Decode => "decode",
            ErrorKind::Network => "network",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "no-op without metrics"))]
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
}

/// Record an error occurrence.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "no-op without metrics"))]
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    metrics::counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
}

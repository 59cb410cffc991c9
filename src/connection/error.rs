//! Error types for connections.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use super::ConnectionId;

/// Coarse classification of a [`NetworkError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// The transport reported an I/O failure.
    Io,
    /// The transport stayed idle past the socket timeout.
    Timeout,
    /// The transport was closed.
    Closed,
}

/// Transport-level failure. Always terminal for the connection.
///
/// The error is cloneable so it can be delivered both as an event and to
/// every pending request.
#[derive(Clone, Debug, Error)]
pub enum NetworkError {
    /// The transport reported an I/O failure.
    #[error("connection {id} to {address} failed: {source}")]
    Io {
        /// Connection that failed.
        id: ConnectionId,
        /// Remote `host:port`.
        address: String,
        /// Underlying transport error.
        #[source]
        source: Arc<io::Error>,
    },

    /// No data arrived within the socket timeout.
    #[error("connection {id} to {address} timed out after {after:?}")]
    Timeout {
        /// Connection that timed out.
        id: ConnectionId,
        /// Remote `host:port`.
        address: String,
        /// Idle period that elapsed.
        after: Duration,
    },

    /// The transport was closed by the peer or locally.
    #[error("connection {id} to {address} closed")]
    Closed {
        /// Connection that closed.
        id: ConnectionId,
        /// Remote `host:port`.
        address: String,
    },
}

impl NetworkError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> NetworkErrorKind {
        match self {
            Self::Io { .. } => NetworkErrorKind::Io,
            Self::Timeout { .. } => NetworkErrorKind::Timeout,
            Self::Closed { .. } => NetworkErrorKind::Closed,
        }
    }

    /// Connection the error belongs to.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Io { id, .. } | Self::Timeout { id, .. } | Self::Closed { id, .. } => *id,
        }
    }
}

/// Errors raised while constructing, using or destroying a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No document codec was supplied to the builder.
    #[error("a document codec is required to construct a connection")]
    MissingDocumentCodec,

    /// Resolving or connecting to the remote endpoint failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Remote `host:port`.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The connection attempt did not complete within `connection_timeout`.
    #[error("connecting to {address} timed out after {after:?}")]
    ConnectTimeout {
        /// Remote `host:port`.
        address: String,
        /// Configured connection timeout.
        after: Duration,
    },

    /// A request frame was too short to carry a header.
    #[error("request frame of {len} bytes has no header")]
    MalformedRequest {
        /// Length of the offending frame.
        len: usize,
    },

    /// The transport failed or is closed.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

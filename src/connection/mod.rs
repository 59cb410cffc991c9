//! Connections to a document database server.
//!
//! A [`Connection`] owns one transport for its whole life. The transport is
//! split at construction into a reader task, which reassembles and decodes
//! inbound frames, and a writer task, which serialises outbound buffers.
//! Everything observable is reported as a [`ConnectionEvent`] on the channel
//! supplied to the [`ConnectionBuilder`].
//!
//! ```text
//! Created ──build──▶ Connected ──destroy / error / timeout / close──▶ Destroyed
//! ```

mod builder;
mod counter;
mod error;
pub mod event;
mod id;
mod options;
mod reader;
mod socket;
mod work;
mod writer;

use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
pub use builder::ConnectionBuilder;
pub use counter::active_connection_count;
pub use error::{ConnectionError, NetworkError, NetworkErrorKind};
pub use event::{ConnectionEvent, ConnectionEvents, EventKind, EventSink};
pub use id::ConnectionId;
pub use options::{ConnectionOptions, DEFAULT_PORT};
pub use socket::SocketOptions;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};
pub use work::PendingResponse;
use work::WorkQueue;
use writer::WriteCommand;

use crate::{
    frame::FrameHeader,
    metrics::{self, ErrorKind},
    registry::ConnectionRegistry,
};

/// How [`Connection::destroy`] tears down the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Drop the transport immediately instead of flushing pending writes and
    /// half-closing.
    pub force: bool,
}

impl DestroyOptions {
    /// Options for an abrupt teardown.
    #[must_use]
    pub const fn forced() -> Self { Self { force: true } }
}

/// Why the transport stopped.
#[derive(Debug)]
pub(crate) enum Terminal {
    Closed,
    TimedOut(Duration),
    Failed(io::Error),
}

/// State shared by a connection's handles and its tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    id: ConnectionId,
    address: String,
    fingerprint: String,
    options: ConnectionOptions,
    commands: mpsc::UnboundedSender<WriteCommand>,
    cancel: CancellationToken,
    /// Child of `cancel`; stops the reader on its own during an orderly destroy.
    reading: CancellationToken,
    closed: AtomicBool,
    destroyed: AtomicBool,
    timeout: watch::Sender<Option<Duration>>,
    work: WorkQueue,
    registry: Option<Arc<ConnectionRegistry>>,
    events: EventSink,
    span: Span,
}

impl Shared {
    fn emit(&self, kind: EventKind) { self.events.emit(self.id, kind); }

    fn unregister(&self) {
        if let Some(registry) = &self.registry {
            registry.remove(self.id);
        }
    }

    fn closed_error(&self) -> NetworkError {
        NetworkError::Closed {
            id: self.id,
            address: self.address.clone(),
        }
    }

    /// Handle the end of the transport. Runs at most once, and never after
    /// [`Connection::destroy`].
    fn terminate(&self, cause: Terminal) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.destroyed.store(true, Ordering::Release);
        self.unregister();
        self.cancel.cancel();

        let (error, kind): (NetworkError, fn(NetworkError) -> EventKind) = match cause {
            Terminal::Closed => {
                debug!("transport closed by peer");
                (self.closed_error(), EventKind::Close)
            }
            Terminal::TimedOut(after) => {
                warn!(?after, "transport idle timeout");
                (
                    NetworkError::Timeout {
                        id: self.id,
                        address: self.address.clone(),
                        after,
                    },
                    EventKind::Timeout,
                )
            }
            Terminal::Failed(source) => {
                warn!(error = %source, "transport failed");
                (
                    NetworkError::Io {
                        id: self.id,
                        address: self.address.clone(),
                        source: Arc::new(source),
                    },
                    EventKind::Error,
                )
            }
        };
        metrics::inc_errors(ErrorKind::Network);
        self.work.fail_all(&error);
        self.emit(kind(error));
    }

    async fn shutdown_writer(&self) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(WriteCommand::Shutdown(ack)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }
}

/// Handle to one physical connection.
///
/// Handles are cheap to clone and all refer to the same transport.
///
/// # Examples
///
/// ```no_run
/// use docwire::{
///     connection::{ConnectionBuilder, ConnectionOptions, DestroyOptions, EventKind, event},
///     document::LengthPrefixedDocuments,
/// };
///
/// # async fn demo() -> Result<(), docwire::connection::ConnectionError> {
/// let (sink, mut events) = event::channel();
/// let connection = ConnectionBuilder::new(ConnectionOptions::default())
///     .document_codec(LengthPrefixedDocuments)
///     .connect(sink)
///     .await?;
///
/// while let Some(event) = events.recv().await {
///     if let EventKind::Message(message) = event.kind {
///         println!("{} answered {}", connection, message.response_to());
///         break;
///     }
/// }
/// connection.destroy(DestroyOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self { Self { shared } }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<Shared> { Arc::downgrade(&self.shared) }

    /// Process-unique identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.shared.id }

    /// Remote endpoint as `host:port`.
    #[must_use]
    pub fn address(&self) -> &str { &self.shared.address }

    /// Remote host.
    #[must_use]
    pub fn host(&self) -> &str { &self.shared.options.host }

    /// Remote port.
    #[must_use]
    pub fn port(&self) -> u16 { self.shared.options.port }

    /// Stable SHA-256 hex digest of the remote endpoint.
    #[must_use]
    pub fn fingerprint(&self) -> &str { &self.shared.fingerprint }

    /// Options the connection was built with.
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions { &self.shared.options }

    /// Returns `false` once destroyed or once the transport has closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.shared.destroyed.load(Ordering::Acquire) && !self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.shared.work.len() }

    /// Queue `frame` for writing.
    ///
    /// Returns `false`, without side effects, when the transport is closed.
    pub fn write(&self, frame: Bytes) -> bool { self.write_batch([frame]) }

    /// Queue several buffers for writing, preserving their order.
    ///
    /// Returns `false`, without side effects, when the transport is closed.
    pub fn write_batch<I>(&self, frames: I) -> bool
    where
        I: IntoIterator<Item = Bytes>,
    {
        if !self.is_connected() {
            return false;
        }
        let frames: Vec<Bytes> = frames.into_iter().collect();
        self.shared
            .commands
            .send(WriteCommand::Frames(frames))
            .is_ok()
    }

    /// Write a request frame and wait for the message answering it.
    ///
    /// The request id is read from the frame header. The answering message
    /// is still reported as an [`EventKind::Message`] event. Dropping the
    /// returned future abandons the request.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MalformedRequest`] if `frame` is shorter
    /// than a header, or [`ConnectionError::Network`] if the transport is
    /// closed.
    pub fn send_request(&self, frame: Bytes) -> Result<PendingResponse, ConnectionError> {
        let header = FrameHeader::parse(&frame)
            .ok_or(ConnectionError::MalformedRequest { len: frame.len() })?;
        if !self.is_connected() {
            return Err(self.shared.closed_error().into());
        }
        let pending = self
            .shared
            .work
            .register(header.request_id, self.shared.closed_error());
        if !self.write(frame) {
            return Err(self.shared.closed_error().into());
        }
        Ok(pending)
    }

    /// Change the idle timeout. A zero duration disables it.
    ///
    /// The timer restarts; parse state is untouched.
    pub fn set_timeout(&self, timeout: Duration) {
        let timeout = Some(timeout).filter(|timeout| !timeout.is_zero());
        self.shared.timeout.send_replace(timeout);
    }

    /// Restore the idle timeout configured by `socket_timeout`.
    pub fn reset_timeout(&self) {
        self.shared
            .timeout
            .send_replace(self.shared.options.idle_timeout());
    }

    /// Destroy the connection. Subsequent calls are no-ops.
    ///
    /// The connection leaves its registry first. An orderly teardown flushes
    /// queued writes and shuts down the write side after reading stops;
    /// [`DestroyOptions::forced`] drops the transport immediately. Pending
    /// requests fail with a `Closed` error. No close event is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Network`] if flushing or shutting down the
    /// transport failed.
    pub async fn destroy(&self, options: DestroyOptions) -> Result<(), ConnectionError> {
        let shared = &self.shared;
        if shared.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        shared.unregister();
        if shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        shared.reading.cancel();
        shared.work.fail_all(&shared.closed_error());

        let result = if options.force {
            Ok(())
        } else {
            shared.shutdown_writer().await
        };
        shared.cancel.cancel();
        info!(parent: &shared.span, force = options.force, "connection destroyed");

        result.map_err(|source| {
            NetworkError::Io {
                id: shared.id,
                address: shared.address.clone(),
                source: Arc::new(source),
            }
            .into()
        })
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection {{ id: {}, address: {} }}",
            self.shared.id, self.shared.address
        )
    }
}

#[cfg(test)]
mod tests;

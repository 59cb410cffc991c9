//! Builder for configuring and establishing connections.

use std::{
    io,
    sync::{Arc, atomic::AtomicBool},
};

use sha2::{Digest, Sha256};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpSocket, TcpStream, lookup_host},
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use super::{
    Connection,
    ConnectionError,
    ConnectionId,
    ConnectionOptions,
    EventKind,
    EventSink,
    Shared,
    SocketOptions,
    reader::Reader,
    work::WorkQueue,
    writer,
};
use crate::{
    compression::{DefaultDecompressor, Decompressor},
    document::DocumentCodec,
    frame::FrameParser,
    message::MessageDecoder,
    registry::ConnectionRegistry,
};

/// Builder for [`Connection`].
///
/// A document codec is mandatory; the decompressor defaults to
/// [`DefaultDecompressor`].
///
/// # Examples
///
/// ```
/// use docwire::{
///     connection::{ConnectionBuilder, ConnectionError, ConnectionOptions, event},
///     document::LengthPrefixedDocuments,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (client, _server) = tokio::io::duplex(1024);
/// let (sink, _events) = event::channel();
///
/// let err = ConnectionBuilder::new(ConnectionOptions::default())
///     .build(client, sink.clone())
///     .expect_err("codec is required");
/// assert!(matches!(err, ConnectionError::MissingDocumentCodec));
///
/// let (client, _server) = tokio::io::duplex(1024);
/// let connection = ConnectionBuilder::new(ConnectionOptions::default())
///     .document_codec(LengthPrefixedDocuments)
///     .build(client, sink)
///     .expect("codec supplied");
/// assert!(connection.is_connected());
/// # }
/// ```
#[must_use]
pub struct ConnectionBuilder {
    options: ConnectionOptions,
    codec: Option<Arc<dyn DocumentCodec>>,
    decompressor: Option<Arc<dyn Decompressor>>,
    registry: Option<Arc<ConnectionRegistry>>,
}

impl ConnectionBuilder {
    /// Start configuring a connection with `options`.
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            codec: None,
            decompressor: None,
            registry: None,
        }
    }

    /// Set the document codec used to split response bodies.
    pub fn document_codec(mut self, codec: impl DocumentCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Set a shared document codec.
    pub fn shared_document_codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replace the decompressor used for compressed frames.
    pub fn decompressor(mut self, decompressor: impl Decompressor + 'static) -> Self {
        self.decompressor = Some(Arc::new(decompressor));
        self
    }

    /// Record the connection in `registry` for its lifetime.
    pub fn registry(mut self, registry: Arc<ConnectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Open a TCP connection to the configured endpoint and build on it.
    ///
    /// Keep-alive and `TCP_NODELAY` are applied before connecting. A zero
    /// `connection_timeout` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingDocumentCodec`] before any I/O when
    /// no codec is set, [`ConnectionError::Connect`] if resolution or the
    /// connection attempt fails, and [`ConnectionError::ConnectTimeout`] when
    /// `connection_timeout` elapses.
    pub async fn connect(self, events: EventSink) -> Result<Connection, ConnectionError> {
        if self.codec.is_none() {
            return Err(ConnectionError::MissingDocumentCodec);
        }
        let address = self.options.address();
        let span = info_span!("connection.connect", peer.addr = %address);
        let stream = open(&self.options).instrument(span).await?;
        self.build(stream, events)
    }

    /// Build a connection on an already established transport.
    ///
    /// Spawns the reader and writer tasks, so it must run inside a Tokio
    /// runtime. Emits [`EventKind::Connect`] before any other event.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingDocumentCodec`] when no document
    /// codec was supplied.
    pub fn build<S>(self, stream: S, events: EventSink) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = self.codec.ok_or(ConnectionError::MissingDocumentCodec)?;
        let options = self.options;
        let id = ConnectionId::next();
        let address = options.address();
        let span = info_span!("connection", connection.id = %id, peer.addr = %address);

        let decompressor = self
            .decompressor
            .unwrap_or_else(|| Arc::new(DefaultDecompressor::new(options.max_message_size)));
        let decoder =
            MessageDecoder::new(codec, decompressor, options.response, options.max_message_size);
        let parser = FrameParser::new(options.max_message_size);

        let (read, write) = tokio::io::split(stream);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let (timeout_tx, timeout_rx) = watch::channel(options.idle_timeout());
        let cancel = CancellationToken::new();

        let shared = Arc::new(Shared {
            id,
            fingerprint: fingerprint(&address),
            address,
            options,
            commands: commands_tx,
            reading: cancel.child_token(),
            cancel: cancel.clone(),
            closed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            timeout: timeout_tx,
            work: WorkQueue::default(),
            registry: self.registry,
            events,
            span: span.clone(),
        });
        let connection = Connection::from_shared(Arc::clone(&shared));

        shared.emit(EventKind::Connect);
        if let Some(registry) = &shared.registry {
            registry.add(id, &connection);
        }

        tokio::spawn(writer::run(write, commands_rx, cancel, fault_tx).instrument(span.clone()));
        let reader = Reader::new(shared, read, parser, decoder, timeout_rx, fault_rx);
        tokio::spawn(reader.run().instrument(span.clone()));

        info!(parent: &span, "connection established");
        Ok(connection)
    }
}

/// SHA-256 hex digest identifying an endpoint.
pub(super) fn fingerprint(address: &str) -> String {
    format!("{:x}", Sha256::digest(address.as_bytes()))
}

async fn open(options: &ConnectionOptions) -> Result<TcpStream, ConnectionError> {
    let address = options.address();
    let attempt = connect_any(&address, SocketOptions::from_options(options));
    let result = if options.connection_timeout.is_zero() {
        attempt.await
    } else {
        tokio::time::timeout(options.connection_timeout, attempt)
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                address: address.clone(),
                after: options.connection_timeout,
            })?
    };
    result.map_err(|source| ConnectionError::Connect { address, source })
}

/// Try each resolved address in turn, returning the first success.
async fn connect_any(address: &str, socket_options: SocketOptions) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in lookup_host(address).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket_options.apply(&socket)?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = Some(error),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

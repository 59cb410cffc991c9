#![doc(html_root_url = "https://docs.rs/docwire/latest")]
//! Client-side transport for a length-prefixed document database wire
//! protocol.
//!
//! The crate reassembles arbitrarily fragmented socket reads into complete
//! frames, decodes their headers, transparently decompresses compressed
//! frames and reports the resulting messages in arrival order:
//!
//! - [`frame`]: wire headers and the incremental [`FrameParser`].
//! - [`message`]: the [`MessageDecoder`] and [`DecodedMessage`] variants.
//! - [`connection`]: the [`Connection`] owning one transport.
//! - [`registry`]: optional accounting of live connections.
//!
//! Document encoding and decompression algorithms are injected through the
//! [`DocumentCodec`] and [`Decompressor`] capabilities.

pub mod byte_order;
pub mod compression;
pub mod connection;
pub mod document;
pub mod frame;
pub mod message;
pub mod metrics;
pub mod registry;

pub use compression::{CompressorId, DecompressionError, Decompressor, DefaultDecompressor};
pub use connection::{
    Connection,
    ConnectionBuilder,
    ConnectionError,
    ConnectionEvent,
    ConnectionEvents,
    ConnectionId,
    ConnectionOptions,
    DestroyOptions,
    EventKind,
    EventSink,
    NetworkError,
    NetworkErrorKind,
    PendingResponse,
};
pub use document::{DocumentCodec, DocumentError, LengthPrefixedDocuments};
pub use frame::{FrameHeader, FrameParser, FramingError, ParseEvent, ParseState};
pub use message::{
    DecodeError,
    DecodedMessage,
    MessageDecoder,
    MessageKind,
    ResponseOptions,
    next_request_id,
};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_TOTAL};
pub use registry::{ConnectionRegistry, RegistryChange};

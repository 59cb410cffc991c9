//! Shared utilities for integration tests.
//!
//! Provides a duplex-backed connection fixture, frame builders and an event
//! helper with a deadline. These helpers reduce duplication across test
//! modules.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{io::Write, net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener}, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use docwire::{
    connection::{
        Connection,
        ConnectionBuilder,
        ConnectionEvents,
        ConnectionOptions,
        EventKind,
        event,
    },
    document::LengthPrefixedDocuments,
    frame::{CompressedHeader, OP_MSG, OP_REPLY, encode_compressed_frame, encode_frame},
};
use flate2::{Compression, write::ZlibEncoder};
use tokio::io::DuplexStream;

/// Result type used by integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A minimal length-prefixed document.
pub const DOC: &[u8] = &[6, 0, 0, 0, 0x2a, 0];

/// Create a TCP listener bound to a free local port.
#[expect(
    clippy::expect_used,
    reason = "binding to an ephemeral localhost port must abort the test immediately"
)]
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Build a connection over an in-memory duplex pipe.
///
/// Returns the connection, its event receiver and the server end of the pipe.
pub fn duplex_connection(
    builder: ConnectionBuilder,
) -> TestResult<(Connection, ConnectionEvents, DuplexStream)> {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (sink, events) = event::channel();
    let connection = builder.build(client, sink)?;
    Ok((connection, events, server))
}

/// Builder with the default document codec and `options`.
pub fn builder(options: ConnectionOptions) -> ConnectionBuilder {
    ConnectionBuilder::new(options).document_codec(LengthPrefixedDocuments)
}

/// Receive the next event, failing after five seconds.
///
/// Not for use under paused time, where the deadline would auto-advance.
pub async fn next_event(events: &mut ConnectionEvents) -> TestResult<EventKind> {
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await?
        .ok_or("event channel closed")?;
    Ok(event.kind)
}

/// Body of an extensible message carrying `doc` as its body section.
pub fn msg_body(doc: &[u8]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32_le(0);
    body.put_u8(0);
    body.put_slice(doc);
    body.to_vec()
}

/// Extensible message frame answering `response_to`.
pub fn msg_frame(request_id: i32, response_to: i32) -> TestResult<Bytes> {
    Ok(encode_frame(request_id, response_to, OP_MSG, &msg_body(DOC))?)
}

/// Legacy reply frame answering `response_to` with one document.
pub fn reply_frame(request_id: i32, response_to: i32) -> TestResult<Bytes> {
    let mut body = BytesMut::new();
    body.put_i32_le(0);
    body.put_i64_le(0);
    body.put_i32_le(0);
    body.put_i32_le(1);
    body.put_slice(DOC);
    Ok(encode_frame(request_id, response_to, OP_REPLY, &body)?)
}

/// Compress `data` with zlib.
pub fn zlib(data: &[u8]) -> TestResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Zlib-compressed extensible message frame declaring `declared` bytes once
/// inflated.
pub fn zlib_msg_frame(request_id: i32, response_to: i32, declared: usize) -> TestResult<Bytes> {
    let body = msg_body(DOC);
    let header = CompressedHeader {
        original_op_code: OP_MSG,
        uncompressed_size: i32::try_from(declared)?,
        compressor_id: 2,
    };
    Ok(encode_compressed_frame(
        request_id,
        response_to,
        header,
        &zlib(&body)?,
    )?)
}

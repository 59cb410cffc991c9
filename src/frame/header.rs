//! Fixed frame headers shared by every message on the wire.

use bytes::{BufMut, Bytes, BytesMut};

use super::FramingError;
use crate::byte_order::{i32_at, write_wire_i32};

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 16;

/// Size of the compression preamble that follows the fixed header of an
/// [`OP_COMPRESSED`] frame.
pub const COMPRESSED_HEADER_LEN: usize = 9;

/// Legacy reply op code.
pub const OP_REPLY: i32 = 1;

/// Wrapper op code whose body is a compressed inner message.
pub const OP_COMPRESSED: i32 = 2012;

/// Extensible message op code.
pub const OP_MSG: i32 = 2013;

/// The 16-byte header at the start of every frame.
///
/// `message_length` counts the whole frame, header included.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use docwire::frame::{FrameHeader, HEADER_LEN, OP_MSG};
///
/// let header = FrameHeader {
///     message_length: 21,
///     request_id: 7,
///     response_to: 3,
///     op_code: OP_MSG,
/// };
/// let mut buf = BytesMut::new();
/// header.write_to(&mut buf);
/// assert_eq!(buf.len(), HEADER_LEN);
/// assert_eq!(FrameHeader::parse(&buf), Some(header));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Total frame length including this header.
    pub message_length: i32,
    /// Identifier chosen by the sender of this frame.
    pub request_id: i32,
    /// Request identifier this frame answers, or zero.
    pub response_to: i32,
    /// Operation code selecting the body layout.
    pub op_code: i32,
}

impl FrameHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// Returns `None` when fewer than [`HEADER_LEN`] bytes are available.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            message_length: i32_at(bytes, 0)?,
            request_id: i32_at(bytes, 4)?,
            response_to: i32_at(bytes, 8)?,
            op_code: i32_at(bytes, 12)?,
        })
    }

    /// Append the wire representation of this header to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        dst.put_slice(&write_wire_i32(self.message_length));
        dst.put_slice(&write_wire_i32(self.request_id));
        dst.put_slice(&write_wire_i32(self.response_to));
        dst.put_slice(&write_wire_i32(self.op_code));
    }

    /// Returns `true` when this header wraps a compressed message.
    #[must_use]
    pub const fn is_compressed(&self) -> bool { self.op_code == OP_COMPRESSED }
}

/// Preamble of an [`OP_COMPRESSED`] body, directly after the fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompressedHeader {
    /// Op code of the wrapped message.
    pub original_op_code: i32,
    /// Exact length of the payload once decompressed.
    pub uncompressed_size: i32,
    /// Identifier of the compressor that produced the payload.
    pub compressor_id: u8,
}

impl CompressedHeader {
    /// Parse the compression preamble from the start of `body`.
    ///
    /// `body` is the frame without its fixed header.
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        Some(Self {
            original_op_code: i32_at(body, 0)?,
            uncompressed_size: i32_at(body, 4)?,
            compressor_id: *body.get(8)?,
        })
    }

    /// Append the wire representation of this preamble to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(COMPRESSED_HEADER_LEN);
        dst.put_slice(&write_wire_i32(self.original_op_code));
        dst.put_slice(&write_wire_i32(self.uncompressed_size));
        dst.put_u8(self.compressor_id);
    }
}

/// Build a complete frame around `body`, filling in `message_length`.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if the frame length does not fit
/// the 32-bit length prefix.
///
/// # Examples
///
/// ```
/// use docwire::frame::{FrameHeader, OP_MSG, encode_frame};
///
/// let frame = encode_frame(9, 0, OP_MSG, b"hello").expect("frame fits");
/// let header = FrameHeader::parse(&frame).expect("header present");
/// assert_eq!(header.message_length, 21);
/// assert_eq!(&frame[16..], b"hello");
/// ```
pub fn encode_frame(
    request_id: i32,
    response_to: i32,
    op_code: i32,
    body: &[u8],
) -> Result<Bytes, FramingError> {
    let message_length = frame_length(HEADER_LEN, body.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    FrameHeader {
        message_length,
        request_id,
        response_to,
        op_code,
    }
    .write_to(&mut buf);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Build an [`OP_COMPRESSED`] frame wrapping an already compressed `payload`.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if the frame length does not fit
/// the 32-bit length prefix.
pub fn encode_compressed_frame(
    request_id: i32,
    response_to: i32,
    compressed: CompressedHeader,
    payload: &[u8],
) -> Result<Bytes, FramingError> {
    let overhead = HEADER_LEN + COMPRESSED_HEADER_LEN;
    let message_length = frame_length(overhead, payload.len())?;
    let mut buf = BytesMut::with_capacity(overhead + payload.len());
    FrameHeader {
        message_length,
        request_id,
        response_to,
        op_code: OP_COMPRESSED,
    }
    .write_to(&mut buf);
    compressed.write_to(&mut buf);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn frame_length(overhead: usize, body_len: usize) -> Result<i32, FramingError> {
    let size = overhead.saturating_add(body_len);
    i32::try_from(size).map_err(|_| FramingError::OversizedFrame {
        size,
        max: i32::MAX.unsigned_abs() as usize,
    })
}

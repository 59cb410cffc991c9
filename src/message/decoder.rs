//! Turns complete frames into [`DecodedMessage`]s.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use super::{DecodedMessage, LegacyReply, MessageKind, MessageParts, MsgResponse, ResponseOptions};
use crate::{
    compression::{DecompressionError, Decompressor},
    document::DocumentCodec,
    frame::{COMPRESSED_HEADER_LEN, CompressedHeader, FrameHeader, HEADER_LEN},
};

const HEADER_LEN_I32: i32 = 16;

/// Reasons a complete frame could not be decoded.
///
/// Decode failures are confined to the frame that caused them; the
/// connection stays usable.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is shorter than the fixed fields its op code requires.
    #[error("frame of {len} bytes is shorter than the {needed} bytes it requires")]
    Truncated {
        /// Bytes available.
        len: usize,
        /// Bytes required.
        needed: usize,
    },

    /// The op code does not name a response message.
    #[error("unsupported op code {0}")]
    UnsupportedOpCode(i32),

    /// The declared uncompressed size is negative or above the ceiling.
    #[error("invalid uncompressed size {size} (max {max})")]
    InvalidUncompressedSize {
        /// Declared uncompressed size.
        size: i32,
        /// Configured ceiling.
        max: usize,
    },

    /// Decompression produced a different length than declared.
    #[error("corrupt message: expected {expected} decompressed bytes, got {actual}")]
    CorruptMessage {
        /// Length declared in the compression preamble.
        expected: usize,
        /// Length actually produced.
        actual: usize,
    },

    /// The decompressor rejected the payload.
    #[error(transparent)]
    Decompression(#[from] DecompressionError),
}

/// Decodes frames produced by [`FrameParser`](crate::frame::FrameParser).
///
/// Cloning is cheap; the decompressor and document codec are shared.
#[derive(Clone)]
pub struct MessageDecoder {
    decompressor: Arc<dyn Decompressor>,
    codec: Arc<dyn DocumentCodec>,
    options: ResponseOptions,
    max_message_size: usize,
}

impl std::fmt::Debug for MessageDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDecoder")
            .field("codec", &self.codec)
            .field("options", &self.options)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

impl MessageDecoder {
    /// Create a decoder.
    ///
    /// `max_message_size` bounds the decompressed size of compressed frames.
    #[must_use]
    pub fn new(
        codec: Arc<dyn DocumentCodec>,
        decompressor: Arc<dyn Decompressor>,
        options: ResponseOptions,
        max_message_size: usize,
    ) -> Self {
        Self {
            decompressor,
            codec,
            options,
            max_message_size,
        }
    }

    /// Decoding preferences attached to every decoded message.
    #[must_use]
    pub const fn options(&self) -> ResponseOptions { self.options }

    /// Decode one complete frame, header included.
    ///
    /// Compressed frames are inflated through the injected [`Decompressor`]
    /// and surface as the message they wrap.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the frame is truncated, uses an unsupported
    /// op code, or fails to decompress to its declared size.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use docwire::{
    ///     compression::DefaultDecompressor,
    ///     document::LengthPrefixedDocuments,
    ///     frame::{OP_MSG, encode_frame},
    ///     message::{MessageDecoder, MessageKind, ResponseOptions},
    /// };
    ///
    /// # tokio_test_block_on(async {
    /// let decoder = MessageDecoder::new(
    ///     Arc::new(LengthPrefixedDocuments),
    ///     Arc::new(DefaultDecompressor::default()),
    ///     ResponseOptions::default(),
    ///     1024,
    /// );
    /// let frame = encode_frame(1, 7, OP_MSG, &[0, 0, 0, 0]).expect("frame fits");
    /// let message = decoder.decode(frame).await.expect("valid frame");
    /// assert_eq!(message.kind(), MessageKind::Msg);
    /// assert_eq!(message.response_to(), 7);
    /// # });
    /// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
    /// #     tokio::runtime::Builder::new_current_thread().build().expect("runtime").block_on(f)
    /// # }
    /// ```
    pub async fn decode(&self, frame: Bytes) -> Result<DecodedMessage, DecodeError> {
        let header = FrameHeader::parse(&frame).ok_or(DecodeError::Truncated {
            len: frame.len(),
            needed: HEADER_LEN,
        })?;
        if !header.is_compressed() {
            let body = frame.slice(HEADER_LEN..);
            return self.assemble(header, body, None);
        }

        let preamble_end = HEADER_LEN + COMPRESSED_HEADER_LEN;
        let compressed =
            CompressedHeader::parse(&frame[HEADER_LEN..]).ok_or(DecodeError::Truncated {
                len: frame.len(),
                needed: preamble_end,
            })?;
        let expected = usize::try_from(compressed.uncompressed_size)
            .ok()
            .filter(|size| *size <= self.max_message_size)
            .ok_or(DecodeError::InvalidUncompressedSize {
                size: compressed.uncompressed_size,
                max: self.max_message_size,
            })?;

        let payload = frame.slice(preamble_end..);
        let body = self
            .decompressor
            .decompress(compressed.compressor_id, payload)
            .await?;
        if body.len() != expected {
            return Err(DecodeError::CorruptMessage {
                expected,
                actual: body.len(),
            });
        }

        let header = FrameHeader {
            message_length: compressed.uncompressed_size.saturating_add(HEADER_LEN_I32),
            op_code: compressed.original_op_code,
            ..header
        };
        self.assemble(header, body, Some(compressed.compressor_id))
    }

    fn assemble(
        &self,
        header: FrameHeader,
        body: Bytes,
        compressor_id: Option<u8>,
    ) -> Result<DecodedMessage, DecodeError> {
        let kind = MessageKind::from_op_code(header.op_code)
            .ok_or(DecodeError::UnsupportedOpCode(header.op_code))?;
        let body_len = body.len();
        let parts = MessageParts {
            header,
            body,
            options: self.options,
            compressor_id,
            codec: Arc::clone(&self.codec),
        };
        let truncated = |fixed: usize| DecodeError::Truncated {
            len: HEADER_LEN + body_len,
            needed: HEADER_LEN + fixed,
        };
        match kind {
            MessageKind::LegacyReply => LegacyReply::from_parts(parts)
                .map(DecodedMessage::LegacyReply)
                .ok_or_else(|| truncated(super::REPLY_FIXED_LEN)),
            MessageKind::Msg => MsgResponse::from_parts(parts)
                .map(DecodedMessage::Msg)
                .ok_or_else(|| truncated(4)),
        }
    }
}

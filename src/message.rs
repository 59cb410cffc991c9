//! Decoded response messages.
//!
//! A [`DecodedMessage`] is the unit handed to the owner of a connection: a
//! complete, decompressed frame tagged by its operation. The variant is picked
//! by [`MessageKind::from_op_code`]; supporting a new op code means adding an
//! arm there and a variant here.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use bytes::Bytes;
use serde::Deserialize;

use crate::{
    byte_order::{i32_at, i64_at, u32_at},
    document::{DocumentCodec, DocumentError, checked_document_len, split_documents},
    frame::{FrameHeader, OP_MSG, OP_REPLY},
};

mod decoder;

pub use decoder::{DecodeError, MessageDecoder};

/// Length of the fixed fields at the start of a legacy reply body.
pub const REPLY_FIXED_LEN: usize = 20;

/// Checksum-present flag of an extensible message.
pub const MSG_CHECKSUM_PRESENT: u32 = 1;

/// More-to-come flag of an extensible message.
pub const MSG_MORE_TO_COME: u32 = 1 << 1;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Allocate a process-wide request identifier for an outbound frame.
///
/// Identifiers increase monotonically and wrap back to 1 after `i32::MAX`.
#[must_use]
pub fn next_request_id() -> i32 {
    let mut id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    while id <= 0 {
        // Wrapped past i32::MAX; restart the sequence.
        let _ = NEXT_REQUEST_ID.compare_exchange(id + 1, 2, Ordering::Relaxed, Ordering::Relaxed);
        id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    }
    id
}

/// Document-decoding preferences captured with each message.
///
/// The connection does not decode documents itself; these flags travel with
/// every [`DecodedMessage`] so the consumer decodes with the settings that were
/// in force when the message arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponseOptions {
    /// Decode 64-bit integers as native numbers when they fit.
    pub promote_longs: bool,
    /// Decode wrapper values to their native representation.
    pub promote_values: bool,
    /// Decode binary values as plain byte buffers.
    pub promote_buffers: bool,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            promote_longs: true,
            promote_values: true,
            promote_buffers: false,
        }
    }
}

/// Operation of a decoded message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Legacy reply (`OP_REPLY`).
    LegacyReply,
    /// Extensible message (`OP_MSG`).
    Msg,
}

impl MessageKind {
    /// Select the message kind for an uncompressed op code.
    ///
    /// Returns `None` for op codes that cannot appear in a response.
    #[must_use]
    pub const fn from_op_code(op_code: i32) -> Option<Self> {
        match op_code {
            OP_REPLY => Some(Self::LegacyReply),
            OP_MSG => Some(Self::Msg),
            _ => None,
        }
    }
}

/// Fields shared by every message variant.
#[derive(Clone, Debug)]
pub(crate) struct MessageParts {
    pub(crate) header: FrameHeader,
    pub(crate) body: Bytes,
    pub(crate) options: ResponseOptions,
    pub(crate) compressor_id: Option<u8>,
    pub(crate) codec: Arc<dyn DocumentCodec>,
}

/// Legacy reply with its fixed fields parsed.
#[derive(Clone, Debug)]
pub struct LegacyReply {
    parts: MessageParts,
    response_flags: i32,
    cursor_id: i64,
    starting_from: i32,
    number_returned: i32,
}

impl LegacyReply {
    /// Parse the fixed reply fields; `None` if the body is too short.
    pub(crate) fn from_parts(parts: MessageParts) -> Option<Self> {
        let body = &parts.body;
        let response_flags = i32_at(body, 0)?;
        let cursor_id = i64_at(body, 4)?;
        let starting_from = i32_at(body, 12)?;
        let number_returned = i32_at(body, 16)?;
        Some(Self {
            parts,
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
        })
    }

    /// Reply flag bits.
    #[must_use]
    pub const fn response_flags(&self) -> i32 { self.response_flags }

    /// Server-side cursor identifier, zero when exhausted.
    #[must_use]
    pub const fn cursor_id(&self) -> i64 { self.cursor_id }

    /// Position of the first returned document in the cursor.
    #[must_use]
    pub const fn starting_from(&self) -> i32 { self.starting_from }

    /// Number of documents the server says it returned.
    #[must_use]
    pub const fn number_returned(&self) -> i32 { self.number_returned }

    /// Raw bytes of the documents section.
    #[must_use]
    pub fn documents_bytes(&self) -> Bytes { self.parts.body.slice(REPLY_FIXED_LEN..) }
}

/// Extensible message response.
#[derive(Clone, Debug)]
pub struct MsgResponse {
    parts: MessageParts,
    flag_bits: u32,
}

impl MsgResponse {
    /// Parse the flag bits; `None` if the body is too short.
    pub(crate) fn from_parts(parts: MessageParts) -> Option<Self> {
        let flag_bits = u32_at(&parts.body, 0)?;
        Some(Self { parts, flag_bits })
    }

    /// Message flag bits.
    #[must_use]
    pub const fn flag_bits(&self) -> u32 { self.flag_bits }

    /// Whether a trailing CRC-32C checksum follows the sections.
    #[must_use]
    pub const fn checksum_present(&self) -> bool { self.flag_bits & MSG_CHECKSUM_PRESENT != 0 }

    /// Whether the peer will send further messages without a request.
    #[must_use]
    pub const fn more_to_come(&self) -> bool { self.flag_bits & MSG_MORE_TO_COME != 0 }

    /// Raw bytes of the sections, excluding flag bits and checksum.
    #[must_use]
    pub fn sections_bytes(&self) -> Bytes {
        let body = &self.parts.body;
        let end = if self.checksum_present() {
            body.len().saturating_sub(4).max(4)
        } else {
            body.len()
        };
        body.slice(4..end)
    }

    fn documents(&self) -> Result<Vec<Bytes>, DocumentError> {
        let codec = self.parts.codec.as_ref();
        let sections = self.sections_bytes();
        let mut documents = Vec::new();
        let mut offset = 0;
        while let Some(&kind) = sections.get(offset) {
            offset += 1;
            let rest = sections.slice(offset..);
            match kind {
                0 => {
                    let len = checked_document_len(codec, &rest)?;
                    documents.push(rest.slice(..len));
                    offset += len;
                }
                1 => {
                    let size = sequence_size(&rest)?;
                    let identifier_end = rest[4..size]
                        .iter()
                        .position(|b| *b == 0)
                        .ok_or(DocumentError::UnterminatedIdentifier)?;
                    let docs = rest.slice(4 + identifier_end + 1..size);
                    documents.extend(split_documents(codec, &docs)?);
                    offset += size;
                }
                other => return Err(DocumentError::UnknownSection(other)),
            }
        }
        Ok(documents)
    }
}

fn sequence_size(section: &[u8]) -> Result<usize, DocumentError> {
    let declared = i32_at(section, 0).ok_or(DocumentError::Truncated {
        need: 4,
        have: section.len(),
    })?;
    let size = usize::try_from(declared)
        .ok()
        .filter(|size| *size > 4)
        .ok_or(DocumentError::InvalidLength(declared))?;
    if size > section.len() {
        return Err(DocumentError::Truncated {
            need: size,
            have: section.len(),
        });
    }
    Ok(size)
}

/// A complete response message, decompressed and tagged by operation.
#[derive(Clone, Debug)]
pub enum DecodedMessage {
    /// Legacy reply.
    LegacyReply(LegacyReply),
    /// Extensible message.
    Msg(MsgResponse),
}

impl DecodedMessage {
    fn parts(&self) -> &MessageParts {
        match self {
            Self::LegacyReply(reply) => &reply.parts,
            Self::Msg(msg) => &msg.parts,
        }
    }

    /// Operation of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::LegacyReply(_) => MessageKind::LegacyReply,
            Self::Msg(_) => MessageKind::Msg,
        }
    }

    /// Header of the message.
    ///
    /// For messages that arrived compressed, `op_code` is the wrapped op code
    /// and `message_length` describes the decompressed message.
    #[must_use]
    pub fn header(&self) -> &FrameHeader { &self.parts().header }

    /// Identifier of the request this message answers.
    #[must_use]
    pub fn response_to(&self) -> i32 { self.parts().header.response_to }

    /// Message body after the fixed header, decompressed if needed.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.parts().body }

    /// Decoding preferences in force when the message was received.
    #[must_use]
    pub fn options(&self) -> ResponseOptions { self.parts().options }

    /// Compressor that carried the message, if it arrived compressed.
    #[must_use]
    pub fn compressor_id(&self) -> Option<u8> { self.parts().compressor_id }

    /// Split the message into its raw documents.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if the document section is malformed.
    pub fn documents(&self) -> Result<Vec<Bytes>, DocumentError> {
        match self {
            Self::LegacyReply(reply) => {
                split_documents(reply.parts.codec.as_ref(), &reply.documents_bytes())
            }
            Self::Msg(msg) => msg.documents(),
        }
    }
}

//! Document-codec capability.
//!
//! Decoding document payloads is the application's concern. A connection only
//! needs to know where each document in a response body ends, which is what a
//! [`DocumentCodec`] answers. Connections refuse to start without one.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::byte_order::i32_at;

/// Errors raised while locating documents inside a response body.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// The body ends before the document it declares.
    #[error("document truncated: need {need} bytes, have {have}")]
    Truncated {
        /// Bytes the document claims to occupy.
        need: usize,
        /// Bytes actually remaining.
        have: usize,
    },

    /// The document length prefix is impossible.
    #[error("invalid document length {0}")]
    InvalidLength(i32),

    /// An extensible-message section uses an unknown kind byte.
    #[error("unknown section kind {0}")]
    UnknownSection(u8),

    /// A document-sequence identifier is missing its terminator.
    #[error("unterminated section identifier")]
    UnterminatedIdentifier,
}

/// Capability that measures encoded documents.
pub trait DocumentCodec: fmt::Debug + Send + Sync {
    /// Return the encoded length of the document at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if `bytes` does not start with a complete,
    /// well-formed document.
    fn document_len(&self, bytes: &[u8]) -> Result<usize, DocumentError>;
}

/// Codec for documents prefixed by their own little-endian `i32` length.
///
/// The smallest such document is five bytes: the prefix and a terminator.
///
/// # Examples
///
/// ```
/// use docwire::document::{DocumentCodec, LengthPrefixedDocuments};
///
/// let doc = [5_u8, 0, 0, 0, 0, 0xff];
/// assert_eq!(LengthPrefixedDocuments.document_len(&doc), Ok(5));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthPrefixedDocuments;

const MIN_DOCUMENT_LEN: usize = 5;

impl DocumentCodec for LengthPrefixedDocuments {
    fn document_len(&self, bytes: &[u8]) -> Result<usize, DocumentError> {
        let declared = i32_at(bytes, 0).ok_or(DocumentError::Truncated {
            need: 4,
            have: bytes.len(),
        })?;
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| *len >= MIN_DOCUMENT_LEN)
            .ok_or(DocumentError::InvalidLength(declared))?;
        if len > bytes.len() {
            return Err(DocumentError::Truncated {
                need: len,
                have: bytes.len(),
            });
        }
        Ok(len)
    }
}

/// Ask `codec` for the length of the document starting `bytes`, refusing
/// empty documents and lengths past the end of `bytes`.
pub(crate) fn checked_document_len(
    codec: &dyn DocumentCodec,
    bytes: &[u8],
) -> Result<usize, DocumentError> {
    match codec.document_len(bytes)? {
        0 => Err(DocumentError::InvalidLength(0)),
        len if len > bytes.len() => Err(DocumentError::Truncated {
            need: len,
            have: bytes.len(),
        }),
        len => Ok(len),
    }
}

/// Split a run of back-to-back documents into individual slices.
pub(crate) fn split_documents(
    codec: &dyn DocumentCodec,
    bytes: &Bytes,
) -> Result<Vec<Bytes>, DocumentError> {
    let mut documents = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let len = checked_document_len(codec, &bytes[offset..])?;
        documents.push(bytes.slice(offset..offset + len));
        offset += len;
    }
    Ok(documents)
}

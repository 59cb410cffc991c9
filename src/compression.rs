//! Decompression capability used for [`OP_COMPRESSED`](crate::frame::OP_COMPRESSED)
//! frames.
//!
//! The message decoder never inflates payloads itself. It hands the
//! compressor identifier and the raw payload to a [`Decompressor`], which may
//! suspend (for example to move work onto a blocking pool). Connections use
//! [`DefaultDecompressor`] unless another implementation is injected; it
//! inflates zlib payloads on Tokio's blocking pool.

use std::{
    fmt,
    io::{self, Read},
};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use thiserror::Error;

/// Compressor identifiers defined by the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressorId {
    /// Payload stored as-is.
    Noop,
    /// Snappy block format.
    Snappy,
    /// zlib stream.
    Zlib,
    /// Zstandard frame.
    Zstd,
}

impl CompressorId {
    /// Map a wire identifier to a known compressor.
    #[must_use]
    pub const fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Noop),
            1 => Some(Self::Snappy),
            2 => Some(Self::Zlib),
            3 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Wire identifier of this compressor.
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        match self {
            Self::Noop => 0,
            Self::Snappy => 1,
            Self::Zlib => 2,
            Self::Zstd => 3,
        }
    }
}

impl fmt::Display for CompressorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Noop => "noop",
            Self::Snappy => "snappy",
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// Failures reported by a [`Decompressor`].
#[derive(Debug, Error)]
pub enum DecompressionError {
    /// The identifier does not name any known compressor.
    #[error("unknown compressor id {0}")]
    Unknown(u8),

    /// The compressor is known but this decompressor cannot handle it.
    #[error("compressor {0} is not supported")]
    Unsupported(CompressorId),

    /// Inflated output grew beyond the permitted size.
    #[error("decompressed payload exceeds {max} bytes")]
    TooLarge {
        /// Maximum number of output bytes allowed.
        max: usize,
    },

    /// The payload could not be inflated.
    #[error("corrupt compressed payload: {0}")]
    Corrupt(#[from] io::Error),

    /// Failure raised by a custom decompressor.
    #[error("decompressor failed: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Injected capability that inflates compressed message payloads.
///
/// Implementations may complete on another task or thread; the connection
/// awaits each call before handling the next frame, so arrival order is
/// preserved.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use docwire::compression::{DecompressionError, Decompressor};
///
/// struct Passthrough;
///
/// #[async_trait]
/// impl Decompressor for Passthrough {
///     async fn decompress(
///         &self,
///         _compressor_id: u8,
///         payload: Bytes,
///     ) -> Result<Bytes, DecompressionError> {
///         Ok(payload)
///     }
/// }
/// ```
#[async_trait]
pub trait Decompressor: Send + Sync {
    /// Inflate `payload`, which was produced by the compressor `compressor_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DecompressionError`] when the compressor is unknown or
    /// unsupported, or the payload is corrupt.
    async fn decompress(
        &self,
        compressor_id: u8,
        payload: Bytes,
    ) -> Result<Bytes, DecompressionError>;
}

/// Decompressor supporting the `noop` and `zlib` compressors.
#[derive(Clone, Copy, Debug)]
pub struct DefaultDecompressor {
    max_output: usize,
}

impl DefaultDecompressor {
    /// Create a decompressor that refuses to inflate past `max_output` bytes.
    #[must_use]
    pub const fn new(max_output: usize) -> Self { Self { max_output } }
}

/// Inflate a zlib stream, stopping once output passes `max_output`.
fn inflate_zlib(payload: &[u8], max_output: usize) -> Result<Bytes, DecompressionError> {
    let limit = u64::try_from(max_output)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut out = Vec::new();
    ZlibDecoder::new(payload).take(limit).read_to_end(&mut out)?;
    if out.len() > max_output {
        return Err(DecompressionError::TooLarge { max: max_output });
    }
    Ok(Bytes::from(out))
}

impl Default for DefaultDecompressor {
    fn default() -> Self { Self::new(crate::frame::DEFAULT_MAX_FRAME_SIZE) }
}

#[async_trait]
impl Decompressor for DefaultDecompressor {
    async fn decompress(
        &self,
        compressor_id: u8,
        payload: Bytes,
    ) -> Result<Bytes, DecompressionError> {
        match CompressorId::from_wire(compressor_id) {
            Some(CompressorId::Noop) => Ok(payload),
            Some(CompressorId::Zlib) => {
                let max_output = self.max_output;
                tokio::task::spawn_blocking(move || inflate_zlib(&payload, max_output))
                    .await
                    .map_err(|error| DecompressionError::Other(Box::new(error)))?
            }
            Some(other) => Err(DecompressionError::Unsupported(other)),
            None => Err(DecompressionError::Unknown(compressor_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::ZlibEncoder};
    use rstest::rstest;

    use super::*;

    fn zlib(data: &[u8]) -> Bytes {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("write to in-memory encoder");
        Bytes::from(encoder.finish().expect("finish in-memory encoder"))
    }

    #[rstest]
    #[case(0, Some(CompressorId::Noop))]
    #[case(3, Some(CompressorId::Zstd))]
    #[case(9, None)]
    fn wire_ids_map_to_compressors(#[case] id: u8, #[case] expected: Option<CompressorId>) {
        assert_eq!(CompressorId::from_wire(id), expected);
        if let Some(compressor) = expected {
            assert_eq!(compressor.wire_id(), id);
        }
    }

    #[tokio::test]
    async fn noop_returns_payload_untouched() {
        let payload = Bytes::from_static(b"plain");
        let out = DefaultDecompressor::default()
            .decompress(0, payload.clone())
            .await
            .expect("noop never fails");
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn zlib_payload_is_inflated() {
        let data = b"hello hello hello hello".repeat(8);
        let out = DefaultDecompressor::default()
            .decompress(2, zlib(&data))
            .await
            .expect("valid zlib stream");
        assert_eq!(out.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn zlib_output_is_bounded() {
        let data = vec![0_u8; 4096];
        let err = DefaultDecompressor::new(1024)
            .decompress(2, zlib(&data))
            .await
            .expect_err("output exceeds bound");
        assert!(matches!(err, DecompressionError::TooLarge { max: 1024 }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zlib_inflation_leaves_the_runtime_thread_free() {
        let ticks = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        });

        let data = vec![0_u8; 8 * 1024 * 1024];
        let out = DefaultDecompressor::default()
            .decompress(2, zlib(&data))
            .await
            .expect("valid zlib stream");
        let observed = ticks.load(std::sync::atomic::Ordering::SeqCst);
        ticker.abort();

        assert_eq!(out.len(), data.len());
        assert!(observed > 0, "runtime thread was blocked during inflation");
    }

    #[tokio::test]
    async fn corrupt_zlib_is_reported() {
        let err = DefaultDecompressor::default()
            .decompress(2, Bytes::from_static(b"not zlib at all"))
            .await
            .expect_err("garbage input");
        assert!(matches!(err, DecompressionError::Corrupt(_)));
    }

    #[rstest]
    #[case(1, "compressor snappy is not supported")]
    #[case(3, "compressor zstd is not supported")]
    #[case(42, "unknown compressor id 42")]
    #[tokio::test]
    async fn unsupported_compressors_are_named(#[case] id: u8, #[case] message: &str) {
        let err = DefaultDecompressor::default()
            .decompress(id, Bytes::from_static(b"x"))
            .await
            .expect_err("compressor not available");
        assert_eq!(err.to_string(), message);
    }
}

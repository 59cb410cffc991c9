//! Incremental reassembly of length-prefixed frames.
//!
//! [`FrameParser`] accepts socket reads of any size and boundary and yields
//! complete frames in arrival order. It performs no I/O and holds at most one
//! partial buffer between calls:
//!
//! - a *stub* of at most [`LENGTH_PREFIX_LEN`] bytes, too short to trust the
//!   length prefix, or
//! - an *accumulating* buffer sized to the declared frame length.
//!
//! Malformed length prefixes are reported as [`ParseEvent::ParseError`] and
//! reset the parser. The stream offers no resynchronisation point, so the
//! remainder of the offending chunk is discarded and parsing resumes with the
//! next chunk.

use std::mem;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::byte_order::i32_at;

/// Size of the length prefix at the start of every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default ceiling on a single frame (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Reasons a length prefix is rejected.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The length prefix decoded to a negative value.
    #[error("negative frame length: {length}")]
    NegativeLength {
        /// Decoded length prefix.
        length: i32,
    },

    /// The length prefix exceeds the configured ceiling.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Declared frame length.
        size: usize,
        /// Configured maximum frame length.
        max: usize,
    },

    /// The length prefix does not leave room for anything beyond itself.
    #[error("frame length {length} does not exceed its 4-byte prefix")]
    UndersizedFrame {
        /// Decoded length prefix.
        length: i32,
    },
}

/// Output of [`FrameParser::feed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseEvent {
    /// A complete frame, header included.
    FrameReady(Bytes),
    /// A malformed length prefix was rejected and the parser reset.
    ParseError(FramingError),
}

/// Snapshot of the parser's held state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    /// Nothing held; the next byte starts a new frame.
    Empty,
    /// A few bytes held, not yet enough to decode the length prefix.
    Stub {
        /// Bytes held in the stub buffer.
        len: usize,
    },
    /// A frame of known length is being filled.
    Accumulating {
        /// Declared frame length.
        frame_length: usize,
        /// Bytes of the frame received so far.
        bytes_read: usize,
    },
}

#[derive(Debug, Default)]
enum Held {
    #[default]
    Empty,
    Stub(BytesMut),
    Accumulating {
        buffer: BytesMut,
        frame_length: usize,
    },
}

/// Stateful reassembler for length-prefixed frames.
///
/// # Examples
///
/// ```
/// use docwire::frame::{FrameParser, ParseEvent};
///
/// let mut parser = FrameParser::default();
/// let frame = [6_u8, 0, 0, 0, 0xaa, 0xbb];
///
/// assert!(parser.feed(&frame[..3]).is_empty());
/// let events = parser.feed(&frame[3..]);
/// assert_eq!(events, vec![ParseEvent::FrameReady(frame.to_vec().into())]);
/// ```
#[derive(Debug)]
pub struct FrameParser {
    max_frame_size: usize,
    held: Held,
}

impl Default for FrameParser {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_SIZE) }
}

impl FrameParser {
    /// Create a parser that rejects frames longer than `max_frame_size`.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            held: Held::Empty,
        }
    }

    /// Maximum frame length accepted by this parser.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize { self.max_frame_size }

    /// Report what the parser is currently holding.
    #[must_use]
    pub fn state(&self) -> ParseState {
        match &self.held {
            Held::Empty => ParseState::Empty,
            Held::Stub(stub) => ParseState::Stub { len: stub.len() },
            Held::Accumulating {
                buffer,
                frame_length,
            } => ParseState::Accumulating {
                frame_length: *frame_length,
                bytes_read: buffer.len(),
            },
        }
    }

    /// Number of bytes held from previous calls to [`feed`](Self::feed).
    #[must_use]
    pub fn buffered(&self) -> usize {
        match &self.held {
            Held::Empty => 0,
            Held::Stub(buffer) | Held::Accumulating { buffer, .. } => buffer.len(),
        }
    }

    /// Drop any partial frame and return to [`ParseState::Empty`].
    pub fn reset(&mut self) { self.held = Held::Empty; }

    /// Consume `chunk` in full and return the events it completes, in order.
    ///
    /// A single chunk may finish a held frame, carry several whole frames and
    /// start another; all of them are reported before this call returns.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        let rest = self.fill_accumulating(chunk, &mut events);

        match mem::take(&mut self.held) {
            Held::Stub(mut stub) => {
                stub.extend_from_slice(rest);
                self.parse_fresh(&stub, &mut events);
            }
            Held::Empty => self.parse_fresh(rest, &mut events),
            accumulating @ Held::Accumulating { .. } => self.held = accumulating,
        }

        events
    }

    /// Copy bytes into the accumulating buffer, if any, emitting the frame once
    /// complete. Returns the bytes left over for fresh parsing.
    fn fill_accumulating<'a>(
        &mut self,
        chunk: &'a [u8],
        events: &mut Vec<ParseEvent>,
    ) -> &'a [u8] {
        let Held::Accumulating {
            buffer,
            frame_length,
        } = &mut self.held
        else {
            return chunk;
        };

        let needed = frame_length.saturating_sub(buffer.len());
        let (head, rest) = chunk.split_at(needed.min(chunk.len()));
        buffer.extend_from_slice(head);
        if buffer.len() < *frame_length {
            return rest;
        }

        let frame = mem::take(buffer).freeze();
        self.held = Held::Empty;
        events.push(ParseEvent::FrameReady(frame));
        rest
    }

    /// Parse `input` with no partial state held.
    fn parse_fresh(&mut self, mut input: &[u8], events: &mut Vec<ParseEvent>) {
        while !input.is_empty() {
            if input.len() <= LENGTH_PREFIX_LEN {
                self.held = Held::Stub(BytesMut::from(input));
                return;
            }

            let Some(length) = i32_at(input, 0) else {
                return;
            };
            let frame_length = match self.validate(length) {
                Ok(frame_length) => frame_length,
                Err(error) => {
                    self.held = Held::Empty;
                    events.push(ParseEvent::ParseError(error));
                    return;
                }
            };

            if input.len() < frame_length {
                let mut buffer = BytesMut::with_capacity(frame_length);
                buffer.extend_from_slice(input);
                self.held = Held::Accumulating {
                    buffer,
                    frame_length,
                };
                return;
            }

            let (frame, rest) = input.split_at(frame_length);
            events.push(ParseEvent::FrameReady(Bytes::copy_from_slice(frame)));
            input = rest;
        }
    }

    fn validate(&self, length: i32) -> Result<usize, FramingError> {
        let Ok(size) = usize::try_from(length) else {
            return Err(FramingError::NegativeLength { length });
        };
        if size > self.max_frame_size {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_frame_size,
            });
        }
        if size <= LENGTH_PREFIX_LEN {
            return Err(FramingError::UndersizedFrame { length });
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests;

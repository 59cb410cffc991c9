//! Wire framing: fixed headers and the inbound frame reassembler.
//!
//! Every frame starts with a 16-byte [`FrameHeader`] whose first field is the
//! total frame length. [`FrameParser`] turns an arbitrarily chunked byte
//! stream into complete frames using that prefix.

mod header;
mod parser;

pub use header::{
    COMPRESSED_HEADER_LEN,
    CompressedHeader,
    FrameHeader,
    HEADER_LEN,
    OP_COMPRESSED,
    OP_MSG,
    OP_REPLY,
    encode_compressed_frame,
    encode_frame,
};
pub use parser::{
    DEFAULT_MAX_FRAME_SIZE,
    FrameParser,
    FramingError,
    LENGTH_PREFIX_LEN,
    ParseEvent,
    ParseState,
};

#[cfg(test)]
mod tests;

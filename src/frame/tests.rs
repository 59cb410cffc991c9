//! Tests for fixed header parsing and frame construction.

use bytes::BytesMut;
use rstest::rstest;

use super::*;

#[test]
fn header_fields_are_little_endian() {
    let bytes = [
        0x15, 0, 0, 0, // message_length = 21
        0x07, 0, 0, 0, // request_id = 7
        0x03, 0, 0, 0, // response_to = 3
        0xdd, 0x07, 0, 0, // op_code = 2013
    ];
    let header = FrameHeader::parse(&bytes).expect("16 bytes is a full header");
    assert_eq!(
        header,
        FrameHeader {
            message_length: 21,
            request_id: 7,
            response_to: 3,
            op_code: OP_MSG,
        }
    );
    assert!(!header.is_compressed());
}

#[rstest]
#[case::empty(0)]
#[case::one_short(HEADER_LEN - 1)]
fn short_header_is_absent(#[case] len: usize) {
    assert_eq!(FrameHeader::parse(&vec![0_u8; len]), None);
}

#[test]
fn compressed_header_round_trips_through_frame() {
    let compressed = CompressedHeader {
        original_op_code: OP_REPLY,
        uncompressed_size: 40,
        compressor_id: 2,
    };
    let frame = encode_compressed_frame(5, 1, compressed, b"zz").expect("frame fits");

    let header = FrameHeader::parse(&frame).expect("fixed header");
    assert!(header.is_compressed());
    assert_eq!(
        usize::try_from(header.message_length).expect("positive length"),
        HEADER_LEN + COMPRESSED_HEADER_LEN + 2
    );
    assert_eq!(CompressedHeader::parse(&frame[HEADER_LEN..]), Some(compressed));
    assert_eq!(&frame[HEADER_LEN + COMPRESSED_HEADER_LEN..], b"zz");
}

#[test]
fn compressed_header_needs_nine_bytes() {
    let mut buf = BytesMut::new();
    CompressedHeader {
        original_op_code: OP_MSG,
        uncompressed_size: 1,
        compressor_id: 0,
    }
    .write_to(&mut buf);
    assert_eq!(buf.len(), COMPRESSED_HEADER_LEN);
    assert!(CompressedHeader::parse(&buf[..COMPRESSED_HEADER_LEN - 1]).is_none());
}

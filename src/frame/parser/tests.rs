//! Unit and generated tests for the frame reassembler.

use bytes::Bytes;
use proptest::{
    collection::vec,
    prelude::{Strategy, any},
    prop_assert,
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner},
};
use rstest::rstest;

use super::*;
use crate::frame::{OP_MSG, OP_REPLY, encode_frame};

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha))
}

fn frame(request_id: i32, body: &[u8]) -> Bytes {
    encode_frame(request_id, 0, OP_MSG, body).expect("test frame fits")
}

fn ready(frame: &Bytes) -> ParseEvent { ParseEvent::FrameReady(frame.clone()) }

/// Feed `bytes` split at the given ascending cut points.
fn feed_split(parser: &mut FrameParser, bytes: &[u8], cuts: &[usize]) -> Vec<ParseEvent> {
    let mut events = Vec::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        events.extend(parser.feed(&bytes[start..cut]));
        start = cut;
    }
    events
}

#[test]
fn whole_frame_in_one_chunk_is_emitted() {
    let mut parser = FrameParser::default();
    let frame = frame(1, b"payload");

    assert_eq!(parser.feed(&frame), vec![ready(&frame)]);
    assert_eq!(parser.state(), ParseState::Empty);
}

#[test]
fn header_only_frame_arrives_byte_by_byte() {
    let mut parser = FrameParser::default();
    let frame = frame(2, b"");
    assert_eq!(frame.len(), 16);

    for (index, byte) in frame.iter().enumerate() {
        let events = parser.feed(std::slice::from_ref(byte));
        if index + 1 < frame.len() {
            assert!(events.is_empty(), "frame emitted early at byte {index}");
        } else {
            assert_eq!(events, vec![ready(&frame)]);
        }
    }
    assert_eq!(parser.state(), ParseState::Empty);
}

#[rstest]
#[case::one_byte(1, ParseState::Stub { len: 1 })]
#[case::three_bytes(3, ParseState::Stub { len: 3 })]
#[case::exactly_prefix(4, ParseState::Stub { len: 4 })]
#[case::prefix_and_one(5, ParseState::Accumulating { frame_length: 20, bytes_read: 5 })]
fn partial_input_is_held(#[case] fed: usize, #[case] expected: ParseState) {
    let mut parser = FrameParser::default();
    let frame = frame(3, b"abcd");

    assert!(parser.feed(&frame[..fed]).is_empty());
    assert_eq!(parser.state(), expected);
    assert_eq!(parser.buffered(), fed);
}

#[test]
fn stub_grows_across_tiny_chunks() {
    let mut parser = FrameParser::default();
    let frame = frame(4, b"xyz");

    assert!(parser.feed(&frame[..2]).is_empty());
    assert!(parser.feed(&frame[2..3]).is_empty());
    assert_eq!(parser.state(), ParseState::Stub { len: 3 });
    assert_eq!(parser.feed(&frame[3..]), vec![ready(&frame)]);
}

#[test]
fn two_frames_in_one_chunk_keep_order() {
    let mut parser = FrameParser::default();
    let first = frame(5, b"first");
    let second = frame(6, b"second frame");
    let joined = [first.as_ref(), second.as_ref()].concat();

    assert_eq!(parser.feed(&joined), vec![ready(&first), ready(&second)]);
}

#[test]
fn tail_of_one_frame_and_head_of_next_share_a_chunk() {
    let mut parser = FrameParser::default();
    let first = frame(7, b"0123456789");
    let second = frame(8, b"abcdef");
    let joined = [first.as_ref(), second.as_ref()].concat();

    assert!(parser.feed(&joined[..10]).is_empty());
    assert_eq!(parser.feed(&joined[10..30]), vec![ready(&first)]);
    assert_eq!(parser.state(), ParseState::Stub { len: 4 });
    assert_eq!(parser.feed(&joined[30..35]), Vec::new());
    assert_eq!(
        parser.state(),
        ParseState::Accumulating {
            frame_length: 22,
            bytes_read: 9,
        }
    );
    assert_eq!(parser.feed(&joined[35..]), vec![ready(&second)]);
}

#[test]
fn completing_frame_followed_by_short_tail_becomes_stub() {
    let mut parser = FrameParser::default();
    let first = frame(9, b"abc");
    let second = frame(10, b"def");
    let joined = [first.as_ref(), second.as_ref()].concat();

    assert!(parser.feed(&joined[..8]).is_empty());
    assert_eq!(parser.feed(&joined[8..21]), vec![ready(&first)]);
    assert_eq!(parser.state(), ParseState::Stub { len: 2 });
    assert_eq!(parser.feed(&joined[21..]), vec![ready(&second)]);
}

#[rstest]
#[case::negative(-1, FramingError::NegativeLength { length: -1 })]
#[case::oversized(1025, FramingError::OversizedFrame { size: 1025, max: 1024 })]
#[case::zero(0, FramingError::UndersizedFrame { length: 0 })]
#[case::prefix_only(4, FramingError::UndersizedFrame { length: 4 })]
fn invalid_length_is_rejected_then_parsing_recovers(
    #[case] length: i32,
    #[case] expected: FramingError,
) {
    let mut parser = FrameParser::new(1024);
    let mut bad = crate::byte_order::write_wire_i32(length).to_vec();
    bad.extend_from_slice(&[0xee; 12]);

    assert_eq!(parser.feed(&bad), vec![ParseEvent::ParseError(expected)]);
    assert_eq!(parser.state(), ParseState::Empty);

    let good = frame(11, b"after");
    assert_eq!(parser.feed(&good), vec![ready(&good)]);
}

#[test]
fn rejection_discards_held_stub() {
    let mut parser = FrameParser::new(64);
    assert!(parser.feed(&[0xff, 0xff]).is_empty());

    let events = parser.feed(&[0xff, 0xff, 0x00, 0x00]);
    assert_eq!(
        events,
        vec![ParseEvent::ParseError(FramingError::NegativeLength {
            length: -1
        })]
    );
    assert_eq!(parser.buffered(), 0);
}

#[test]
fn frame_at_exact_ceiling_is_accepted() {
    let mut parser = FrameParser::new(32);
    let frame = frame(12, &[7_u8; 16]);
    assert_eq!(frame.len(), 32);

    assert_eq!(parser.feed(&frame), vec![ready(&frame)]);
}

#[test]
fn reset_drops_partial_frame() {
    let mut parser = FrameParser::default();
    let frame = frame(13, b"partial");
    assert!(parser.feed(&frame[..9]).is_empty());

    parser.reset();
    assert_eq!(parser.state(), ParseState::Empty);
    assert_eq!(parser.feed(&frame), vec![ready(&frame)]);
}

#[test]
fn empty_chunk_is_a_no_op() {
    let mut parser = FrameParser::default();
    assert!(parser.feed(&[]).is_empty());
    assert_eq!(parser.state(), ParseState::Empty);
}

#[test]
fn every_two_way_split_yields_one_frame() {
    let frame = encode_frame(14, 3, OP_REPLY, &[1_u8; 24]).expect("test frame fits");
    for cut in 0..=frame.len() {
        let mut parser = FrameParser::default();
        let events = feed_split(&mut parser, &frame, &[cut]);
        assert_eq!(events, vec![ready(&frame)], "split at {cut}");
    }
}

fn fragmented_frame_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    vec(any::<u8>(), 0..96).prop_flat_map(|body| {
        let total = body.len() + 16;
        (
            proptest::strategy::Just(body),
            vec(0..=total, 0..12).prop_map(|mut cuts| {
                cuts.sort_unstable();
                cuts
            }),
        )
    })
}

#[rstest]
#[case(128)]
#[case(256)]
fn generated_fragmentations_yield_exactly_one_frame(#[case] cases: u32) {
    let mut runner = deterministic_runner(cases);

    runner
        .run(&fragmented_frame_strategy(), |(body, cuts)| {
            let frame = frame(15, &body);
            let mut parser = FrameParser::default();
            let events = feed_split(&mut parser, &frame, &cuts);

            prop_assert_eq!(events, vec![ready(&frame)]);
            prop_assert_eq!(parser.state(), ParseState::Empty);
            Ok(())
        })
        .expect("every fragmentation should reassemble the frame");
}

#[test]
fn generated_frame_sequences_survive_fragmentation() {
    let mut runner = deterministic_runner(96);
    let strategy = (
        vec(vec(any::<u8>(), 0..48), 1..6),
        vec(1_usize..40, 1..64),
    );

    runner
        .run(&strategy, |(bodies, chunk_sizes)| {
            let frames: Vec<Bytes> = bodies
                .iter()
                .zip(0_i32..)
                .map(|(body, id)| frame(id, body))
                .collect();
            let wire: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();

            let mut parser = FrameParser::default();
            let mut events = Vec::new();
            let mut offset = 0;
            for size in chunk_sizes.iter().cycle() {
                if offset >= wire.len() {
                    break;
                }
                let end = (offset + size).min(wire.len());
                events.extend(parser.feed(&wire[offset..end]));
                offset = end;
            }

            let expected: Vec<ParseEvent> = frames.iter().map(ready).collect();
            prop_assert_eq!(events, expected);
            prop_assert!(parser.buffered() == 0);
            Ok(())
        })
        .expect("chunked frame sequences should reassemble in order");
}

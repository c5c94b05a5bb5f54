//! Property tests: framing must not depend on how input is split

use proptest::prelude::*;
use rstest::rstest;
use spdy_sans_io::{flags, status, Framer, FramerEvent, FramerState, SynReply, SynStream};

use super::support::{collect, flip_framer, framer, headers, simulate, CountingVisitor, TWO_STREAMS};

/// A compressed exchange exercising every frame type.
fn conversation(version: u16) -> Vec<u8> {
    let mut sender = framer(version, true);
    let mut wire = Vec::new();
    let syn = SynStream {
        stream_id: 1,
        associated_stream_id: 0,
        priority: 1,
        flags: flags::NONE,
        headers: headers(&[("method", "GET"), ("url", "/"), ("version", "HTTP/1.1")]),
    };
    let reply = SynReply {
        stream_id: 1,
        flags: flags::NONE,
        headers: headers(&[("status", "200 OK"), ("content-type", "text/plain")]),
    };
    let frames = [
        sender.create_syn_stream(&syn, true),
        sender.create_syn_reply(&reply, true),
        sender.create_data_frame(1, b"hello, world", flags::NONE),
        sender.create_noop(),
        sender.create_data_frame(1, b"", flags::DATA_FLAG_FIN),
        sender.create_fin_stream(1, status::OK),
    ];
    for frame in frames {
        wire.extend_from_slice(frame.unwrap().as_bytes());
    }
    wire
}

#[rstest]
#[case::whole(usize::MAX)]
#[case::single_bytes(1)]
#[case::headers_split(5)]
#[case::odd(13)]
fn test_fixed_chunk_sizes(#[case] chunk: usize) {
    let mut framer = flip_framer();
    let mut visitor = CountingVisitor::default();
    simulate(&mut framer, TWO_STREAMS, &[chunk], &mut visitor);

    assert_eq!(visitor.error_count, 0);
    assert_eq!(visitor.syn_frame_count, 2);
    assert_eq!(visitor.fin_frame_count, 2);
    assert_eq!(visitor.data_bytes, 24);
}

proptest! {
    #[test]
    fn prop_uncompressed_chunking_is_invisible(
        chunks in proptest::collection::vec(1usize..=32, 1..16)
    ) {
        let expected = flip_framer().process(TWO_STREAMS).unwrap();
        let mut framer = flip_framer();
        let events = collect(&mut framer, TWO_STREAMS, &chunks);
        prop_assert_eq!(events, expected);
        prop_assert!(!framer.has_error());
    }

    #[test]
    fn prop_compressed_chunking_is_invisible(
        version in 1u16..=2,
        chunks in proptest::collection::vec(1usize..=32, 1..16)
    ) {
        let wire = conversation(version);
        let expected = framer(version, true).process(&wire).unwrap();
        prop_assert_eq!(expected.len(), 6);

        let mut receiver = framer(version, true);
        let events = collect(&mut receiver, &wire, &chunks);
        prop_assert_eq!(events, expected);
    }

    #[test]
    fn prop_arbitrary_input_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        compression in any::<bool>()
    ) {
        let mut framer: Framer = framer(2, compression);
        let mut events: Vec<FramerEvent> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let consumed = framer.consume(&data[offset..], &mut events);
            prop_assert!(consumed <= data.len() - offset);
            offset += consumed;
            match framer.state() {
                FramerState::Done => framer.reset(),
                FramerState::Error => break,
                _ => prop_assert_eq!(offset, data.len()),
            }
        }
    }
}

//! Tests for frame construction (structs -> bytes -> framer)

use rstest::rstest;
use spdy_sans_io::{
    control_type, flags, priority, status, ControlFrame, FinStream, Framer, FramerConfig,
    FramerError, FramerEvent, SynReply, SynStream,
};

use super::support::{framer, headers};

fn sample_syn(version: u16) -> SynStream {
    SynStream {
        stream_id: 7,
        associated_stream_id: if version == 1 { 0 } else { 3 },
        priority: 2,
        flags: flags::NONE,
        headers: headers(&[
            ("method", "GET"),
            ("url", "/index.html"),
            ("version", "HTTP/1.1"),
            ("accept", "text/html\0text/plain"),
        ]),
    }
}

#[rstest]
#[case::flip_raw(1, false)]
#[case::flip_compressed(1, true)]
#[case::spdy2_raw(2, false)]
#[case::spdy2_compressed(2, true)]
fn test_syn_stream_roundtrip(#[case] version: u16, #[case] compression: bool) {
    let mut sender = framer(version, compression);
    let mut receiver = framer(version, compression);
    let syn = sample_syn(version);

    let frame = sender.create_syn_stream(&syn, true).unwrap();
    assert_eq!(frame.control_type(), Some(control_type::SYN_STREAM));
    assert_eq!(frame.stream_id(), Some(7));

    let events = receiver.process(frame.as_bytes()).unwrap();
    assert_eq!(events, vec![FramerEvent::Control(ControlFrame::SynStream(syn))]);
}

#[rstest]
#[case::flip_raw(1, false)]
#[case::spdy2_compressed(2, true)]
fn test_syn_reply_with_fin_roundtrip(#[case] version: u16, #[case] compression: bool) {
    let mut sender = framer(version, compression);
    let mut receiver = framer(version, compression);
    let reply = SynReply {
        stream_id: 7,
        flags: flags::CONTROL_FLAG_FIN,
        headers: headers(&[("status", "200"), ("version", "HTTP/1.1")]),
    };

    let frame = sender.create_syn_reply(&reply, true).unwrap();
    let events = receiver.process(frame.as_bytes()).unwrap();

    assert_eq!(
        events,
        vec![
            FramerEvent::Control(ControlFrame::SynReply(reply)),
            FramerEvent::StreamData { stream_id: 7, data: vec![] },
        ]
    );
}

#[test]
fn test_conversation_roundtrip() {
    let mut sender = framer(2, true);
    let mut receiver = framer(2, true);

    let mut wire = Vec::new();
    let mut expected = Vec::new();
    for stream_id in [1u32, 3, 5] {
        let url = format!("/item/{}", stream_id);
        let syn = SynStream {
            stream_id,
            associated_stream_id: 0,
            priority: priority::LOWEST,
            flags: flags::NONE,
            headers: headers(&[("url", url.as_str()), ("method", "GET")]),
        };
        wire.extend_from_slice(sender.create_syn_stream(&syn, true).unwrap().as_bytes());
        expected.push(FramerEvent::Control(ControlFrame::SynStream(syn)));

        let body = vec![stream_id as u8; 40];
        wire.extend_from_slice(sender.create_data_frame(stream_id, &body, flags::DATA_FLAG_FIN).unwrap().as_bytes());
        expected.push(FramerEvent::StreamData { stream_id, data: body });
        expected.push(FramerEvent::StreamData { stream_id, data: vec![] });
    }
    wire.extend_from_slice(sender.create_noop().unwrap().as_bytes());
    expected.push(FramerEvent::Control(ControlFrame::Noop));
    wire.extend_from_slice(sender.create_fin_stream(3, status::CANCEL).unwrap().as_bytes());
    expected.push(FramerEvent::Control(ControlFrame::FinStream(FinStream {
        stream_id: 3,
        flags: 0,
        status: status::CANCEL,
    })));

    assert_eq!(receiver.process(&wire).unwrap(), expected);
}

#[test]
fn test_data_frame_layout() {
    let framer = framer(1, false);
    let frame = framer.create_data_frame(0x0102_0304, b"abc", flags::DATA_FLAG_FIN).unwrap();

    assert_eq!(
        frame.as_bytes(),
        &[0x01, 0x02, 0x03, 0x04, 0x01, 0x00, 0x00, 0x03, b'a', b'b', b'c']
    );
    assert!(!frame.is_control());
    assert_eq!(frame.payload(), b"abc");
}

#[test]
fn test_noop_layout() {
    let framer = framer(2, false);
    assert_eq!(
        framer.create_noop().unwrap().as_bytes(),
        &[0x80, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn test_syn_reply_layout() {
    let mut framer = framer(1, false);
    let reply = SynReply {
        stream_id: 1,
        flags: flags::NONE,
        headers: headers(&[("aa", "bb")]),
    };
    let frame = framer.create_syn_reply(&reply, false).unwrap();

    assert_eq!(
        frame.as_bytes(),
        &[
            0x80, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x10,
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x02, b'a', b'a', 0x00, 0x02, b'b', b'b',
        ]
    );
}

#[test]
fn test_priority_byte() {
    let mut framer = framer(2, false);
    let mut syn = sample_syn(2);
    syn.priority = priority::LOWEST;
    let frame = framer.create_syn_stream(&syn, false).unwrap();

    // stream id (4) + associated id (4), then the priority byte
    assert_eq!(frame.payload()[8], 0xc0);
    assert_eq!(frame.payload()[9], 0x00);
}

#[test]
fn test_control_frame_over_limit() {
    let mut framer = Framer::with_config(
        FramerConfig::new()
            .with_version(2)
            .with_compression(false)
            .with_max_control_payload(32),
    );
    let syn = sample_syn(2);

    assert!(matches!(
        framer.create_syn_stream(&syn, true),
        Err(FramerError::ControlPayloadTooLarge { max: 32, .. })
    ));
}

#[test]
fn test_header_value_too_long() {
    let mut framer = framer(1, false);
    let long = "x".repeat(70_000);
    let reply = SynReply {
        stream_id: 1,
        flags: flags::NONE,
        headers: headers(&[("big", long.as_str())]),
    };
    assert!(framer.create_syn_reply(&reply, false).is_err());
}

#[rstest]
#[case::priority_above_lowest(2, 0x05, 0, 4, "priority", 4)]
#[case::reserved_stream_bit(2, 0x8000_0005, 0, 0, "stream_id", 0x8000_0005)]
#[case::reserved_associated_bit(2, 5, 0x8000_0001, 0, "associated_stream_id", 0x8000_0001)]
#[case::associated_on_flip(1, 5, 9, 0, "associated_stream_id", 9)]
fn test_syn_stream_rejects_unencodable_fields(
    #[case] version: u16,
    #[case] stream_id: u32,
    #[case] associated_stream_id: u32,
    #[case] priority: u8,
    #[case] field: &str,
    #[case] value: u32,
) {
    let mut framer = framer(version, true);
    let mut syn = sample_syn(version);
    syn.stream_id = stream_id;
    syn.associated_stream_id = associated_stream_id;
    syn.priority = priority;

    match framer.create_syn_stream(&syn, true) {
        Err(FramerError::FieldOutOfRange { field: f, value: v }) => {
            assert_eq!(f, field);
            assert_eq!(v, value);
        }
        other => panic!("Expected FieldOutOfRange, got {:?}", other),
    }
}

#[test]
fn test_rejected_syn_stream_leaves_compression_in_step() {
    let mut sender = framer(2, true);
    let mut receiver = framer(2, true);
    let mut bad = sample_syn(2);
    bad.priority = 4;
    assert!(sender.create_syn_stream(&bad, true).is_err());

    let good = sample_syn(2);
    let frame = sender.create_syn_stream(&good, true).unwrap();
    assert_eq!(
        receiver.process(frame.as_bytes()).unwrap(),
        vec![FramerEvent::Control(ControlFrame::SynStream(good))]
    );
}

#[test]
fn test_reserved_stream_bit_rejected_on_every_frame() {
    let mut framer = framer(2, false);
    let id = 0x8000_0001;
    let expected = FramerError::FieldOutOfRange { field: "stream_id", value: id };
    let reply = SynReply {
        stream_id: id,
        flags: flags::NONE,
        headers: headers(&[("status", "200")]),
    };

    assert_eq!(framer.create_syn_reply(&reply, false), Err(expected.clone()));
    assert_eq!(framer.create_fin_stream(id, status::OK), Err(expected.clone()));
    assert_eq!(framer.create_data_frame(id, b"x", flags::NONE), Err(expected));
}

#[test]
fn test_unsupported_configured_version_builds_nothing() {
    let mut framer = framer(7, false);
    let reply = SynReply {
        stream_id: 1,
        flags: flags::NONE,
        headers: headers(&[("status", "200")]),
    };
    assert_eq!(framer.create_syn_stream(&sample_syn(2), false), Err(FramerError::UnsupportedVersion(7)));
    assert_eq!(framer.create_syn_reply(&reply, false), Err(FramerError::UnsupportedVersion(7)));
    assert_eq!(
        framer.process(&[0x80, 0x07, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]),
        Err(FramerError::UnsupportedVersion(7))
    );
}

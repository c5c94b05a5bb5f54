//! Tests for header block serialization

use spdy_sans_io::{join_values, HeaderBlock, HeaderBlockCodec, HeaderBlockError};

fn headers(pairs: &[(&str, &str)]) -> HeaderBlock {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_serialize_empty_block() {
    assert_eq!(HeaderBlockCodec::serialize(&HeaderBlock::new()).unwrap(), [0x00, 0x00]);
}

#[test]
fn test_serialize_is_name_ordered() {
    let raw = HeaderBlockCodec::serialize(&headers(&[("b", "2"), ("a", "1")])).unwrap();
    assert_eq!(
        raw,
        [0x00, 0x02, 0x00, 0x01, b'a', 0x00, 0x01, b'1', 0x00, 0x01, b'b', 0x00, 0x01, b'2']
    );
}

#[test]
fn test_serialize_empty_value() {
    let raw = HeaderBlockCodec::serialize(&headers(&[("x", "")])).unwrap();
    assert_eq!(raw, [0x00, 0x01, 0x00, 0x01, b'x', 0x00, 0x00]);
}

#[test]
fn test_serialize_multi_value() {
    let value = join_values(["gzip", "deflate"]);
    let raw = HeaderBlockCodec::serialize(&headers(&[("accept-encoding", value.as_str())])).unwrap();

    let mut expected = vec![0x00, 0x01, 0x00, 0x0f];
    expected.extend_from_slice(b"accept-encoding");
    expected.extend_from_slice(&[0x00, 0x0c]);
    expected.extend_from_slice(b"gzip\0deflate");
    assert_eq!(raw, expected);
}

#[test]
fn test_serialize_value_too_long() {
    let long = "v".repeat(65_536);
    assert_eq!(
        HeaderBlockCodec::serialize(&headers(&[("name", long.as_str())])),
        Err(HeaderBlockError::ValueTooLong(65_536))
    );
}

#[test]
fn test_serialize_max_length_value() {
    let long = "v".repeat(65_535);
    let raw = HeaderBlockCodec::serialize(&headers(&[("name", long.as_str())])).unwrap();
    assert_eq!(raw.len(), 2 + 2 + 4 + 2 + 65_535);
    assert_eq!(HeaderBlockCodec::parse(&raw).unwrap()["name"], long);
}

#[test]
fn test_encode_without_compression_is_serialize() {
    let mut codec = HeaderBlockCodec::new(false);
    let block = headers(&[("url", "/"), ("method", "GET")]);
    assert_eq!(codec.encode(&block).unwrap(), HeaderBlockCodec::serialize(&block).unwrap());
}

//! Wire layout shared by the builder and the framer.
//!
//! Every frame starts with an 8-byte common header (big-endian):
//!
//! ```text
//! control frame: |1| version (15) | type (16) | flags (8) | length (24) |
//! data frame:    |0| stream id (31)           | flags (8) | length (24) |
//! ```
//!
//! `length` counts payload bytes only and never includes the header itself.

use std::collections::BTreeMap;
use std::fmt;

/// Size of the common frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Stream id bits of a 32-bit stream id field (high bit reserved).
pub const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// Control bit in the first 16-bit word of the common header.
pub const CONTROL_FLAG_MASK: u16 = 0x8000;

/// Version bits in the first 16-bit word of a control frame.
pub const VERSION_MASK: u16 = 0x7fff;

/// Priority bits in the byte that follows the stream ids of a SYN_STREAM.
pub const PRIORITY_MASK: u8 = 0xc0;

/// Lower 24 bits of the flags/length word.
pub const LENGTH_MASK: u32 = 0x00ff_ffff;

/// Largest payload a single frame can declare.
pub const MAX_FRAME_PAYLOAD: usize = LENGTH_MASK as usize;

/// Protocol versions understood by this crate.
pub mod version {
    /// FLIP layout: SYN_STREAM has no associated stream id.
    pub const FLIP_1: u16 = 1;
    /// SYN_STREAM carries an associated stream id.
    pub const SPDY_2: u16 = 2;

    pub const SUPPORTED: [u16; 2] = [FLIP_1, SPDY_2];

    pub fn is_supported(version: u16) -> bool {
        SUPPORTED.contains(&version)
    }
}

/// Control frame types. The set is closed; anything else is a protocol violation.
pub mod control_type {
    pub const SYN_STREAM: u16 = 1;
    pub const SYN_REPLY: u16 = 2;
    pub const FIN_STREAM: u16 = 3;
    pub const NOOP: u16 = 4;

    pub fn name(frame_type: u16) -> Option<&'static str> {
        match frame_type {
            SYN_STREAM => Some("SYN_STREAM"),
            SYN_REPLY => Some("SYN_REPLY"),
            FIN_STREAM => Some("FIN_STREAM"),
            NOOP => Some("NOOP"),
            _ => None,
        }
    }
}

/// Frame flags
pub mod flags {
    pub const NONE: u8 = 0x0;
    /// Final frame of a stream in this direction. Shared by control and data frames.
    pub const FIN: u8 = 0x1;

    pub const CONTROL_FLAG_NONE: u8 = NONE;
    pub const CONTROL_FLAG_FIN: u8 = FIN;
    pub const DATA_FLAG_NONE: u8 = NONE;
    pub const DATA_FLAG_FIN: u8 = FIN;
}

/// SYN_STREAM priorities. Only the top two bits of the priority byte are used.
pub mod priority {
    pub const HIGHEST: u8 = 0;
    pub const LOWEST: u8 = 3;
}

/// FIN_STREAM status codes
pub mod status {
    pub const OK: u32 = 0;
    pub const PROTOCOL_ERROR: u32 = 1;
    pub const INVALID_STREAM: u32 = 2;
    pub const REFUSED_STREAM: u32 = 3;
    pub const UNSUPPORTED_VERSION: u32 = 4;
    pub const CANCEL: u32 = 5;
    pub const INTERNAL_ERROR: u32 = 6;
}

/// Header name to value mapping carried by SYN_STREAM and SYN_REPLY.
///
/// A value may hold several sub-values separated by NUL; see
/// [`split_values`](crate::header_block::split_values).
pub type HeaderBlock = BTreeMap<String, String>;

/// Fixed payload bytes that precede the header block of a SYN_STREAM.
pub fn syn_stream_prefix_len(version: u16) -> usize {
    if version == version::FLIP_1 {
        6
    } else {
        10
    }
}

/// Fixed payload bytes that precede the header block of a SYN_REPLY.
pub const SYN_REPLY_PREFIX_LEN: usize = 6;

/// Exact payload size of a FIN_STREAM.
pub const FIN_STREAM_PAYLOAD_LEN: usize = 8;

/// A parsed common frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    Control {
        version: u16,
        frame_type: u16,
        flags: u8,
        length: u32,
    },
    Data {
        stream_id: u32,
        flags: u8,
        length: u32,
    },
}

impl FrameHeader {
    /// Parse the first 8 bytes of `data`. Returns `None` on a short buffer.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let header: &[u8; FRAME_HEADER_SIZE] = data.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
        let first = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let flags = header[4];
        let length = u32::from_be_bytes([0, header[5], header[6], header[7]]);

        if header[0] & 0x80 != 0 {
            Some(FrameHeader::Control {
                version: (first >> 16) as u16 & VERSION_MASK,
                frame_type: first as u16,
                flags,
                length,
            })
        } else {
            Some(FrameHeader::Data {
                stream_id: first & STREAM_ID_MASK,
                flags,
                length,
            })
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, FrameHeader::Control { .. })
    }

    pub fn flags(&self) -> u8 {
        match *self {
            FrameHeader::Control { flags, .. } | FrameHeader::Data { flags, .. } => flags,
        }
    }

    /// Declared payload length
    pub fn length(&self) -> u32 {
        match *self {
            FrameHeader::Control { length, .. } | FrameHeader::Data { length, .. } => length,
        }
    }

    pub fn is_fin(&self) -> bool {
        self.flags() & flags::FIN != 0
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.length() as usize
    }

    /// Serialize back to the 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let first = match *self {
            FrameHeader::Control { version, frame_type, .. } => {
                (u32::from(CONTROL_FLAG_MASK | (version & VERSION_MASK)) << 16) | u32::from(frame_type)
            }
            FrameHeader::Data { stream_id, .. } => stream_id & STREAM_ID_MASK,
        };
        let second = (u32::from(self.flags()) << 24) | (self.length() & LENGTH_MASK);
        let mut out = [0u8; FRAME_HEADER_SIZE];
        out[..4].copy_from_slice(&first.to_be_bytes());
        out[4..].copy_from_slice(&second.to_be_bytes());
        out
    }
}

/// A complete frame in wire form: common header followed by exactly
/// `length` payload bytes. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    header: FrameHeader,
}

impl Frame {
    /// Wrap serialized bytes, checking that the declared length matches.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let header = FrameHeader::parse(&bytes)?;
        if header.total_size() != bytes.len() {
            return None;
        }
        Some(Self { bytes, header })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn is_control(&self) -> bool {
        self.header.is_control()
    }

    pub fn flags(&self) -> u8 {
        self.header.flags()
    }

    /// Payload length (header excluded)
    pub fn length(&self) -> usize {
        self.header.length() as usize
    }

    /// Control frame type, `None` for data frames.
    pub fn control_type(&self) -> Option<u16> {
        match self.header {
            FrameHeader::Control { frame_type, .. } => Some(frame_type),
            FrameHeader::Data { .. } => None,
        }
    }

    /// Stream id of a data frame, or of a control frame that names one.
    pub fn stream_id(&self) -> Option<u32> {
        match self.header {
            FrameHeader::Data { stream_id, .. } => Some(stream_id),
            FrameHeader::Control { frame_type, .. } if frame_type == control_type::NOOP => None,
            FrameHeader::Control { .. } => {
                let raw = self.payload().get(..4)?;
                Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) & STREAM_ID_MASK)
            }
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header)
            .field("payload_len", &self.length())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStream {
    pub stream_id: u32,
    /// Always 0 for version 1 frames, which have no field for it.
    pub associated_stream_id: u32,
    /// 0 (highest) ..= 3 (lowest)
    pub priority: u8,
    pub flags: u8,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReply {
    pub stream_id: u32,
    pub flags: u8,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinStream {
    pub stream_id: u32,
    pub flags: u8,
    pub status: u32,
}

/// A fully decoded control frame, delivered to the visitor after its
/// header block (if any) has been decompressed and parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    SynStream(SynStream),
    SynReply(SynReply),
    FinStream(FinStream),
    Noop,
}

impl ControlFrame {
    pub fn frame_type(&self) -> u16 {
        match self {
            ControlFrame::SynStream(_) => control_type::SYN_STREAM,
            ControlFrame::SynReply(_) => control_type::SYN_REPLY,
            ControlFrame::FinStream(_) => control_type::FIN_STREAM,
            ControlFrame::Noop => control_type::NOOP,
        }
    }

    pub fn stream_id(&self) -> Option<u32> {
        match self {
            ControlFrame::SynStream(f) => Some(f.stream_id),
            ControlFrame::SynReply(f) => Some(f.stream_id),
            ControlFrame::FinStream(f) => Some(f.stream_id),
            ControlFrame::Noop => None,
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            ControlFrame::SynStream(f) => f.flags,
            ControlFrame::SynReply(f) => f.flags,
            ControlFrame::FinStream(f) => f.flags,
            ControlFrame::Noop => flags::NONE,
        }
    }

    pub fn is_fin(&self) -> bool {
        self.flags() & flags::FIN != 0
    }

    pub fn headers(&self) -> Option<&HeaderBlock> {
        match self {
            ControlFrame::SynStream(f) => Some(&f.headers),
            ControlFrame::SynReply(f) => Some(&f.headers),
            _ => None,
        }
    }
}

//! Error types for the buffer, header-block and framer layers.
//!
//! - [`BufferError`]: bounds and ownership failures in [`FrameBuilder`](crate::FrameBuilder)
//!   and [`FrameReader`](crate::FrameReader). [`BufferError::ShortRead`] is the
//!   "need more data" outcome, not a protocol violation by itself.
//! - [`HeaderBlockError`]: compression and header-block parsing failures.
//! - [`FramerError`]: the sticky error recorded by a [`Framer`](crate::Framer).

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// Fewer bytes remain than the read requires.
    #[error("short read: need {needed} bytes, {remaining} remaining")]
    ShortRead { needed: usize, remaining: usize },

    #[error("write to a read-only buffer")]
    ReadOnly,

    #[error("buffer allocation failed: {0}")]
    AllocationFailed(TryReserveError),

    /// Length-prefixed strings carry a 16-bit length.
    #[error("string of {0} bytes exceeds 65535")]
    StringTooLong(usize),

    #[error("offset {offset} + {len} is outside the written region")]
    OffsetOutOfBounds { offset: usize, len: usize },
}

impl BufferError {
    pub fn is_short_read(&self) -> bool {
        matches!(self, BufferError::ShortRead { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HeaderBlockError {
    #[error("duplicate header name: {0:?}")]
    DuplicateHeader(String),

    #[error("header block truncated")]
    Truncated,

    #[error("{0} unexpected bytes after the last header")]
    TrailingBytes(usize),

    #[error("header name or value is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} headers exceed the 16-bit count field")]
    TooManyHeaders(usize),

    #[error("header string of {0} bytes exceeds 65535")]
    ValueTooLong(usize),

    #[error("failed to initialise compressor: {0}")]
    CompressionInit(String),

    #[error("compression failed: {0}")]
    Compression(String),

    /// Includes feeding a block that was never compressed into the decompressor.
    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("decompressed {actual} bytes, block declared {declared}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("declared uncompressed length {declared} exceeds limit {max}")]
    DeclaredLengthTooLarge { declared: usize, max: usize },

    #[error(transparent)]
    Buffer(BufferError),
}

impl From<BufferError> for HeaderBlockError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::ShortRead { .. } => HeaderBlockError::Truncated,
            BufferError::StringTooLong(len) => HeaderBlockError::ValueTooLong(len),
            other => HeaderBlockError::Buffer(other),
        }
    }
}

/// Why a [`Framer`](crate::Framer) entered its error state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramerError {
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown control frame type {0}")]
    UnknownControlType(u16),

    #[error("invalid {kind} control frame: payload length {length}")]
    InvalidControlFrame { kind: &'static str, length: usize },

    #[error("control frame payload of {length} bytes exceeds limit {max}")]
    ControlPayloadTooLarge { length: usize, max: usize },

    #[error("data frame payload of {length} bytes exceeds limit {max}")]
    DataPayloadTooLarge { length: usize, max: usize },

    /// A frame field does not fit its wire encoding.
    #[error("{field} {value:#x} cannot be encoded")]
    FieldOutOfRange { field: &'static str, value: u32 },

    /// Input ended while a frame was still incomplete.
    #[error("input ended with {missing} bytes of the current frame outstanding")]
    TruncatedFrame { missing: usize },

    #[error("frame is not a control frame carrying a header block")]
    NotAHeaderFrame,

    #[error("header block: {0}")]
    HeaderBlock(#[from] HeaderBlockError),

    #[error("buffer: {0}")]
    Buffer(#[from] BufferError),
}

//! Framer configuration.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::{version, MAX_FRAME_PAYLOAD};

static COMPRESSION_DEFAULT: AtomicBool = AtomicBool::new(true);

/// Set whether newly configured framers compress header blocks.
///
/// Only affects [`FramerConfig::default`]; existing framers keep their setting.
pub fn set_compression_default(enabled: bool) {
    COMPRESSION_DEFAULT.store(enabled, Ordering::Relaxed);
}

pub fn compression_default() -> bool {
    COMPRESSION_DEFAULT.load(Ordering::Relaxed)
}

/// Default cap on a control frame payload (64 KiB).
pub const DEFAULT_MAX_CONTROL_PAYLOAD: usize = 64 * 1024;

/// Default cap on the declared uncompressed size of a header block (1 MiB).
pub const DEFAULT_MAX_HEADER_BLOCK: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramerConfig {
    /// Protocol version written to and expected in control frames.
    pub version: u16,
    /// Compress header blocks through the connection's zlib contexts.
    pub compression: bool,
    pub max_control_payload: usize,
    pub max_data_payload: usize,
    pub max_header_block: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            version: version::SPDY_2,
            compression: compression_default(),
            max_control_payload: DEFAULT_MAX_CONTROL_PAYLOAD,
            max_data_payload: MAX_FRAME_PAYLOAD,
            max_header_block: DEFAULT_MAX_HEADER_BLOCK,
        }
    }
}

impl FramerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Clamped to the 24-bit length field.
    pub fn with_max_control_payload(mut self, max: usize) -> Self {
        self.max_control_payload = max.min(MAX_FRAME_PAYLOAD);
        self
    }

    /// Clamped to the 24-bit length field.
    pub fn with_max_data_payload(mut self, max: usize) -> Self {
        self.max_data_payload = max.min(MAX_FRAME_PAYLOAD);
        self
    }

    pub fn with_max_header_block(mut self, max: usize) -> Self {
        self.max_header_block = max;
        self
    }
}

//! spdy-sans-io: A minimal, sans-I/O SPDY/FLIP framer
//!
//! This crate parses and builds the frames of the experimental SPDY (FLIP)
//! multiplexing protocol. Header blocks are carried in SYN_STREAM and
//! SYN_REPLY frames and are optionally compressed with a zlib stream that is
//! shared by every frame on a connection.
//!
//! # Features
//!
//! - **Sans-I/O Design**: No sockets, no async runtime; feed it bytes
//! - **Incremental**: Frames may arrive split at any byte boundary
//! - **Versions 1 and 2**: FLIP (version 1) and SPDY/2 control frame layouts
//! - **Header Compression**: zlib with the protocol's preset dictionary
//! - **Deferred Compression**: Build frames uncompressed, compress them later
//!
//! # Quick Start
//!
//! ```rust
//! use spdy_sans_io::{ControlFrame, Framer, FramerConfig, FramerEvent};
//!
//! let mut framer = Framer::with_config(
//!     FramerConfig::new().with_version(1).with_compression(false),
//! );
//!
//! // SYN_STREAM for stream 1 carrying the header "hh: vv"
//! let frame_bytes = [
//!     0x80, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10,
//!     0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
//!     0x00, 0x02, b'h', b'h', 0x00, 0x02, b'v', b'v',
//! ];
//! let events = framer.process(&frame_bytes).unwrap();
//!
//! for event in events {
//!     match event {
//!         FramerEvent::Control(ControlFrame::SynStream(syn)) => {
//!             println!("SYN_STREAM {}: {:?}", syn.stream_id, syn.headers);
//!         }
//!         FramerEvent::StreamData { stream_id, data } => {
//!             println!("Data on stream {}: {} bytes", stream_id, data.len());
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: wire constants, [`FrameHeader`], [`Frame`] and control frame types
//! - [`builder`]: growable big-endian frame buffer and its reader
//! - [`header_block`]: header block serialization and zlib compression
//! - [`framer`]: the incremental parser and frame constructors
//!
//! It does NOT provide transport, stream state tracking or flow control.

pub mod builder;
pub mod config;
pub mod error;
pub mod framer;
pub mod header_block;
pub mod protocol;

pub use builder::{FrameBuilder, FrameReader};
pub use config::{compression_default, set_compression_default, FramerConfig};
pub use error::{BufferError, FramerError, HeaderBlockError};
pub use framer::{Framer, FramerEvent, FramerState, FramerVisitor};
pub use header_block::{
    join_values, split_values, HeaderBlockCodec, HeaderCompressor, HeaderDecompressor,
    HEADER_DICTIONARY, VALUE_SEPARATOR,
};
pub use protocol::{
    control_type, flags, priority, status, version, ControlFrame, FinStream, Frame, FrameHeader,
    HeaderBlock, SynReply, SynStream, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD,
};

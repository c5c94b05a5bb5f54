//! Incremental SPDY/FLIP framer.
//!
//! Sans-I/O: the transport pushes whatever bytes it has into
//! [`Framer::consume`], and the framer reports completed frames to a
//! [`FramerVisitor`]. One frame is parsed at a time:
//!
//! ```text
//! RESET -> READING_COMMON_HEADER -> READING_CONTROL_PAYLOAD -> [READING_HEADER_BLOCK] -> DONE
//!                                \-> READING_DATA_PAYLOAD --------------------------/
//! ```
//!
//! `consume` stops at the end of each frame and returns how many bytes it
//! took. The caller calls [`Framer::reset`] and resubmits the rest.
//! [`Framer::process`] wraps that loop. `ERROR` is sticky until `reset`.

use std::fmt;

use log::{debug, trace, warn};

use crate::builder::{FrameBuilder, FrameReader};
use crate::config::FramerConfig;
use crate::error::{BufferError, FramerError};
use crate::header_block::HeaderBlockCodec;
use crate::protocol::{
    control_type, priority, syn_stream_prefix_len, version, ControlFrame, FinStream, Frame, FrameHeader,
    SynReply, SynStream, FIN_STREAM_PAYLOAD_LEN, FRAME_HEADER_SIZE, PRIORITY_MASK,
    STREAM_ID_MASK, SYN_REPLY_PREFIX_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Reset,
    ReadingCommonHeader,
    ReadingControlPayload,
    ReadingHeaderBlock,
    ReadingDataPayload,
    Done,
    Error,
}

impl fmt::Display for FramerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramerState::Reset => "RESET",
            FramerState::ReadingCommonHeader => "READING_COMMON_HEADER",
            FramerState::ReadingControlPayload => "READING_CONTROL_PAYLOAD",
            FramerState::ReadingHeaderBlock => "READING_HEADER_BLOCK",
            FramerState::ReadingDataPayload => "READING_DATA_PAYLOAD",
            FramerState::Done => "DONE",
            FramerState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Bytes taken from the input by one reading step, and whether the step failed.
type Step = (usize, Result<(), FramerError>);

/// Receives parsed frames in wire order.
///
/// A zero-length `on_stream_data` call marks the end of the stream (FIN).
pub trait FramerVisitor {
    /// Header blocks are fully decoded before this fires.
    fn on_control_frame(&mut self, frame: &ControlFrame);

    fn on_stream_data(&mut self, stream_id: u32, data: &[u8]);

    /// Fires exactly once, when the framer enters the error state.
    fn on_error(&mut self, error: &FramerError);
}

/// Owned form of a visitor callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    Control(ControlFrame),
    StreamData { stream_id: u32, data: Vec<u8> },
    Error(FramerError),
}

/// Collects callbacks as events.
impl FramerVisitor for Vec<FramerEvent> {
    fn on_control_frame(&mut self, frame: &ControlFrame) {
        self.push(FramerEvent::Control(frame.clone()));
    }

    fn on_stream_data(&mut self, stream_id: u32, data: &[u8]) {
        self.push(FramerEvent::StreamData {
            stream_id,
            data: data.to_vec(),
        });
    }

    fn on_error(&mut self, error: &FramerError) {
        self.push(FramerEvent::Error(error.clone()));
    }
}

/// Frame parser and builder for one connection.
///
/// Owns the connection's header compression contexts, so frames must be
/// created and consumed in the order they are sent and received.
#[derive(Debug)]
pub struct Framer {
    config: FramerConfig,
    state: FramerState,
    error: Option<FramerError>,
    header_buf: [u8; FRAME_HEADER_SIZE],
    header_len: usize,
    current: Option<FrameHeader>,
    /// Payload bytes of the current frame received so far
    payload: Vec<u8>,
    /// Bytes still expected by the current reading state
    remaining: usize,
    codec: HeaderBlockCodec,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    pub fn with_config(config: FramerConfig) -> Self {
        let codec = HeaderBlockCodec::new(config.compression).with_max_block(config.max_header_block);
        Self {
            config,
            state: FramerState::Reset,
            error: None,
            header_buf: [0; FRAME_HEADER_SIZE],
            header_len: 0,
            current: None,
            payload: Vec::new(),
            remaining: 0,
            codec,
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// The error that put the framer into [`FramerState::Error`].
    pub fn error_code(&self) -> Option<&FramerError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Get ready for the next frame. This is the only way out of `DONE` and `ERROR`.
    ///
    /// Compression contexts are connection state and are kept.
    pub fn reset(&mut self) {
        self.transition(FramerState::Reset);
        self.error = None;
        self.header_len = 0;
        self.current = None;
        self.payload.clear();
        self.remaining = 0;
    }

    fn transition(&mut self, next: FramerState) {
        if self.state != next {
            trace!("framer {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, error: FramerError, visitor: &mut dyn FramerVisitor) {
        warn!("framer error in {}: {}", self.state, error);
        self.transition(FramerState::Error);
        visitor.on_error(&error);
        self.error = Some(error);
    }

    /// Feed bytes and return how many were consumed.
    ///
    /// Stops early when a frame completes (state `DONE`) or on error. Bytes of
    /// an incomplete frame are kept internally and count as consumed.
    pub fn consume<V: FramerVisitor>(&mut self, data: &[u8], visitor: &mut V) -> usize {
        let visitor: &mut dyn FramerVisitor = visitor;
        let mut consumed = 0;
        loop {
            let before = self.state;
            let input = &data[consumed..];
            let (n, result) = match self.state {
                FramerState::Done | FramerState::Error => break,
                FramerState::Reset => {
                    self.transition(FramerState::ReadingCommonHeader);
                    (0, Ok(()))
                }
                FramerState::ReadingCommonHeader => self.read_common_header(input),
                FramerState::ReadingControlPayload => self.read_control_payload(input, visitor),
                FramerState::ReadingHeaderBlock => self.read_header_block(input, visitor),
                FramerState::ReadingDataPayload => self.read_data_payload(input, visitor),
            };
            // Bytes taken by a failing step are gone from the caller's input.
            consumed += n;
            if let Err(error) = result {
                self.fail(error, visitor);
                break;
            }
            if n == 0 && self.state == before {
                break;
            }
        }
        consumed
    }

    /// Signal end of input. A partially read frame is reported as truncated.
    pub fn finish<V: FramerVisitor>(&mut self, visitor: &mut V) -> Result<(), FramerError> {
        let missing = match self.state {
            FramerState::Reset | FramerState::Done => return Ok(()),
            FramerState::Error => {
                return Err(self.error.clone().unwrap_or(FramerError::TruncatedFrame { missing: 0 }));
            }
            FramerState::ReadingCommonHeader if self.header_len == 0 => return Ok(()),
            FramerState::ReadingCommonHeader => FRAME_HEADER_SIZE - self.header_len,
            _ => self
                .current
                .map(|h| h.length() as usize - self.payload.len())
                .unwrap_or(0),
        };
        let error = FramerError::TruncatedFrame { missing };
        self.fail(error.clone(), visitor);
        Err(error)
    }

    /// Parse every frame in `data`, resetting between frames.
    ///
    /// Trailing bytes of an incomplete frame stay buffered for the next call.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<FramerEvent>, FramerError> {
        let mut events: Vec<FramerEvent> = Vec::new();
        let mut offset = 0;
        loop {
            if self.state == FramerState::Done {
                self.reset();
            }
            offset += self.consume(&data[offset..], &mut events);
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
            if offset == data.len() && self.state != FramerState::Done {
                break;
            }
        }
        Ok(events)
    }

    fn read_common_header(&mut self, input: &[u8]) -> Step {
        let take = (FRAME_HEADER_SIZE - self.header_len).min(input.len());
        self.header_buf[self.header_len..self.header_len + take].copy_from_slice(&input[..take]);
        self.header_len += take;
        if self.header_len < FRAME_HEADER_SIZE {
            return (take, Ok(()));
        }
        (take, self.accept_common_header())
    }

    /// Validate a complete common header and pick the next reading state.
    fn accept_common_header(&mut self) -> Result<(), FramerError> {
        let header = FrameHeader::parse(&self.header_buf).ok_or(BufferError::ShortRead {
            needed: FRAME_HEADER_SIZE,
            remaining: self.header_len,
        })?;
        self.payload.clear();
        match header {
            FrameHeader::Control { version, frame_type, length, .. } => {
                let length = length as usize;
                if version != self.config.version || !version::is_supported(version) {
                    return Err(FramerError::UnsupportedVersion(version));
                }
                let kind = control_type::name(frame_type)
                    .ok_or(FramerError::UnknownControlType(frame_type))?;
                if length > self.config.max_control_payload {
                    return Err(FramerError::ControlPayloadTooLarge {
                        length,
                        max: self.config.max_control_payload,
                    });
                }
                let (prefix, valid) = match frame_type {
                    control_type::SYN_STREAM => {
                        let prefix = syn_stream_prefix_len(version);
                        (prefix, length >= prefix)
                    }
                    control_type::SYN_REPLY => (SYN_REPLY_PREFIX_LEN, length >= SYN_REPLY_PREFIX_LEN),
                    control_type::FIN_STREAM => (FIN_STREAM_PAYLOAD_LEN, length == FIN_STREAM_PAYLOAD_LEN),
                    _ => (0, length == 0),
                };
                if !valid {
                    return Err(FramerError::InvalidControlFrame { kind, length });
                }
                self.payload
                    .try_reserve(length)
                    .map_err(BufferError::AllocationFailed)?;
                self.remaining = prefix;
                self.transition(FramerState::ReadingControlPayload);
            }
            FrameHeader::Data { length, .. } => {
                let length = length as usize;
                if length > self.config.max_data_payload {
                    return Err(FramerError::DataPayloadTooLarge {
                        length,
                        max: self.config.max_data_payload,
                    });
                }
                self.remaining = length;
                self.transition(FramerState::ReadingDataPayload);
            }
        }
        self.current = Some(header);
        Ok(())
    }

    /// Move up to `remaining` bytes of `input` into the payload buffer.
    fn fill_payload(&mut self, input: &[u8]) -> Result<usize, FramerError> {
        let take = self.remaining.min(input.len());
        self.payload
            .try_reserve(take)
            .map_err(BufferError::AllocationFailed)?;
        self.payload.extend_from_slice(&input[..take]);
        self.remaining -= take;
        Ok(take)
    }

    fn current_header(&self) -> Result<FrameHeader, FramerError> {
        self.current.ok_or(FramerError::Buffer(BufferError::ShortRead {
            needed: FRAME_HEADER_SIZE,
            remaining: self.header_len,
        }))
    }

    fn read_control_payload(&mut self, input: &[u8], visitor: &mut dyn FramerVisitor) -> Step {
        match self.fill_payload(input) {
            Ok(n) if self.remaining > 0 => (n, Ok(())),
            Ok(n) => (n, self.complete_control_payload(visitor)),
            Err(error) => (0, Err(error)),
        }
    }

    fn complete_control_payload(&mut self, visitor: &mut dyn FramerVisitor) -> Result<(), FramerError> {
        let header = self.current_header()?;
        let FrameHeader::Control { frame_type, flags, length, .. } = header else {
            return Err(FramerError::UnknownControlType(0));
        };
        match frame_type {
            control_type::SYN_STREAM | control_type::SYN_REPLY => {
                self.remaining = length as usize - self.payload.len();
                self.transition(FramerState::ReadingHeaderBlock);
            }
            control_type::FIN_STREAM => {
                let mut reader = FrameReader::new(&self.payload);
                let frame = FinStream {
                    stream_id: reader.read_u32()? & STREAM_ID_MASK,
                    flags,
                    status: reader.read_u32()?,
                };
                debug!("FIN_STREAM stream={} status={}", frame.stream_id, frame.status);
                visitor.on_control_frame(&ControlFrame::FinStream(frame));
                self.transition(FramerState::Done);
            }
            _ => {
                trace!("NOOP");
                visitor.on_control_frame(&ControlFrame::Noop);
                self.transition(FramerState::Done);
            }
        }
        Ok(())
    }

    fn read_header_block(&mut self, input: &[u8], visitor: &mut dyn FramerVisitor) -> Step {
        match self.fill_payload(input) {
            Ok(n) if self.remaining > 0 => (n, Ok(())),
            Ok(n) => (n, self.complete_header_block(visitor)),
            Err(error) => (0, Err(error)),
        }
    }

    fn complete_header_block(&mut self, visitor: &mut dyn FramerVisitor) -> Result<(), FramerError> {
        let header = self.current_header()?;
        let FrameHeader::Control { version, frame_type, flags, .. } = header else {
            return Err(FramerError::NotAHeaderFrame);
        };
        let mut reader = FrameReader::new(&self.payload);
        let stream_id = reader.read_u32()? & STREAM_ID_MASK;
        let frame = if frame_type == control_type::SYN_STREAM {
            let associated_stream_id = if version == version::FLIP_1 {
                0
            } else {
                reader.read_u32()? & STREAM_ID_MASK
            };
            let priority = (reader.read_u8()? & PRIORITY_MASK) >> 6;
            reader.skip(1)?;
            let headers = self.codec.decode(reader.rest())?;
            debug!("SYN_STREAM stream={} headers={}", stream_id, headers.len());
            ControlFrame::SynStream(SynStream {
                stream_id,
                associated_stream_id,
                priority,
                flags,
                headers,
            })
        } else {
            reader.skip(2)?;
            let headers = self.codec.decode(reader.rest())?;
            debug!("SYN_REPLY stream={} headers={}", stream_id, headers.len());
            ControlFrame::SynReply(SynReply {
                stream_id,
                flags,
                headers,
            })
        };

        visitor.on_control_frame(&frame);
        if frame.is_fin() {
            visitor.on_stream_data(stream_id, &[]);
        }
        self.transition(FramerState::Done);
        Ok(())
    }

    fn read_data_payload(&mut self, input: &[u8], visitor: &mut dyn FramerVisitor) -> Step {
        match self.fill_payload(input) {
            Ok(n) if self.remaining > 0 => (n, Ok(())),
            Ok(n) => (n, self.complete_data_payload(visitor)),
            Err(error) => (0, Err(error)),
        }
    }

    fn complete_data_payload(&mut self, visitor: &mut dyn FramerVisitor) -> Result<(), FramerError> {
        let header = self.current_header()?;
        let FrameHeader::Data { stream_id, .. } = header else {
            return Err(FramerError::NotAHeaderFrame);
        };
        debug!("DATA stream={} len={} fin={}", stream_id, self.payload.len(), header.is_fin());
        // An empty callback means EOF, so empty non-FIN frames deliver nothing.
        if !self.payload.is_empty() {
            visitor.on_stream_data(stream_id, &self.payload);
        }
        if header.is_fin() {
            visitor.on_stream_data(stream_id, &[]);
        }
        self.transition(FramerState::Done);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Frame creation
    // ------------------------------------------------------------------------

    /// Version written into created control frames.
    fn control_version(&self) -> Result<u16, FramerError> {
        let version = self.config.version;
        if version::is_supported(version) {
            Ok(version)
        } else {
            Err(FramerError::UnsupportedVersion(version))
        }
    }

    /// Stream ids are 31 bits; the top bit is reserved.
    fn check_stream_id(field: &'static str, value: u32) -> Result<u32, FramerError> {
        if value & !STREAM_ID_MASK != 0 {
            return Err(FramerError::FieldOutOfRange { field, value });
        }
        Ok(value)
    }

    fn check_control_size(&self, length: usize) -> Result<(), FramerError> {
        if length > self.config.max_control_payload {
            return Err(FramerError::ControlPayloadTooLarge {
                length,
                max: self.config.max_control_payload,
            });
        }
        Ok(())
    }

    /// Serialize `headers` and compress them when both `compress` and the
    /// framer's compression setting allow it.
    fn header_block_bytes(&mut self, raw: Vec<u8>, compress: bool) -> Result<Vec<u8>, FramerError> {
        if compress && self.config.compression {
            Ok(self.codec.compress(&raw)?)
        } else {
            Ok(raw)
        }
    }

    fn finish_control(&self, builder: FrameBuilder<'_>) -> Result<Frame, FramerError> {
        let frame = builder.finish_frame()?;
        self.check_control_size(frame.length())?;
        debug!("created {:?}", frame);
        Ok(frame)
    }

    /// Build a SYN_STREAM. With `compress` false the header block is left raw
    /// for a later [`compress_frame`](Self::compress_frame).
    ///
    /// Version 1 frames have no associated stream id field, so it must be 0.
    /// Priority must be in `0..=3`.
    pub fn create_syn_stream(&mut self, syn: &SynStream, compress: bool) -> Result<Frame, FramerError> {
        let version = self.control_version()?;
        let stream_id = Self::check_stream_id("stream_id", syn.stream_id)?;
        let associated_stream_id = Self::check_stream_id("associated_stream_id", syn.associated_stream_id)?;
        if version == version::FLIP_1 && associated_stream_id != 0 {
            return Err(FramerError::FieldOutOfRange {
                field: "associated_stream_id",
                value: associated_stream_id,
            });
        }
        if syn.priority > priority::LOWEST {
            return Err(FramerError::FieldOutOfRange {
                field: "priority",
                value: u32::from(syn.priority),
            });
        }
        let raw = HeaderBlockCodec::serialize(&syn.headers)?;
        let prefix = syn_stream_prefix_len(version);
        self.check_control_size(prefix + raw.len())?;
        let block = self.header_block_bytes(raw, compress)?;

        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE + prefix + block.len())?;
        builder.write_control_header(version, control_type::SYN_STREAM, syn.flags)?;
        builder.write_u32(stream_id)?;
        if version != version::FLIP_1 {
            builder.write_u32(associated_stream_id)?;
        }
        builder.write_u8(syn.priority << 6)?;
        builder.write_u8(0)?;
        builder.write_bytes(&block)?;
        self.finish_control(builder)
    }

    pub fn create_syn_reply(&mut self, reply: &SynReply, compress: bool) -> Result<Frame, FramerError> {
        let version = self.control_version()?;
        let stream_id = Self::check_stream_id("stream_id", reply.stream_id)?;
        let raw = HeaderBlockCodec::serialize(&reply.headers)?;
        self.check_control_size(SYN_REPLY_PREFIX_LEN + raw.len())?;
        let block = self.header_block_bytes(raw, compress)?;

        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE + SYN_REPLY_PREFIX_LEN + block.len())?;
        builder.write_control_header(version, control_type::SYN_REPLY, reply.flags)?;
        builder.write_u32(stream_id)?;
        builder.write_u16(0)?;
        builder.write_bytes(&block)?;
        self.finish_control(builder)
    }

    pub fn create_fin_stream(&self, stream_id: u32, status: u32) -> Result<Frame, FramerError> {
        let version = self.control_version()?;
        let stream_id = Self::check_stream_id("stream_id", stream_id)?;
        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE + FIN_STREAM_PAYLOAD_LEN)?;
        builder.write_control_header(version, control_type::FIN_STREAM, 0)?;
        builder.write_u32(stream_id)?;
        builder.write_u32(status)?;
        self.finish_control(builder)
    }

    pub fn create_noop(&self) -> Result<Frame, FramerError> {
        let version = self.control_version()?;
        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE)?;
        builder.write_control_header(version, control_type::NOOP, 0)?;
        self.finish_control(builder)
    }

    pub fn create_data_frame(&self, stream_id: u32, data: &[u8], flags: u8) -> Result<Frame, FramerError> {
        let stream_id = Self::check_stream_id("stream_id", stream_id)?;
        if data.len() > self.config.max_data_payload {
            return Err(FramerError::DataPayloadTooLarge {
                length: data.len(),
                max: self.config.max_data_payload,
            });
        }
        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE + data.len())?;
        builder.write_data_header(stream_id, flags)?;
        builder.write_bytes(data)?;
        let frame = builder.finish_frame()?;
        debug!("created {:?}", frame);
        Ok(frame)
    }

    // ------------------------------------------------------------------------
    // Deferred compression
    // ------------------------------------------------------------------------

    /// Offset of the header block inside the payload of a SYN frame.
    fn header_block_offset(frame: &Frame) -> Option<usize> {
        match *frame.header() {
            FrameHeader::Control { version, frame_type: control_type::SYN_STREAM, .. } => {
                Some(syn_stream_prefix_len(version))
            }
            FrameHeader::Control { frame_type: control_type::SYN_REPLY, .. } => Some(SYN_REPLY_PREFIX_LEN),
            _ => None,
        }
    }

    fn rebuild_with_block(&self, frame: &Frame, prefix: usize, block: &[u8]) -> Result<Frame, FramerError> {
        let FrameHeader::Control { version, frame_type, flags, .. } = *frame.header() else {
            return Err(FramerError::NotAHeaderFrame);
        };
        let fixed = frame
            .payload()
            .get(..prefix)
            .ok_or(FramerError::InvalidControlFrame {
                kind: control_type::name(frame_type).unwrap_or("control"),
                length: frame.length(),
            })?;
        let mut builder = FrameBuilder::with_capacity(FRAME_HEADER_SIZE + prefix + block.len())?;
        builder.write_control_header(version, frame_type, flags)?;
        builder.write_bytes(fixed)?;
        builder.write_bytes(block)?;
        self.finish_control(builder)
    }

    /// Compress the header block of an uncompressed SYN_STREAM or SYN_REPLY.
    ///
    /// Other frames, and all frames when compression is disabled, are
    /// returned unchanged.
    pub fn compress_frame(&mut self, frame: &Frame) -> Result<Frame, FramerError> {
        let Some(prefix) = Self::header_block_offset(frame) else {
            return Ok(frame.clone());
        };
        if !self.config.compression {
            return Ok(frame.clone());
        }
        let raw = frame.payload().get(prefix..).unwrap_or_default();
        let block = self.codec.compress(raw)?;
        self.rebuild_with_block(frame, prefix, &block)
    }

    /// Inverse of [`compress_frame`](Self::compress_frame). Fails on a frame
    /// whose header block was never compressed.
    pub fn decompress_frame(&mut self, frame: &Frame) -> Result<Frame, FramerError> {
        let Some(prefix) = Self::header_block_offset(frame) else {
            return Ok(frame.clone());
        };
        if !self.config.compression {
            return Ok(frame.clone());
        }
        let block = frame.payload().get(prefix..).unwrap_or_default();
        let raw = self.codec.decompress(block)?;
        self.rebuild_with_block(frame, prefix, &raw)
    }

    /// Decode the header block of a SYN_STREAM or SYN_REPLY frame.
    pub fn parse_header_block(&mut self, frame: &Frame) -> Result<crate::HeaderBlock, FramerError> {
        let prefix = Self::header_block_offset(frame).ok_or(FramerError::NotAHeaderFrame)?;
        let block = frame.payload().get(prefix..).unwrap_or_default();
        Ok(self.codec.decode(block)?)
    }
}

//! Header block encoding and compression.
//!
//! A header block is serialized as
//!
//! ```text
//! count (16) | count x [ name len (16) | name | value len (16) | value ]
//! ```
//!
//! and, with compression enabled, sent as a 32-bit uncompressed length
//! followed by the zlib-compressed bytes. Both directions of a connection use
//! one long-lived zlib stream seeded with [`HEADER_DICTIONARY`]; each block is
//! terminated with a sync flush, so blocks must be encoded and decoded in
//! exactly the order they travel on the wire.

use std::collections::btree_map::Entry;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::trace;

use crate::builder::{FrameBuilder, FrameReader};
use crate::config::DEFAULT_MAX_HEADER_BLOCK;
use crate::error::HeaderBlockError;
use crate::protocol::HeaderBlock;

/// Preset zlib dictionary shared by both ends of a connection.
pub const HEADER_DICTIONARY: &[u8] = concat!(
    "optionsgetheadpostputdeletetraceacceptaccept-charsetaccept-encodingaccept-",
    "languageauthorizationexpectfromhostif-modified-sinceif-matchif-none-matchi",
    "f-rangeif-unmodifiedsincemax-forwardsproxy-authorizationrangerefererteuser",
    "-agent10010120020120220320420520630030130230330430530630740040140240340440",
    "5406407408409410411412413414415416417500501502503504505accept-rangesageeta",
    "glocationproxy-authenticatepublicretry-afterservervarywarningwww-authentic",
    "ateallowcontent-basecontent-encodingcache-controlconnectiondatetrailertran",
    "sfer-encodingupgradeviawarningcontent-languagecontent-lengthcontent-locati",
    "oncontent-md5content-rangecontent-typeetagexpireslast-modifiedset-cookieMo",
    "ndayTuesdayWednesdayThursdayFridaySaturdaySundayJanFebMarAprMayJunJulAugSe",
    "pOctNovDecchunkedtext/htmlimage/pngimage/jpgimage/gifapplication/xmlapplic",
    "ation/xhtmltext/plainpublicmax-agecharset=iso-8859-1utf-8gzipdeflateHTTP/1",
    ".1statusversionurl\0",
)
.as_bytes();

/// Separator between sub-values of a multi-valued header.
pub const VALUE_SEPARATOR: char = '\0';

/// Split a NUL-separated header value into its sub-values.
pub fn split_values(value: &str) -> std::str::Split<'_, char> {
    value.split(VALUE_SEPARATOR)
}

/// Join sub-values into one NUL-separated header value.
pub fn join_values<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(VALUE_SEPARATOR);
        }
        out.push_str(value.as_ref());
    }
    out
}

/// Outbound zlib context of one connection.
pub struct HeaderCompressor {
    inner: Compress,
}

impl std::fmt::Debug for HeaderCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCompressor")
            .field("total_in", &self.inner.total_in())
            .field("total_out", &self.inner.total_out())
            .finish()
    }
}

impl HeaderCompressor {
    pub fn new() -> Result<Self, HeaderBlockError> {
        let mut inner = Compress::new(Compression::default(), true);
        inner
            .set_dictionary(HEADER_DICTIONARY)
            .map_err(|e| HeaderBlockError::CompressionInit(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Compress `input` and sync-flush, so the peer can decode it without
    /// waiting for later blocks.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, HeaderBlockError> {
        let mut out = Vec::new();
        out.try_reserve(input.len() / 2 + 64)
            .map_err(|e| HeaderBlockError::Compression(e.to_string()))?;
        let mut consumed = 0;
        loop {
            let before = self.inner.total_in();
            self.inner
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| HeaderBlockError::Compression(e.to_string()))?;
            consumed += (self.inner.total_in() - before) as usize;

            // Spare output space after a sync flush means the flush completed.
            if consumed == input.len() && out.len() < out.capacity() {
                break;
            }
            let grow = out.capacity().max(64);
            out.try_reserve(grow)
                .map_err(|e| HeaderBlockError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
}

/// Inbound zlib context of one connection.
pub struct HeaderDecompressor {
    inner: Decompress,
}

impl std::fmt::Debug for HeaderDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderDecompressor")
            .field("total_in", &self.inner.total_in())
            .field("total_out", &self.inner.total_out())
            .finish()
    }
}

impl Default for HeaderDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderDecompressor {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
        }
    }

    /// Inflate `input`, which must expand to exactly `expected_len` bytes.
    pub fn decompress(&mut self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, HeaderBlockError> {
        let mut out = Vec::new();
        // One spare byte so an overlong block shows up as a mismatch.
        out.try_reserve_exact(expected_len + 1)
            .map_err(|e| HeaderBlockError::Decompression(e.to_string()))?;

        let mut consumed = 0;
        loop {
            let before_in = self.inner.total_in();
            let before_out = out.len();
            let result = self.inner
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync);
            let read = (self.inner.total_in() - before_in) as usize;
            consumed += read;

            match result {
                Ok(Status::StreamEnd) => {
                    return Err(HeaderBlockError::Decompression(
                        "peer terminated the compression stream".to_string(),
                    ));
                }
                Ok(_) => {
                    let progressed = read > 0 || out.len() > before_out;
                    if consumed == input.len() || out.len() == out.capacity() || !progressed {
                        break;
                    }
                }
                Err(err) => match err.needs_dictionary() {
                    Some(_) => {
                        trace!("loading preset header dictionary");
                        self.inner
                            .set_dictionary(HEADER_DICTIONARY)
                            .map_err(|e| HeaderBlockError::Decompression(e.to_string()))?;
                    }
                    None => return Err(HeaderBlockError::Decompression(err.to_string())),
                },
            }
        }

        if out.len() != expected_len {
            return Err(HeaderBlockError::LengthMismatch {
                declared: expected_len,
                actual: out.len(),
            });
        }
        if consumed != input.len() {
            return Err(HeaderBlockError::Decompression(format!(
                "{} compressed bytes left unread",
                input.len() - consumed
            )));
        }
        Ok(out)
    }
}

/// Encodes and decodes header blocks for one connection.
///
/// The zlib contexts are created on first use and then live as long as the
/// codec. Never share a codec between connections.
#[derive(Debug)]
pub struct HeaderBlockCodec {
    compression: bool,
    max_block: usize,
    compressor: Option<HeaderCompressor>,
    decompressor: Option<HeaderDecompressor>,
}

impl Default for HeaderBlockCodec {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HeaderBlockCodec {
    pub fn new(compression: bool) -> Self {
        Self {
            compression,
            max_block: DEFAULT_MAX_HEADER_BLOCK,
            compressor: None,
            decompressor: None,
        }
    }

    /// Limit on the uncompressed size of a block, applied in both directions.
    pub fn with_max_block(mut self, max_block: usize) -> Self {
        self.max_block = max_block;
        self
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression
    }

    /// Serialize `headers` without compression.
    pub fn serialize(headers: &HeaderBlock) -> Result<Vec<u8>, HeaderBlockError> {
        let count = u16::try_from(headers.len())
            .map_err(|_| HeaderBlockError::TooManyHeaders(headers.len()))?;
        let mut builder = FrameBuilder::new();
        builder.write_u16(count)?;
        for (name, value) in headers {
            builder.write_string(name)?;
            builder.write_string(value)?;
        }
        Ok(builder.take())
    }

    /// Parse an uncompressed header block. A repeated name fails the whole block.
    pub fn parse(raw: &[u8]) -> Result<HeaderBlock, HeaderBlockError> {
        let mut reader = FrameReader::new(raw);
        let count = reader.read_u16()?;
        let mut headers = HeaderBlock::new();
        for _ in 0..count {
            let name = read_utf8(&mut reader)?;
            let value = read_utf8(&mut reader)?;
            match headers.entry(name) {
                Entry::Occupied(entry) => {
                    return Err(HeaderBlockError::DuplicateHeader(entry.key().clone()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
        if !reader.is_empty() {
            return Err(HeaderBlockError::TrailingBytes(reader.remaining()));
        }
        Ok(headers)
    }

    /// Serialize, then compress if compression is enabled.
    pub fn encode(&mut self, headers: &HeaderBlock) -> Result<Vec<u8>, HeaderBlockError> {
        let raw = Self::serialize(headers)?;
        if self.compression {
            self.compress(&raw)
        } else {
            Ok(raw)
        }
    }

    /// Decompress if compression is enabled, then parse.
    pub fn decode(&mut self, block: &[u8]) -> Result<HeaderBlock, HeaderBlockError> {
        if self.compression {
            let raw = self.decompress(block)?;
            Self::parse(&raw)
        } else {
            Self::parse(block)
        }
    }

    /// Compress an already serialized block: length prefix plus zlib bytes.
    ///
    /// Blocks larger than the decode limit are refused, so every block this
    /// codec produces is one a peer with the same limit accepts.
    pub fn compress(&mut self, raw: &[u8]) -> Result<Vec<u8>, HeaderBlockError> {
        if raw.len() > self.max_block {
            return Err(HeaderBlockError::DeclaredLengthTooLarge {
                declared: raw.len(),
                max: self.max_block,
            });
        }
        let declared = u32::try_from(raw.len()).map_err(|_| HeaderBlockError::DeclaredLengthTooLarge {
            declared: raw.len(),
            max: u32::MAX as usize,
        })?;
        let compressor = match self.compressor.take() {
            Some(compressor) => compressor,
            None => HeaderCompressor::new()?,
        };
        let compressed = self.compressor.insert(compressor).compress(raw)?;

        let mut builder = FrameBuilder::with_capacity(4 + compressed.len())?;
        builder.write_u32(declared)?;
        builder.write_bytes(&compressed)?;
        trace!("compressed header block {} -> {} bytes", raw.len(), builder.len());
        Ok(builder.take())
    }

    /// Undo [`compress`](Self::compress). A block that was never compressed
    /// is rejected, not passed through.
    pub fn decompress(&mut self, block: &[u8]) -> Result<Vec<u8>, HeaderBlockError> {
        let mut reader = FrameReader::new(block);
        let declared = reader.read_u32()? as usize;
        if declared > self.max_block {
            return Err(HeaderBlockError::DeclaredLengthTooLarge {
                declared,
                max: self.max_block,
            });
        }
        self.decompressor
            .get_or_insert_with(HeaderDecompressor::new)
            .decompress(reader.rest(), declared)
    }
}

fn read_utf8(reader: &mut FrameReader<'_>) -> Result<String, HeaderBlockError> {
    let bytes = reader.read_string()?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| HeaderBlockError::InvalidUtf8)
}

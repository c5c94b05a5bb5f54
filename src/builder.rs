//! Growable frame buffer and bounds-checked read cursor.
//!
//! A [`FrameBuilder`] either owns a growable buffer (write-capable) or wraps
//! borrowed bytes (read-only, every write fails with [`BufferError::ReadOnly`]).
//! Reads go through a [`FrameReader`], which hands out zero-copy slices and
//! reports [`BufferError::ShortRead`] instead of reading past the end.

use crate::error::BufferError;
use crate::protocol::{
    Frame, CONTROL_FLAG_MASK, FRAME_HEADER_SIZE, LENGTH_MASK, MAX_FRAME_PAYLOAD,
    STREAM_ID_MASK, VERSION_MASK,
};

const INITIAL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum Storage<'a> {
    Owned(Vec<u8>),
    ReadOnly(&'a [u8]),
}

#[derive(Debug, Clone)]
pub struct FrameBuilder<'a> {
    storage: Storage<'a>,
}

impl Default for FrameBuilder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder<'static> {
    pub fn new() -> Self {
        Self {
            storage: Storage::Owned(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    /// Start with room for `capacity` bytes. Allocation failure is reported, not aborted on.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(BufferError::AllocationFailed)?;
        Ok(Self {
            storage: Storage::Owned(buf),
        })
    }
}

impl<'a> FrameBuilder<'a> {
    /// Wrap externally supplied bytes for reading only.
    pub fn from_bytes(data: &'a [u8]) -> Self {
        Self {
            storage: Storage::ReadOnly(data),
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.storage, Storage::ReadOnly(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(buf) => buf,
            Storage::ReadOnly(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor over everything written so far.
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader::new(self.as_slice())
    }

    fn owned_mut(&mut self) -> Result<&mut Vec<u8>, BufferError> {
        match &mut self.storage {
            Storage::Owned(buf) => Ok(buf),
            Storage::ReadOnly(_) => Err(BufferError::ReadOnly),
        }
    }

    /// Append `length` zeroed bytes and return them for the caller to fill.
    ///
    /// Capacity grows by doubling, and at least to the requested size. The
    /// returned slice borrows the builder, so it cannot outlive the next write.
    pub fn begin_write(&mut self, length: usize) -> Result<&mut [u8], BufferError> {
        let buf = self.owned_mut()?;
        let offset = buf.len();
        let needed = offset
            .checked_add(length)
            .ok_or(BufferError::OffsetOutOfBounds { offset, len: length })?;
        if needed > buf.capacity() {
            let target = needed.max(buf.capacity().saturating_mul(2));
            buf.try_reserve_exact(target - offset)
                .map_err(BufferError::AllocationFailed)?;
        }
        buf.resize(needed, 0);
        Ok(&mut buf[offset..])
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BufferError> {
        self.begin_write(1)?[0] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), BufferError> {
        self.begin_write(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), BufferError> {
        self.begin_write(4)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.begin_write(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Write a 16-bit length prefix followed by the raw bytes.
    pub fn write_string(&mut self, value: impl AsRef<[u8]>) -> Result<(), BufferError> {
        let value = value.as_ref();
        let len = u16::try_from(value.len()).map_err(|_| BufferError::StringTooLong(value.len()))?;
        self.write_u16(len)?;
        self.write_bytes(value)
    }

    /// Overwrite four already-written bytes at `offset`.
    pub fn write_u32_at(&mut self, offset: usize, value: u32) -> Result<(), BufferError> {
        let buf = self.owned_mut()?;
        let slot = offset
            .checked_add(4)
            .and_then(|end| buf.get_mut(offset..end))
            .ok_or(BufferError::OffsetOutOfBounds { offset, len: 4 })?;
        slot.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Common header of a control frame with a zero length placeholder.
    pub fn write_control_header(&mut self, version: u16, frame_type: u16, flags: u8) -> Result<(), BufferError> {
        self.write_u16(CONTROL_FLAG_MASK | (version & VERSION_MASK))?;
        self.write_u16(frame_type)?;
        self.write_u32(u32::from(flags) << 24)
    }

    /// Common header of a data frame with a zero length placeholder.
    pub fn write_data_header(&mut self, stream_id: u32, flags: u8) -> Result<(), BufferError> {
        self.write_u32(stream_id & STREAM_ID_MASK)?;
        self.write_u32(u32::from(flags) << 24)
    }

    /// Patch the length placeholder with the payload size and hand out the frame.
    pub fn finish_frame(mut self) -> Result<Frame, BufferError> {
        let total = self.len();
        if total < FRAME_HEADER_SIZE {
            return Err(BufferError::ShortRead {
                needed: FRAME_HEADER_SIZE,
                remaining: total,
            });
        }
        let payload_len = total - FRAME_HEADER_SIZE;
        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(BufferError::OffsetOutOfBounds {
                offset: FRAME_HEADER_SIZE,
                len: payload_len,
            });
        }
        let flags = self.as_slice()[4];
        self.write_u32_at(4, (u32::from(flags) << 24) | (payload_len as u32 & LENGTH_MASK))?;

        Frame::from_bytes(self.take()).ok_or(BufferError::OffsetOutOfBounds {
            offset: 0,
            len: total,
        })
    }

    /// Give up the bytes. A read-only builder returns a copy.
    pub fn take(self) -> Vec<u8> {
        match self.storage {
            Storage::Owned(buf) => buf,
            Storage::ReadOnly(data) => data.to_vec(),
        }
    }
}

/// Zero-copy, bounds-checked cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything not yet read.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BufferError> {
        if len > self.remaining() {
            return Err(BufferError::ShortRead {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), BufferError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a 16-bit length prefix and that many bytes.
    ///
    /// On a short read the cursor is left where it was.
    pub fn read_string(&mut self) -> Result<&'a [u8], BufferError> {
        let start = self.pos;
        let len = self.read_u16()?;
        self.read_bytes(usize::from(len)).inspect_err(|_| self.pos = start)
    }
}

//! Symmetrical cursor streams over byte spans. `SourceStream` reads a
//! descrambled payload, `SinkStream` fills the payload region of an outbound
//! frame. All integers are little-endian on the wire; strings are
//! NUL-terminated; booleans are a single byte.

use crate::shared::{ErrorType, ProtocolError, ProtocolResult};
use byteorder::{ByteOrder, LittleEndian};

/// Read-only cursor over a byte span.
pub struct SourceStream<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> SourceStream<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> SourceStream<'a> {
        SourceStream { data, cursor: 0 }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    #[inline]
    pub fn seek(&mut self, offset: usize) -> ProtocolResult<()> {
        if offset > self.data.len() {
            return Err(ProtocolError::Fatal(ErrorType::PayloadUnderflow));
        }
        self.cursor = offset;
        Ok(())
    }

    #[inline]
    fn take(&mut self, count: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < count {
            return Err(ProtocolError::Fatal(ErrorType::PayloadUnderflow));
        }
        let slice = &self.data[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }

    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    #[inline]
    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Booleans are one byte; zero is false, anything else is true.
    #[inline]
    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    pub fn read_bytes(&mut self, out: &mut [u8]) -> ProtocolResult<()> {
        out.copy_from_slice(self.take(out.len())?);
        Ok(())
    }

    /// Reads bytes until the NUL terminator; the terminator is consumed but
    /// not returned. Bounded by the remaining payload.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let tail = &self.data[self.cursor..];
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::Fatal(ErrorType::PayloadUnderflow))?;

        let value = String::from_utf8(tail[..nul].to_vec())
            .map_err(|_| ProtocolError::Fatal(ErrorType::StringEncoding))?;

        self.cursor += nul + 1;
        Ok(value)
    }
}

/// Write cursor over a mutable byte span.
pub struct SinkStream<'a> {
    data: &'a mut [u8],
    cursor: usize,
}

impl<'a> SinkStream<'a> {
    #[inline]
    pub fn new(data: &'a mut [u8]) -> SinkStream<'a> {
        SinkStream { data, cursor: 0 }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.data.len() - self.cursor
    }

    #[inline]
    pub fn seek(&mut self, offset: usize) -> ProtocolResult<()> {
        if offset > self.data.len() {
            return Err(ProtocolError::Fatal(ErrorType::SinkOverflow));
        }
        self.cursor = offset;
        Ok(())
    }

    #[inline]
    fn reserve(&mut self, count: usize) -> ProtocolResult<&mut [u8]> {
        if self.free_capacity() < count {
            return Err(ProtocolError::Fatal(ErrorType::SinkOverflow));
        }
        let slice = &mut self.data[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        LittleEndian::write_u16(self.reserve(2)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        LittleEndian::write_u32(self.reserve(4)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> ProtocolResult<()> {
        LittleEndian::write_u64(self.reserve(8)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> ProtocolResult<()> {
        LittleEndian::write_i32(self.reserve(4)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> ProtocolResult<()> {
        LittleEndian::write_f32(self.reserve(4)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) -> ProtocolResult<()> {
        self.write_u8(value as u8)
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Writes the string bytes followed by the NUL terminator.
    #[inline]
    pub fn write_string(&mut self, value: &str) -> ProtocolResult<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    /// The filled prefix of the underlying span.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.data[..self.cursor]
    }
}

/// Typed payload deserialization. Implemented by every inbound command.
pub trait WireRead: Sized {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self>;
}

/// Typed payload serialization. Implemented by every outbound command.
pub trait WireWrite {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()>;
}

/// Ties a command record to its wire id.
pub trait Command {
    const ID: u16;
}

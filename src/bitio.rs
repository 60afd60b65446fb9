//! Bit-level I/O shared by both codecs' entropy stages.
//!
//! Bits are written and read MSB-first on top of `bitstream-io`'s big-endian
//! reader/writer. The reader tracks how many bits remain so an over-long read
//! fails with [`CompressError::OutOfData`] before anything is consumed.

use bitstream_io::{BigEndian, BitRead, BitWrite};

use crate::error::{CompressError, Result};

/// Appends bit fields to an in-memory buffer.
pub struct BitWriter {
    inner: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
    bits_written: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            inner: bitstream_io::BitWriter::endian(Vec::new(), BigEndian),
            bits_written: 0,
        }
    }

    /// Write the low `count` bits (0–32) of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<()> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(());
        }
        let masked = if count == 32 { value } else { value & ((1u32 << count) - 1) };
        self.inner.write(count, masked)?;
        self.bits_written += u64::from(count);
        Ok(())
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(u32::from(bit), 1)
    }

    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Pad the last partial byte with zero bits and return the buffer.
    pub fn flush(mut self) -> Result<Vec<u8>> {
        self.inner.byte_align()?;
        Ok(self.inner.into_writer())
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes bit fields from a byte slice in [`BitWriter`] order.
pub struct BitReader<'a> {
    inner: bitstream_io::BitReader<&'a [u8], BigEndian>,
    total_bits: u64,
    consumed: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: bitstream_io::BitReader::endian(data, BigEndian),
            total_bits: data.len() as u64 * 8,
            consumed: 0,
        }
    }

    /// Read `count` bits (0–32) and return them right-aligned.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        if self.bits_remaining() < u64::from(count) {
            return Err(CompressError::OutOfData);
        }
        let value: u32 = self.inner.read(count)?;
        self.consumed += u64::from(count);
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn bits_remaining(&self) -> u64 {
        self.total_bits - self.consumed
    }
}

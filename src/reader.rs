//! Endian-aware cursor over a byte buffer.
//!
//! All binary parsing in the crate flows through [`ByteReader`]; it is the
//! only type on the read path that understands byte order. Every read fails
//! with [`Error::InvalidFile`] when fewer bytes remain than requested, so
//! truncated sections surface as format errors rather than panics.

use byteorder::{ByteOrder, NativeEndian};

use crate::error::{Error, Result};
use crate::util::cstr_len;

/// A cursor over a borrowed byte buffer with optional byte swapping.
///
/// `swap_bytes` mirrors the owning slice's endianness flag: when true,
/// multi-byte integers in the buffer are in the opposite byte order from the
/// host and are swapped on read.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
    swap_bytes: bool,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `data` starting at position 0.
    pub fn new(data: &'a [u8], swap_bytes: bool) -> Self {
        Self {
            data,
            position: 0,
            swap_bytes,
        }
    }

    /// Returns the current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns the total buffer length.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns whether reads byte-swap into host order.
    #[inline]
    pub fn swap_bytes(&self) -> bool {
        self.swap_bytes
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::invalid(format!(
                "truncated data: need {n} bytes at offset {}, have {}",
                self.position,
                self.remaining()
            )));
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a 16-bit integer, swapping into host order if required.
    pub fn read_u16(&mut self) -> Result<u16> {
        let value = NativeEndian::read_u16(self.take(2)?);
        Ok(if self.swap_bytes {
            value.swap_bytes()
        } else {
            value
        })
    }

    /// Reads a 32-bit integer, swapping into host order if required.
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = NativeEndian::read_u32(self.take(4)?);
        Ok(if self.swap_bytes {
            value.swap_bytes()
        } else {
            value
        })
    }

    /// Reads a 64-bit integer, swapping into host order if required.
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = NativeEndian::read_u64(self.take(8)?);
        Ok(if self.swap_bytes {
            value.swap_bytes()
        } else {
            value
        })
    }

    /// Reads an unsigned LEB128 value.
    ///
    /// Accumulates 7-bit groups little-endian until a byte with the high bit
    /// clear; fails if the buffer ends first.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let b = self.read_u8().map_err(|_| {
                Error::invalid(format!(
                    "truncated ULEB128 at offset {}",
                    self.position
                ))
            })?;
            result |= u64::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::invalid(format!(
                    "ULEB128 overflow at offset {}",
                    self.position
                )));
            }
        }
    }

    /// Reads exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a NUL-terminated byte string and consumes the terminator.
    ///
    /// An empty slice is returned when a NUL sits at the current position.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let rest = &data[self.position..];
        let len = cstr_len(rest);
        if len == rest.len() {
            return Err(Error::invalid(format!(
                "unterminated string at offset {}",
                self.position
            )));
        }
        let s = &rest[..len];
        self.position += len + 1;
        Ok(s)
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::invalid(format!(
                "seek to {offset} beyond buffer of {} bytes",
                self.data.len()
            )));
        }
        self.position = offset;
        Ok(())
    }

    /// Advances the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::invalid(format!(
                "skip of {n} bytes at offset {} beyond buffer end",
                self.position
            )));
        }
        self.position += n;
        Ok(())
    }
}

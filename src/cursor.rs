//! Forward-only byte cursor used by every decoder.
//!
//! [`ByteReader`] wraps any `BufRead`, counts the absolute offset of every
//! byte it hands out, offers a single byte of lookahead and can tee consumed
//! bytes into a capture buffer (the index checksum covers a span whose length
//! is only known after it has been parsed).  End of input inside a fixed or
//! declared-length field is reported as [`ErrorKind::Truncated`] at the offset
//! the field started.

use std::io::{self, BufRead, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{ErrorKind, Result, Section, XzError};

pub struct ByteReader<R> {
    inner:   R,
    offset:  u64,
    section: Section,
    capture: Option<Vec<u8>>,
}

impl<R: BufRead> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_offset(inner, 0, Section::StreamHeader)
    }

    /// A reader whose first byte sits at `offset` in the enclosing stream.
    pub fn with_offset(inner: R, offset: u64, section: Section) -> Self {
        Self { inner, offset, section, capture: None }
    }

    pub fn offset(&self) -> u64 { self.offset }

    pub fn section(&self) -> Section { self.section }

    pub fn set_section(&mut self, section: Section) {
        self.section = section;
    }

    pub fn into_inner(self) -> R { self.inner }

    // ── Errors ──────────────────────────────────────────────────────────────

    /// Format error in the current section at `offset`.
    pub fn error_at(&self, kind: ErrorKind, offset: u64) -> XzError {
        XzError::format(kind, self.section, offset)
    }

    fn io_error(&self, start: u64, err: io::Error) -> XzError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            self.error_at(ErrorKind::Truncated, start)
        } else {
            XzError::Io(err)
        }
    }

    // ── Lookahead ───────────────────────────────────────────────────────────

    /// Next byte without consuming it; `None` at end of input.
    pub fn peek_u8(&mut self) -> Result<Option<u8>> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(XzError::Io(e)),
            }
        }
    }

    // ── Fixed-width reads ───────────────────────────────────────────────────

    pub fn read_byte(&mut self) -> Result<u8> {
        let start = self.offset;
        self.read_u8().map_err(|e| self.io_error(start, e))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let start = self.offset;
        self.read_u32::<LittleEndian>().map_err(|e| self.io_error(start, e))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let start = self.offset;
        let mut buf = [0u8; N];
        self.read_exact(&mut buf).map_err(|e| self.io_error(start, e))?;
        Ok(buf)
    }

    /// Read exactly `len` bytes.  The allocation grows with the bytes that
    /// are actually present, never with the declared length alone.
    pub fn read_vec(&mut self, len: u64) -> Result<Vec<u8>> {
        let start = self.offset;
        let mut buf = Vec::new();
        let got = self.by_ref().take(len).read_to_end(&mut buf).map_err(XzError::Io)?;
        if (got as u64) < len {
            return Err(self.error_at(ErrorKind::Truncated, start));
        }
        Ok(buf)
    }

    /// Fill as much of `buf` as the input allows; returns the count read.
    /// A short count means end of input.
    pub fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(XzError::Io(e)),
            }
        }
        Ok(filled)
    }

    /// Read `len` padding bytes and require every one of them to be zero.
    pub fn read_padding(&mut self, len: usize) -> Result<Vec<u8>> {
        let start = self.offset;
        let padding = self.read_vec(len as u64)?;
        if let Some(pos) = padding.iter().position(|&b| b != 0) {
            return Err(self.error_at(ErrorKind::BadPadding, start + pos as u64));
        }
        Ok(padding)
    }

    // ── Capture ─────────────────────────────────────────────────────────────

    /// Start recording every consumed byte.
    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stop recording and return what was consumed since `begin_capture`.
    pub fn end_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }

    pub fn captured(&self) -> &[u8] {
        self.capture.as_deref().unwrap_or(&[])
    }
}

impl<R: BufRead> Read for ByteReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        if let Some(cap) = self.capture.as_mut() {
            cap.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}

//! Fixed-size framing around the blocks and index.
//!
//! ```text
//! header:  magic (6) | flags (2) | CRC-32 of flags (4)
//! footer:  CRC-32 (4) | backward size (4) | flags (2) | "YZ" (2)
//! padding: zero bytes in 4-byte units after the footer
//! ```
//!
//! The flags carry the check type in the low nibble of their second byte;
//! every other bit is reserved.  The footer's CRC-32 covers the backward
//! size and flags.

use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::check::{crc32, crc64};
use crate::cursor::ByteReader;
use crate::error::{ErrorKind, Result, Section, XzError};

pub const HEADER_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
pub const FOOTER_MAGIC: [u8; 2] = [b'Y', b'Z'];
pub const HEADER_SIZE: usize = 12;
pub const FOOTER_SIZE: usize = 12;
pub const PADDING_UNIT: usize = 4;

// ── Check type ───────────────────────────────────────────────────────────────

/// Integrity check applied to every block of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    None,
    Crc32,
    Crc64,
    Sha256,
    /// A nibble with no assigned algorithm; only its size is known.
    Reserved(u8),
}

impl CheckType {
    pub fn from_id(id: u8) -> Self {
        match id & 0x0F {
            0x0 => CheckType::None,
            0x1 => CheckType::Crc32,
            0x4 => CheckType::Crc64,
            0xA => CheckType::Sha256,
            n   => CheckType::Reserved(n),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            CheckType::None        => 0x0,
            CheckType::Crc32       => 0x1,
            CheckType::Crc64       => 0x4,
            CheckType::Sha256      => 0xA,
            CheckType::Reserved(n) => n & 0x0F,
        }
    }

    /// Byte length of the check field; fixed per nibble range.
    pub fn size(self) -> usize {
        match self.id() {
            0x0        => 0,
            0x1..=0x3  => 4,
            0x4..=0x6  => 8,
            0x7..=0x9  => 16,
            0xA..=0xC  => 32,
            _          => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CheckType::None        => "none",
            CheckType::Crc32       => "crc32",
            CheckType::Crc64       => "crc64",
            CheckType::Sha256      => "sha256",
            CheckType::Reserved(_) => "reserved",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"   => Some(CheckType::None),
            "crc32"  => Some(CheckType::Crc32),
            "crc64"  => Some(CheckType::Crc64),
            "sha256" => Some(CheckType::Sha256),
            _        => None,
        }
    }

    /// Check value over `data`, little-endian.  `None` when this build cannot
    /// compute the algorithm.
    pub fn compute(self, data: &[u8]) -> Option<Vec<u8>> {
        match self {
            CheckType::None  => Some(Vec::new()),
            CheckType::Crc32 => Some(crc32(data, 0).to_le_bytes().to_vec()),
            CheckType::Crc64 => Some(crc64(data, 0).to_le_bytes().to_vec()),
            CheckType::Sha256 | CheckType::Reserved(_) => None,
        }
    }

    pub fn is_verifiable(self) -> bool {
        matches!(self, CheckType::None | CheckType::Crc32 | CheckType::Crc64)
    }
}

// ── Stream flags ─────────────────────────────────────────────────────────────

/// The two flag bytes shared by stream header and footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamFlags(pub [u8; 2]);

impl StreamFlags {
    pub fn new(check: CheckType) -> Self {
        StreamFlags([0x00, check.id()])
    }

    /// Validate the reserved bits and return the check type.
    pub fn check_type(&self) -> std::result::Result<CheckType, ErrorKind> {
        if self.0[0] != 0x00 {
            return Err(ErrorKind::BadStreamFlags);
        }
        if self.0[1] & 0xF0 != 0 {
            return Err(ErrorKind::ReservedFlagsUsed);
        }
        Ok(CheckType::from_id(self.0[1]))
    }

    pub fn check_size(&self) -> usize {
        CheckType::from_id(self.0[1]).size()
    }

    fn validate<R: BufRead>(&self, r: &ByteReader<R>, at: u64) -> Result<CheckType> {
        self.check_type().map_err(|kind| r.error_at(kind, at))
    }
}

// ── Stream header ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamHeader {
    pub magic: [u8; 6],
    pub flags: StreamFlags,
    pub crc32: u32,
}

impl StreamHeader {
    pub fn new(check: CheckType) -> Self {
        let flags = StreamFlags::new(check);
        Self {
            magic: HEADER_MAGIC,
            flags,
            crc32: crc32(&flags.0, 0),
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.flags.0)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        Ok(())
    }

    pub fn read<R: BufRead>(r: &mut ByteReader<R>) -> Result<Self> {
        r.set_section(Section::StreamHeader);
        let start = r.offset();

        let magic: [u8; 6] = r.read_array()?;
        if magic != HEADER_MAGIC {
            return Err(r.error_at(ErrorKind::BadHeaderMagic, start));
        }

        let flags = StreamFlags(r.read_array()?);
        let check = flags.validate(r, start + 6)?;

        let stored = r.read_u32_le()?;
        let computed = crc32(&flags.0, 0);
        if stored != computed {
            return Err(crc_error(r, stored, computed, start + 8));
        }

        debug!(check = check.name(), "read stream header");
        Ok(Self { magic, flags, crc32: stored })
    }
}

// ── Backward size ────────────────────────────────────────────────────────────

/// Footer field storing the index length as `(length / 4) - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackwardSize(pub u32);

impl BackwardSize {
    /// Index length in bytes.
    pub fn real_size(self) -> u64 {
        (u64::from(self.0) + 1) * 4
    }

    /// Encode an index length; `None` if it is not a positive multiple of 4
    /// that fits the field.
    pub fn from_index_len(len: u64) -> Option<Self> {
        if len < 4 || len % 4 != 0 {
            return None;
        }
        u32::try_from(len / 4 - 1).ok().map(BackwardSize)
    }
}

// ── Stream footer ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamFooter {
    pub crc32:         u32,
    pub backward_size: BackwardSize,
    pub flags:         StreamFlags,
    pub magic:         [u8; 2],
}

impl StreamFooter {
    pub fn new(check: CheckType, backward_size: BackwardSize) -> Self {
        let flags = StreamFlags::new(check);
        Self {
            crc32: footer_crc(backward_size, flags),
            backward_size,
            flags,
            magic: FOOTER_MAGIC,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.backward_size.0)?;
        writer.write_all(&self.flags.0)?;
        writer.write_all(&self.magic)?;
        Ok(())
    }

    pub fn read<R: BufRead>(r: &mut ByteReader<R>) -> Result<Self> {
        r.set_section(Section::StreamFooter);
        let start = r.offset();

        let stored = r.read_u32_le()?;
        let backward_size = BackwardSize(r.read_u32_le()?);
        let flags = StreamFlags(r.read_array()?);
        flags.validate(r, start + 8)?;

        let magic: [u8; 2] = r.read_array()?;
        if magic != FOOTER_MAGIC {
            return Err(r.error_at(ErrorKind::BadFooterMagic, start + 10));
        }

        let computed = footer_crc(backward_size, flags);
        if stored != computed {
            return Err(crc_error(r, stored, computed, start));
        }

        debug!(index_len = backward_size.real_size(), "read stream footer");
        Ok(Self { crc32: stored, backward_size, flags, magic })
    }
}

/// CRC-32 over the backward size followed by the flags.
fn footer_crc(backward_size: BackwardSize, flags: StreamFlags) -> u32 {
    crc32(&flags.0, crc32(&backward_size.0.to_le_bytes(), 0))
}

// ── Stream padding ───────────────────────────────────────────────────────────

/// One 4-byte unit of trailing zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StreamPadding(pub [u8; PADDING_UNIT]);

impl StreamPadding {
    /// Read padding units until the input ends.
    pub fn read_all<R: BufRead>(r: &mut ByteReader<R>) -> Result<Vec<Self>> {
        r.set_section(Section::StreamPadding);
        let mut units = Vec::new();
        loop {
            let start = r.offset();
            let mut unit = [0u8; PADDING_UNIT];
            match r.read_available(&mut unit)? {
                0 => break,
                PADDING_UNIT => {}
                _ => return Err(r.error_at(ErrorKind::Truncated, start)),
            }
            if unit != [0u8; PADDING_UNIT] {
                return Err(r.error_at(ErrorKind::BadPadding, start));
            }
            units.push(StreamPadding(unit));
        }
        Ok(units)
    }
}

pub(crate) fn crc_error<R: BufRead>(r: &ByteReader<R>, stored: u32, computed: u32, at: u64) -> XzError {
    r.error_at(
        ErrorKind::CrcMismatch { stored: u64::from(stored), computed: u64::from(computed) },
        at,
    )
}

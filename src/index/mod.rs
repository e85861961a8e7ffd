//! The index: one record per block, written after the last block.
//!
//! ```text
//! 0x00 | record count | (unpadded size, uncompressed size)* | padding | CRC-32
//! ```
//!
//! The leading `0x00` doubles as the discriminator that tells the stream
//! reader the block sequence has ended: a block header's size indicator is
//! never zero.  The CRC-32 covers everything before it.

use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::block::padding_len;
use crate::check::crc32;
use crate::cursor::ByteReader;
use crate::error::{ErrorKind, Result, Section};
use crate::header::crc_error;
use crate::varint::{WidthRecorder, Widths};

pub const INDEX_INDICATOR: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub unpadded_size:     u64,
    pub uncompressed_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub indicator: u8,
    pub records:   Vec<IndexRecord>,
    #[serde(serialize_with = "crate::serde_hex::byte_len")]
    pub padding:   Vec<u8>,
    pub crc32:     u32,
    /// Widths of integers stored longer than needed, so they write back as read.
    #[serde(skip)]
    pub varint_widths: Widths,
}

impl Default for Index {
    /// The index of a stream without blocks: indicator, zero count, padding.
    fn default() -> Self {
        let padding = vec![0u8; 2];
        Self {
            indicator: INDEX_INDICATOR,
            records:   Vec::new(),
            crc32:     crc32(&padding, crc32(&[INDEX_INDICATOR, 0x00], 0)),
            padding,
            varint_widths: Widths::default(),
        }
    }
}

impl Index {
    /// Build an index over `records`, computing padding and CRC.
    pub fn new(records: Vec<IndexRecord>) -> std::result::Result<Self, ErrorKind> {
        let mut index = Self {
            indicator: INDEX_INDICATOR,
            records,
            padding: Vec::new(),
            crc32: 0,
            varint_widths: Widths::default(),
        };
        let body = index.encode_body()?;
        index.padding = vec![0u8; padding_len(body.len() as u64)];
        index.crc32 = crc32(&index.padding, crc32(&body, 0));
        Ok(index)
    }

    pub fn number_of_records(&self) -> u64 {
        self.records.len() as u64
    }

    /// Indicator, record count and records.
    fn encode_body(&self) -> std::result::Result<Vec<u8>, ErrorKind> {
        let widths = &self.varint_widths;
        let mut out = vec![self.indicator];
        out.extend(widths.encode(0, self.number_of_records())?);
        for (i, rec) in self.records.iter().enumerate() {
            out.extend(widths.encode(1 + 2 * i, rec.unpadded_size)?);
            out.extend(widths.encode(2 + 2 * i, rec.uncompressed_size)?);
        }
        Ok(out)
    }

    /// Serialized length, CRC included.  Integers read in a longer form than
    /// needed count at their on-disk width.
    pub fn encoded_len(&self) -> u64 {
        let widths = &self.varint_widths;
        let records: usize = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                widths.len_of(1 + 2 * i, r.unpadded_size) + widths.len_of(2 + 2 * i, r.uncompressed_size)
            })
            .sum();
        (1 + widths.len_of(0, self.number_of_records()) + records + self.padding.len() + 4) as u64
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, ErrorKind> {
        let mut out = self.encode_body()?;
        out.extend_from_slice(&self.padding);
        out.extend_from_slice(&self.crc32.to_le_bytes());
        Ok(out)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let bytes = self
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&bytes)
    }

    pub fn read<R: BufRead>(r: &mut ByteReader<R>) -> Result<Self> {
        r.set_section(Section::Index);
        let start = r.offset();
        r.begin_capture();
        let index = Self::read_body(r, start);
        let captured = r.end_capture();
        let (indicator, records, padding, varint_widths) = index?;

        let crc_at = r.offset();
        let stored = r.read_u32_le()?;
        let computed = crc32(&captured, 0);
        if stored != computed {
            return Err(crc_error(r, stored, computed, crc_at));
        }

        debug!(records = records.len(), len = r.offset() - start, "read index");
        Ok(Self { indicator, records, padding, crc32: stored, varint_widths })
    }

    fn read_body<R: BufRead>(r: &mut ByteReader<R>, start: u64) -> Result<(u8, Vec<IndexRecord>, Vec<u8>, Widths)> {
        let indicator = r.read_byte()?;
        if indicator != INDEX_INDICATOR {
            return Err(r.error_at(ErrorKind::InvalidIndexIndicator(indicator), start));
        }

        let mut widths = WidthRecorder::default();
        let count = widths.read(r)?;
        let mut records = Vec::new();
        for _ in 0..count {
            let unpadded_size = widths.read(r)?;
            let uncompressed_size = widths.read(r)?;
            records.push(IndexRecord { unpadded_size, uncompressed_size });
        }

        let padding = r.read_padding(padding_len(r.offset() - start))?;
        Ok((indicator, records, padding, widths.finish()))
    }
}

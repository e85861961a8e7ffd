use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::io::{self, BufRead, Cursor, Write};
use thiserror::Error;
use tracing::{debug, warn};

use crate::check::crc32;
use crate::cursor::ByteReader;
use crate::error::{ErrorKind, Result, Section};
use crate::filter::{self, FilterError};
use crate::header::{crc_error, CheckType};
use crate::varint::{WidthRecorder, Widths};

pub const FLAG_FILTER_COUNT:      u8 = 0x03;
pub const FLAG_RESERVED:          u8 = 0x3C;
pub const FLAG_COMPRESSED_SIZE:   u8 = 0x40;
pub const FLAG_UNCOMPRESSED_SIZE: u8 = 0x80;

pub const MAX_FILTERS:     usize = 4;
/// Largest header the one-byte size indicator can describe.
pub const MAX_HEADER_SIZE: usize = 255 * 4;
/// Indicator + flags + one two-byte filter entry + CRC-32 needs 8 bytes.
const MIN_SIZE_INDICATOR:  u8    = 2;

/// Zero bytes needed after `len` bytes to reach a 4-byte boundary.
pub fn padding_len(len: u64) -> usize {
    ((4 - len % 4) % 4) as usize
}

// ── Filter flags ─────────────────────────────────────────────────────────────

/// One filter entry in a block header: id, then length-prefixed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterFlags {
    pub id:         u64,
    pub properties: Vec<u8>,
}

impl Serialize for FilterFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FilterFlags", 3)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("name", self.name())?;
        s.serialize_field("properties", &hex::encode(&self.properties))?;
        s.end()
    }
}

impl FilterFlags {
    pub fn new(id: u64, properties: Vec<u8>) -> Self {
        Self { id, properties }
    }

    pub fn name(&self) -> &'static str {
        filter::filter_name(self.id)
    }

    /// `n` is the position of the id among the header's integers.
    fn encode_into(&self, out: &mut Vec<u8>, widths: &Widths, n: usize) -> std::result::Result<(), ErrorKind> {
        out.extend(widths.encode(n, self.id)?);
        out.extend(widths.encode(n + 1, self.properties.len() as u64)?);
        out.extend_from_slice(&self.properties);
        Ok(())
    }

    fn read<R: BufRead>(r: &mut ByteReader<R>, widths: &mut WidthRecorder) -> Result<Self> {
        let id = widths.read(r)?;
        let len = widths.read(r)?;
        let properties = r.read_vec(len)?;
        Ok(Self { id, properties })
    }
}

// ── Block header ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    /// Header length divided by 4.
    pub size_indicator:    u8,
    pub flags:             u8,
    pub compressed_size:   Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub filters:           Vec<FilterFlags>,
    #[serde(serialize_with = "crate::serde_hex::byte_len")]
    pub padding:           Vec<u8>,
    pub crc32:             u32,
    /// Widths of integers stored longer than needed, so they write back as read.
    #[serde(skip)]
    pub varint_widths:     Widths,
}

impl BlockHeader {
    /// Build a header, deriving flags, size indicator, padding and CRC.
    pub fn new(
        filters:           Vec<FilterFlags>,
        compressed_size:   Option<u64>,
        uncompressed_size: Option<u64>,
    ) -> std::result::Result<Self, ErrorKind> {
        if filters.is_empty() || filters.len() > MAX_FILTERS {
            return Err(ErrorKind::InvalidFilterCount(filters.len()));
        }
        let mut flags = (filters.len() - 1) as u8;
        if compressed_size.is_some()   { flags |= FLAG_COMPRESSED_SIZE; }
        if uncompressed_size.is_some() { flags |= FLAG_UNCOMPRESSED_SIZE; }

        let mut header = Self {
            size_indicator: 0,
            flags,
            compressed_size,
            uncompressed_size,
            filters,
            padding: Vec::new(),
            crc32: 0,
            varint_widths: Widths::default(),
        };

        let needed = 1 + header.encode_fields()?.len() + 4;
        let size = needed.next_multiple_of(4);
        if size > MAX_HEADER_SIZE {
            return Err(ErrorKind::HeaderTooLarge { needed });
        }
        header.size_indicator = (size / 4) as u8;
        header.padding = vec![0u8; size - needed];

        let bytes = header.to_bytes()?;
        header.crc32 = crc32(&bytes[..size - 4], 0);
        Ok(header)
    }

    /// Header length in bytes.
    pub fn size(&self) -> usize {
        usize::from(self.size_indicator) * 4
    }

    pub fn filter_count(&self) -> usize {
        usize::from(self.flags & FLAG_FILTER_COUNT) + 1
    }

    /// Flags, optional sizes and filter entries, as they appear on disk.
    fn encode_fields(&self) -> std::result::Result<Vec<u8>, ErrorKind> {
        let widths = &self.varint_widths;
        let mut out = vec![self.flags];
        let mut n = 0;
        for size in [self.compressed_size, self.uncompressed_size].into_iter().flatten() {
            out.extend(widths.encode(n, size)?);
            n += 1;
        }
        for f in &self.filters {
            f.encode_into(&mut out, widths, n)?;
            n += 2;
        }
        Ok(out)
    }

    /// Serialize the stored fields verbatim, CRC included.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, ErrorKind> {
        let mut out = vec![self.size_indicator];
        out.extend(self.encode_fields()?);
        out.extend_from_slice(&self.padding);
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if out.len() != self.size() {
            return Err(ErrorKind::HeaderSizeMismatch { declared: self.size(), actual: out.len() });
        }
        Ok(out)
    }

    pub fn read<R: BufRead>(r: &mut ByteReader<R>, block: usize) -> Result<Self> {
        r.set_section(Section::BlockHeader(block));
        let start = r.offset();

        let size_indicator = r.read_byte()?;
        if size_indicator < MIN_SIZE_INDICATOR {
            return Err(r.error_at(ErrorKind::InvalidHeaderSize(size_indicator), start));
        }
        let size = usize::from(size_indicator) * 4;
        let rest = r.read_vec(size as u64 - 1)?;
        let (body, crc_bytes) = rest.split_at(rest.len() - 4);

        let mut fields = ByteReader::with_offset(Cursor::new(body), start + 1, r.section());
        let flags = fields.read_byte()?;
        if flags & FLAG_RESERVED != 0 {
            return Err(r.error_at(ErrorKind::ReservedFlagsUsed, start + 1));
        }

        let mut widths = WidthRecorder::default();
        let compressed_size = if flags & FLAG_COMPRESSED_SIZE != 0 {
            Some(widths.read(&mut fields)?)
        } else {
            None
        };
        let uncompressed_size = if flags & FLAG_UNCOMPRESSED_SIZE != 0 {
            Some(widths.read(&mut fields)?)
        } else {
            None
        };

        let filter_count = usize::from(flags & FLAG_FILTER_COUNT) + 1;
        let mut filters = Vec::with_capacity(filter_count);
        for _ in 0..filter_count {
            filters.push(FilterFlags::read(&mut fields, &mut widths)?);
        }

        let consumed = (fields.offset() - (start + 1)) as usize;
        let padding = fields.read_padding(body.len() - consumed)?;

        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = crc32(body, crc32(&[size_indicator], 0));
        if stored != computed {
            return Err(crc_error(r, stored, computed, start + size as u64 - 4));
        }

        debug!(block, size, filters = filter_count, "read block header");
        Ok(Self {
            size_indicator,
            flags,
            compressed_size,
            uncompressed_size,
            filters,
            padding,
            crc32: stored,
            varint_widths: widths.finish(),
        })
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub header:          BlockHeader,
    #[serde(rename = "payload_len", serialize_with = "crate::serde_hex::byte_len")]
    pub compressed_data: Vec<u8>,
    #[serde(serialize_with = "crate::serde_hex::byte_len")]
    pub padding:         Vec<u8>,
    #[serde(serialize_with = "crate::serde_hex::hex")]
    pub check:           Vec<u8>,
}

impl Block {
    /// Wrap an already-compressed payload.  Both sizes are recorded in the
    /// header and the check is computed over `compressed_data`.
    pub fn new(
        filters:           Vec<FilterFlags>,
        compressed_data:   Vec<u8>,
        uncompressed_size: u64,
        check:             CheckType,
    ) -> std::result::Result<Self, ErrorKind> {
        let header = BlockHeader::new(
            filters,
            Some(compressed_data.len() as u64),
            Some(uncompressed_size),
        )?;
        let check = check
            .compute(&compressed_data)
            .ok_or(ErrorKind::UnsupportedCheck(check.id()))?;
        Ok(Self {
            header,
            padding: vec![0u8; padding_len(compressed_data.len() as u64)],
            compressed_data,
            check,
        })
    }

    /// Serialized length: header, payload, padding and check.  This is the
    /// value the index records as the block's unpadded size.
    pub fn encoded_len(&self) -> u64 {
        (self.header.size() + self.compressed_data.len() + self.padding.len() + self.check.len()) as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::result::Result<(), BlockWriteError> {
        let header = self.header.to_bytes().map_err(BlockWriteError::Header)?;
        writer.write_all(&header)?;
        writer.write_all(&self.compressed_data)?;
        writer.write_all(&self.padding)?;
        writer.write_all(&self.check)?;
        Ok(())
    }

    pub fn read<R: BufRead>(r: &mut ByteReader<R>, block: usize, check: CheckType) -> Result<Self> {
        let header = BlockHeader::read(r, block)?;
        r.set_section(Section::Block(block));

        let compressed_size = header
            .compressed_size
            .ok_or_else(|| r.error_at(ErrorKind::MissingSizeField, r.offset()))?;
        let compressed_data = r.read_vec(compressed_size)?;
        let padding = r.read_padding(padding_len(compressed_size))?;

        let check_start = r.offset();
        let stored = r.read_vec(check.size() as u64)?;
        match check.compute(&compressed_data) {
            Some(computed) if computed != stored => {
                return Err(r.error_at(
                    ErrorKind::CrcMismatch { stored: le_u64(&stored), computed: le_u64(&computed) },
                    check_start,
                ));
            }
            Some(_) => {}
            None => warn!(block, check = check.name(), "block check value accepted without verification"),
        }

        debug!(block, compressed_size, "read block");
        Ok(Self { header, compressed_data, padding, check: stored })
    }

    /// Run the payload back through the header's filter chain.
    pub fn decode(&self, max_dict_size: Option<u32>) -> std::result::Result<Vec<u8>, FilterError> {
        filter::decode_chain(&self.header.filters, &self.compressed_data, max_dict_size)
    }
}

#[derive(Error, Debug)]
pub enum BlockWriteError {
    #[error("invalid block header: {0}")]
    Header(ErrorKind),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::crc64;
    use crate::filter::FILTER_LZMA2;

    fn lzma2() -> FilterFlags {
        FilterFlags::new(FILTER_LZMA2, vec![16])
    }

    fn reader(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes))
    }

    /// Patch header bytes and recompute their CRC.
    fn reseal(mut bytes: Vec<u8>) -> Vec<u8> {
        let n = bytes.len() - 4;
        let crc = crc32(&bytes[..n], 0);
        bytes[n..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    #[test]
    fn header_layout() {
        let header = BlockHeader::new(vec![lzma2()], Some(200), Some(1000)).unwrap();
        // indicator, flags, 2 + 2 size bytes, 3 filter bytes, CRC = 13
        assert_eq!(header.size(), 16);
        assert_eq!(header.size_indicator, 4);
        assert_eq!(header.flags, FLAG_COMPRESSED_SIZE | FLAG_UNCOMPRESSED_SIZE);
        assert_eq!(header.padding, vec![0u8; 3]);

        let bytes = header.to_bytes().unwrap();
        assert_eq!(&bytes[..9], &[0x04, 0xC0, 0xC8, 0x01, 0xE8, 0x07, 0x21, 0x01, 0x10]);
        assert_eq!(BlockHeader::read(&mut reader(bytes), 0).unwrap(), header);
    }

    #[test]
    fn header_is_padded_to_declared_length() {
        let header = BlockHeader::new(vec![lzma2()], None, None).unwrap();
        assert_eq!(header.size(), 12);
        assert_eq!(header.padding, vec![0u8; 3]);
        assert_eq!(header.filter_count(), 1);
        let bytes = header.to_bytes().unwrap();
        assert_eq!(BlockHeader::read(&mut reader(bytes), 0).unwrap(), header);
    }

    #[test]
    fn filter_count_is_bounded() {
        assert_eq!(BlockHeader::new(vec![], None, None), Err(ErrorKind::InvalidFilterCount(0)));
        assert_eq!(
            BlockHeader::new(vec![lzma2(); 5], None, None),
            Err(ErrorKind::InvalidFilterCount(5))
        );
        let header = BlockHeader::new(vec![lzma2(); 4], None, None).unwrap();
        assert_eq!(header.filter_count(), 4);
    }

    #[test]
    fn oversized_header_is_rejected() {
        let big = FilterFlags::new(0x4000_0000_0000_0001, vec![0u8; 1020]);
        assert!(matches!(
            BlockHeader::new(vec![big], None, None),
            Err(ErrorKind::HeaderTooLarge { .. })
        ));
    }

    #[test]
    fn reserved_header_flags() {
        let mut bytes = BlockHeader::new(vec![lzma2()], Some(4), Some(4)).unwrap().to_bytes().unwrap();
        bytes[1] |= 0x04;
        let err = BlockHeader::read(&mut reader(reseal(bytes)), 3).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::ReservedFlagsUsed));
        assert_eq!(err.section(), Some(Section::BlockHeader(3)));
        assert_eq!(err.offset(), Some(1));
    }

    #[test]
    fn header_crc_is_enforced() {
        let mut bytes = BlockHeader::new(vec![lzma2()], Some(4), Some(4)).unwrap().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        let err = BlockHeader::read(&mut reader(bytes), 0).unwrap_err();
        assert!(matches!(err.kind(), Some(ErrorKind::CrcMismatch { .. })));
        assert_eq!(err.offset(), Some(8));
    }

    #[test]
    fn nonzero_header_padding() {
        let mut bytes = BlockHeader::new(vec![lzma2()], None, None).unwrap().to_bytes().unwrap();
        bytes[6] = 0x01;
        let err = BlockHeader::read(&mut reader(reseal(bytes)), 0).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::BadPadding));
        assert_eq!(err.offset(), Some(6));
    }

    #[test]
    fn fields_past_declared_length_are_truncated() {
        // Indicator 2 (8 bytes) but the filter properties claim 9 bytes.
        let bytes = reseal(vec![0x02, 0x00, 0x21, 0x09, 0x00, 0, 0, 0]);
        let err = BlockHeader::read(&mut reader(bytes), 0).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::Truncated));
    }

    #[test]
    fn padded_integers_survive_a_rewrite() {
        // Compressed size 4 stored as `84 00`, uncompressed size 4 as `84 80 00`.
        let bytes = reseal(vec![
            0x04, 0xC0, 0x84, 0x00, 0x84, 0x80, 0x00, 0x21, 0x01, 0x10, 0x00, 0x00,
            0, 0, 0, 0,
        ]);
        let header = BlockHeader::read(&mut reader(bytes.clone()), 0).unwrap();
        assert_eq!(header.compressed_size, Some(4));
        assert_eq!(header.uncompressed_size, Some(4));
        assert_eq!(header.filters, vec![lzma2()]);
        assert!(!header.varint_widths.is_minimal());
        assert_eq!(header.to_bytes().unwrap(), bytes);

        let built = BlockHeader::new(vec![lzma2()], Some(4), Some(4)).unwrap();
        let reread = BlockHeader::read(&mut reader(built.to_bytes().unwrap()), 0).unwrap();
        assert!(reread.varint_widths.is_minimal());
        assert_eq!(reread, built);
    }

    #[test]
    fn declared_size_must_match_fields() {
        let mut header = BlockHeader::new(vec![lzma2()], Some(200), Some(1000)).unwrap();
        header.size_indicator = 3;
        assert_eq!(header.to_bytes(), Err(ErrorKind::HeaderSizeMismatch { declared: 12, actual: 16 }));
        header.size_indicator = 4;
        header.padding.push(0);
        assert_eq!(header.to_bytes(), Err(ErrorKind::HeaderSizeMismatch { declared: 16, actual: 17 }));
    }

    #[test]
    fn tiny_size_indicator() {
        let err = BlockHeader::read(&mut reader(vec![0x01, 0, 0, 0]), 0).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::InvalidHeaderSize(1)));
    }

    #[test]
    fn block_roundtrip_with_crc64() {
        let block = Block::new(vec![lzma2()], b"payload".to_vec(), 42, CheckType::Crc64).unwrap();
        assert_eq!(block.padding.len(), 1);
        assert_eq!(block.check, crc64(b"payload", 0).to_le_bytes().to_vec());
        assert_eq!(block.encoded_len(), 12 + 7 + 1 + 8);

        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, block.encoded_len());
        assert_eq!(Block::read(&mut reader(bytes), 0, CheckType::Crc64).unwrap(), block);
    }

    #[test]
    fn block_check_is_enforced() {
        let block = Block::new(vec![lzma2()], b"data".to_vec(), 4, CheckType::Crc32).unwrap();
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        bytes[12] ^= 0xFF;
        let err = Block::read(&mut reader(bytes), 5, CheckType::Crc32).unwrap_err();
        assert!(matches!(err.kind(), Some(ErrorKind::CrcMismatch { .. })));
        assert_eq!(err.section(), Some(Section::Block(5)));
        assert_eq!(err.offset(), Some(16));
    }

    #[test]
    fn missing_compressed_size() {
        let header = BlockHeader::new(vec![lzma2()], None, Some(3)).unwrap();
        let mut bytes = header.to_bytes().unwrap();
        bytes.extend_from_slice(b"abc\0");
        let err = Block::read(&mut reader(bytes), 0, CheckType::None).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::MissingSizeField));
        assert_eq!(err.section(), Some(Section::Block(0)));
    }

    #[test]
    fn nonzero_block_padding() {
        let block = Block::new(vec![lzma2()], b"abc".to_vec(), 3, CheckType::None).unwrap();
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        *bytes.last_mut().unwrap() = 0x7F;
        let err = Block::read(&mut reader(bytes), 0, CheckType::None).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::BadPadding));
    }

    #[test]
    fn truncated_payload() {
        let block = Block::new(vec![lzma2()], vec![1u8; 64], 64, CheckType::Crc32).unwrap();
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        bytes.truncate(40);
        let err = Block::read(&mut reader(bytes), 0, CheckType::Crc32).unwrap_err();
        assert_eq!(err.kind(), Some(&ErrorKind::Truncated));
        assert_eq!(err.offset(), Some(12));
    }

    #[test]
    fn unverifiable_checks_are_read_structurally() {
        let header = BlockHeader::new(vec![lzma2()], Some(4), Some(4)).unwrap();
        let mut bytes = header.to_bytes().unwrap();
        bytes.extend_from_slice(b"abcd");
        bytes.extend_from_slice(&[0xAB; 32]);
        let block = Block::read(&mut reader(bytes), 0, CheckType::Sha256).unwrap();
        assert_eq!(block.check, vec![0xAB; 32]);
        assert_eq!(
            Block::new(vec![lzma2()], b"abcd".to_vec(), 4, CheckType::Sha256),
            Err(ErrorKind::UnsupportedCheck(0xA))
        );
    }
}

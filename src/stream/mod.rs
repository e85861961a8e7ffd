//! Stream orchestrator.
//!
//! A [`Stream`] is the whole in-memory image of one XZ stream:
//!
//! ```text
//! StreamHeader | Block* | Index | StreamFooter | StreamPadding*
//! ```
//!
//! Reading is driven by [`StreamParser`]; producing a fresh stream goes
//! through [`StreamBuilder`].  Serialization emits every stored field
//! verbatim, so a parsed stream writes back byte for byte.
//!
//! # Cross-validation
//! After the last padding unit the parser calls [`Stream::validate`], which
//! checks the parts of the stream against each other:
//! - one index record per block;
//! - each block's serialized length equals its record's unpadded size;
//! - header sizes, when present, agree with the payload and the record;
//! - the footer's backward size covers exactly the index;
//! - header and footer carry identical flags.

mod builder;
mod parser;

pub use builder::StreamBuilder;
pub use parser::{PartialStream, ParseState, StreamParser};

use serde::Serialize;
use std::io::{BufRead, Write};

use crate::block::{Block, BlockWriteError};
use crate::error::{ErrorKind, Result, Section, SizeField, XzError};
use crate::header::{CheckType, StreamFooter, StreamHeader, StreamPadding, FOOTER_SIZE, HEADER_SIZE, PADDING_UNIT};
use crate::index::Index;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    pub header:  StreamHeader,
    pub blocks:  Vec<Block>,
    pub index:   Index,
    pub footer:  StreamFooter,
    pub padding: Vec<StreamPadding>,
}

/// How far block check values could be trusted after a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckVerification {
    /// The stream carries no check values.
    Absent,
    /// Every block check was recomputed and matched.
    Verified(CheckType),
    /// Check values were read for size only.
    Unverified(CheckType),
}

impl Stream {
    /// Parse and validate a complete stream, trailing padding included.
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        StreamParser::new(reader).run()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(bytes)
    }

    /// Check algorithm announced by the header flags.
    pub fn check_type(&self) -> CheckType {
        CheckType::from_id(self.header.flags.0[1])
    }

    pub fn check_verification(&self) -> CheckVerification {
        match self.check_type() {
            CheckType::None => CheckVerification::Absent,
            check if check.is_verifiable() => CheckVerification::Verified(check),
            check => CheckVerification::Unverified(check),
        }
    }

    /// Total uncompressed length according to the index.
    pub fn uncompressed_size(&self) -> u64 {
        self.index.records.iter().map(|r| r.uncompressed_size).sum()
    }

    // ── Layout ───────────────────────────────────────────────────────────────

    /// Absolute offset of every block, in order.
    pub fn block_offsets(&self) -> Vec<u64> {
        let mut offset = HEADER_SIZE as u64;
        self.blocks
            .iter()
            .map(|block| {
                let at = offset;
                offset += block.encoded_len();
                at
            })
            .collect()
    }

    pub fn index_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.blocks.iter().map(Block::encoded_len).sum::<u64>()
    }

    pub fn footer_offset(&self) -> u64 {
        self.index_offset() + self.index.encoded_len()
    }

    /// Serialized length, trailing padding included.
    pub fn encoded_len(&self) -> u64 {
        self.footer_offset() + (FOOTER_SIZE + self.padding.len() * PADDING_UNIT) as u64
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Cross-check blocks, index and footer.
    pub fn validate(&self) -> Result<()> {
        let index_offset = self.index_offset();
        if self.blocks.len() != self.index.records.len() {
            return Err(XzError::format(
                ErrorKind::RecordCountMismatch {
                    blocks:  self.blocks.len(),
                    records: self.index.records.len(),
                },
                Section::Index,
                index_offset,
            ));
        }

        let offsets = self.block_offsets();
        for (i, (block, record)) in self.blocks.iter().zip(&self.index.records).enumerate() {
            let mismatch = |field, expected, actual| {
                XzError::format(
                    ErrorKind::SizeMismatch { block: i, field, expected, actual },
                    Section::Block(i),
                    offsets[i],
                )
            };

            let unpadded = block.encoded_len();
            if unpadded != record.unpadded_size {
                return Err(mismatch(SizeField::Unpadded, record.unpadded_size, unpadded));
            }
            if let Some(declared) = block.header.compressed_size {
                let actual = block.compressed_data.len() as u64;
                if declared != actual {
                    return Err(mismatch(SizeField::Compressed, declared, actual));
                }
            }
            if let Some(declared) = block.header.uncompressed_size {
                if declared != record.uncompressed_size {
                    return Err(mismatch(SizeField::Uncompressed, record.uncompressed_size, declared));
                }
            }
        }

        let footer_offset = self.footer_offset();
        let declared = self.footer.backward_size.real_size();
        let actual = self.index.encoded_len();
        if declared != actual {
            return Err(XzError::format(
                ErrorKind::BackwardSizeMismatch { declared, actual },
                Section::StreamFooter,
                footer_offset + 4,
            ));
        }

        if self.header.flags != self.footer.flags {
            return Err(XzError::format(ErrorKind::FlagsMismatch, Section::StreamFooter, footer_offset + 8));
        }
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────────────────

    /// Write every stored field as-is.  Returns the number of bytes written.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<u64> {
        self.header.write(&mut writer)?;

        for ((i, block), offset) in self.blocks.iter().enumerate().zip(self.block_offsets()) {
            block.write(&mut writer).map_err(|e| match e {
                BlockWriteError::Header(kind) => XzError::format(kind, Section::BlockHeader(i), offset),
                BlockWriteError::Io(e) => XzError::Io(e),
            })?;
        }

        let index = self
            .index
            .to_bytes()
            .map_err(|kind| XzError::format(kind, Section::Index, self.index_offset()))?;
        writer.write_all(&index)?;

        self.footer.write(&mut writer)?;
        for unit in &self.padding {
            writer.write_all(&unit.0)?;
        }
        Ok(self.encoded_len())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        self.write(&mut out)?;
        Ok(out)
    }
}

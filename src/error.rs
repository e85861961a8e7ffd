//! Error types shared by every codec in the crate.
//!
//! Structural problems are reported as [`XzError::Format`], which carries the
//! [`ErrorKind`], the [`Section`] being decoded and the absolute byte offset
//! where the problem was detected.  Filter (compression engine) failures and
//! plain I/O failures have their own variants.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::filter::FilterError;

pub type Result<T> = std::result::Result<T, XzError>;

// ── Sections ─────────────────────────────────────────────────────────────────

/// The part of the stream an error was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    StreamHeader,
    /// Header of the block with the given zero-based index.
    BlockHeader(usize),
    /// Payload, padding or check of the block with the given index.
    Block(usize),
    Index,
    StreamFooter,
    StreamPadding,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::StreamHeader  => write!(f, "stream header"),
            Section::BlockHeader(i) => write!(f, "block {i} header"),
            Section::Block(i)      => write!(f, "block {i}"),
            Section::Index         => write!(f, "index"),
            Section::StreamFooter  => write!(f, "stream footer"),
            Section::StreamPadding => write!(f, "stream padding"),
        }
    }
}

/// Which size field disagreed during cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    Unpadded,
    Uncompressed,
    Compressed,
}

impl fmt::Display for SizeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeField::Unpadded     => write!(f, "unpadded size"),
            SizeField::Uncompressed => write!(f, "uncompressed size"),
            SizeField::Compressed   => write!(f, "compressed size"),
        }
    }
}

// ── Kinds ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("stream header has bad magic bytes")]
    BadHeaderMagic,
    #[error("stream footer has bad magic bytes")]
    BadFooterMagic,
    #[error("first stream flags byte is not 0x00")]
    BadStreamFlags,
    #[error("reserved flag bits are set")]
    ReservedFlagsUsed,
    #[error("CRC mismatch: stored {stored:#x}, computed {computed:#x}")]
    CrcMismatch { stored: u64, computed: u64 },
    #[error("variable-length integer is longer than 9 bytes")]
    VarintTooLong,
    #[error("cannot encode integers above 2^63 - 1")]
    VarintTooLarge,
    #[error("input ended before the field was complete")]
    Truncated,
    #[error("block header does not declare a compressed size")]
    MissingSizeField,
    #[error("padding contains non-zero bytes")]
    BadPadding,
    #[error("index indicator is {0:#04x}, expected 0x00")]
    InvalidIndexIndicator(u8),
    #[error("block header size indicator {0} is too small")]
    InvalidHeaderSize(u8),
    #[error("block header needs {needed} bytes, more than the 1020 the format allows")]
    HeaderTooLarge { needed: usize },
    #[error("block header declares {declared} bytes but its fields take {actual}")]
    HeaderSizeMismatch { declared: usize, actual: usize },
    #[error("a filter chain holds 1 to 4 filters, got {0}")]
    InvalidFilterCount(usize),
    #[error("check type {0:#x} cannot be computed by this build")]
    UnsupportedCheck(u8),
    #[error("stream has {blocks} block(s) but the index lists {records} record(s)")]
    RecordCountMismatch { blocks: usize, records: usize },
    #[error("block {block} {field} is {actual}, index says {expected}")]
    SizeMismatch { block: usize, field: SizeField, expected: u64, actual: u64 },
    #[error("footer backward size covers {declared} bytes but the index is {actual} bytes")]
    BackwardSizeMismatch { declared: u64, actual: u64 },
    #[error("stream header and footer flags differ")]
    FlagsMismatch,
}

// ── Top-level error ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum XzError {
    #[error("{kind} ({section}, byte offset {offset})")]
    Format { kind: ErrorKind, section: Section, offset: u64 },
    #[error("filter failed on block {block}: {source}")]
    Filter {
        block:  usize,
        #[source]
        source: FilterError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl XzError {
    pub fn format(kind: ErrorKind, section: Section, offset: u64) -> Self {
        XzError::Format { kind, section, offset }
    }

    /// The structural error kind, if this is a format error.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            XzError::Format { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn section(&self) -> Option<Section> {
        match self {
            XzError::Format { section, .. } => Some(*section),
            _ => None,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            XzError::Format { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

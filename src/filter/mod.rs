//! Filter registry: the boundary to the compression engine.
//!
//! # Identity rules
//! A filter is identified on disk by the varint id in its block header
//! `FilterFlags` entry, followed by a filter-specific properties blob.  Only
//! LZMA2 (`0x21`) can be run by this build; every other id is carried
//! through parsing and serialization untouched but fails with
//! [`FilterError::UnsupportedFilter`] when data has to pass through it.
//!
//! # Chains
//! A block lists 1 to 4 filters in encoding order.  Decoding runs the chain
//! back to front.
//!
//! # LZMA2 properties
//! One byte: the dictionary size code, see [`DictSize`].  The entropy coder
//! itself is `lzma-rs`; this module only configures and invokes it.

use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::block::FilterFlags;

// ── Filter ids ──────────────────────────────────────────────────────────────

pub const FILTER_DELTA:     u64 = 0x03;
pub const FILTER_X86:       u64 = 0x04;
pub const FILTER_POWERPC:   u64 = 0x05;
pub const FILTER_IA64:      u64 = 0x06;
pub const FILTER_ARM:       u64 = 0x07;
pub const FILTER_ARMTHUMB:  u64 = 0x08;
pub const FILTER_SPARC:     u64 = 0x09;
pub const FILTER_LZMA2:     u64 = 0x21;

/// Display name for diagnostics; never parsed.
pub fn filter_name(id: u64) -> &'static str {
    match id {
        FILTER_DELTA    => "delta",
        FILTER_X86      => "x86",
        FILTER_POWERPC  => "powerpc",
        FILTER_IA64     => "ia64",
        FILTER_ARM      => "arm",
        FILTER_ARMTHUMB => "armthumb",
        FILTER_SPARC    => "sparc",
        FILTER_LZMA2    => "lzma2",
        _               => "unknown",
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("LZMA2 dictionary size code {0} is invalid")]
    InvalidDictSize(i8),
    #[error("filter {id:#x} is not available in this build")]
    UnsupportedFilter { id: u64 },
    #[error("filter {id:#x} expects {expected} property byte(s), got {got}")]
    BadProperties { id: u64, expected: usize, got: usize },
    #[error("dictionary of {size} bytes exceeds the configured limit of {limit} bytes")]
    DictionaryTooLarge { size: u32, limit: u32 },
    #[error("Compression error: {0}")]
    Encode(String),
    #[error("Decompression error: {0}")]
    Decode(String),
}

// ── LZMA2 dictionary size ────────────────────────────────────────────────────

/// The LZMA2 dictionary size code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictSize(pub i8);

impl DictSize {
    pub const MAX_CODE: i8 = 40;

    /// Dictionary size in bytes.
    pub fn size(self) -> Result<u32, FilterError> {
        let s = self.0;
        match s {
            _ if !(0..=Self::MAX_CODE).contains(&s) => Err(FilterError::InvalidDictSize(s)),
            Self::MAX_CODE => Ok(u32::MAX),
            _ if s % 2 == 0 => Ok(1u32 << (s / 2 + 12)),
            _ => Ok(3u32 << ((s - 1) / 2 + 11)),
        }
    }

    /// Smallest code whose dictionary holds at least `bytes`.
    pub fn for_size(bytes: u32) -> Self {
        (0..Self::MAX_CODE)
            .map(DictSize)
            .find(|code| code.size().map_or(false, |size| size >= bytes))
            .unwrap_or(DictSize(Self::MAX_CODE))
    }
}

// ── Filter trait ─────────────────────────────────────────────────────────────

pub trait Filter: Send + Sync {
    fn filter_id(&self) -> u64;
    fn properties(&self) -> Vec<u8>;
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, FilterError>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, FilterError>;

    /// The `FilterFlags` entry describing this filter in a block header.
    fn flags(&self) -> FilterFlags {
        FilterFlags::new(self.filter_id(), self.properties())
    }
}

pub struct Lzma2Filter {
    dict_size: DictSize,
}

impl Lzma2Filter {
    /// A filter advertising a dictionary of at least `dict_bytes`.
    pub fn new(dict_bytes: u32) -> Self {
        Self { dict_size: DictSize::for_size(dict_bytes) }
    }

    pub fn from_properties(props: &[u8]) -> Result<Self, FilterError> {
        match props {
            [code] => {
                let dict_size = DictSize(*code as i8);
                dict_size.size()?;
                Ok(Self { dict_size })
            }
            _ => Err(FilterError::BadProperties {
                id:       FILTER_LZMA2,
                expected: 1,
                got:      props.len(),
            }),
        }
    }

    pub fn dict_size(&self) -> u32 {
        // The code is validated on construction.
        self.dict_size.size().unwrap_or(u32::MAX)
    }
}

impl Filter for Lzma2Filter {
    fn filter_id(&self) -> u64 { FILTER_LZMA2 }

    fn properties(&self) -> Vec<u8> { vec![self.dict_size.0 as u8] }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, FilterError> {
        let mut out = Vec::new();
        lzma_rs::lzma2_compress(&mut Cursor::new(data), &mut out)
            .map_err(|e| FilterError::Encode(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, FilterError> {
        let mut out = Vec::new();
        lzma_rs::lzma2_decompress(&mut Cursor::new(data), &mut out)
            .map_err(|e| FilterError::Decode(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a block header filter entry to a runnable filter.
///
/// `max_dict_size` rejects LZMA2 dictionaries above the limit before any
/// data is decoded.
pub fn get_filter(flags: &FilterFlags, max_dict_size: Option<u32>) -> Result<Box<dyn Filter>, FilterError> {
    match flags.id {
        FILTER_LZMA2 => {
            let filter = Lzma2Filter::from_properties(&flags.properties)?;
            if let Some(limit) = max_dict_size {
                if filter.dict_size() > limit {
                    return Err(FilterError::DictionaryTooLarge { size: filter.dict_size(), limit });
                }
            }
            debug!(dict_size = filter.dict_size(), "configured lzma2 decoder");
            Ok(Box::new(filter))
        }
        id => Err(FilterError::UnsupportedFilter { id }),
    }
}

/// Run `data` back through a block's filter chain.
pub fn decode_chain(
    chain:         &[FilterFlags],
    data:          &[u8],
    max_dict_size: Option<u32>,
) -> Result<Vec<u8>, FilterError> {
    let filters = chain
        .iter()
        .map(|flags| get_filter(flags, max_dict_size))
        .collect::<Result<Vec<_>, _>>()?;

    let mut buf = data.to_vec();
    for filter in filters.iter().rev() {
        buf = filter.decode(&buf)?;
    }
    Ok(buf)
}

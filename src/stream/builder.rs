use tracing::debug;

use crate::block::{Block, FilterFlags};
use crate::error::{ErrorKind, Result, Section, XzError};
use crate::header::{BackwardSize, CheckType, StreamFooter, StreamHeader, StreamPadding, HEADER_SIZE};
use crate::index::{Index, IndexRecord};

use super::Stream;

/// Assembles a valid [`Stream`] from already-compressed block payloads.
///
/// Sizes, padding, index records and every checksum are computed here, so
/// the result passes [`Stream::validate`] by construction.
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    check:   CheckType,
    blocks:  Vec<Block>,
    records: Vec<IndexRecord>,
    padding: usize,
}

impl StreamBuilder {
    pub fn new(check: CheckType) -> Self {
        Self { check, blocks: Vec::new(), records: Vec::new(), padding: 0 }
    }

    /// Append `units` four-byte units of zero padding after the footer.
    pub fn stream_padding(mut self, units: usize) -> Self {
        self.padding = units;
        self
    }

    pub fn check(&self) -> CheckType {
        self.check
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Wrap `compressed` in a block declaring `filters` and `uncompressed_size`.
    pub fn push_block(
        &mut self,
        filters:           Vec<FilterFlags>,
        compressed:        Vec<u8>,
        uncompressed_size: u64,
    ) -> Result<&mut Self> {
        let i = self.blocks.len();
        let block = Block::new(filters, compressed, uncompressed_size, self.check)
            .map_err(|kind| XzError::format(kind, Section::BlockHeader(i), self.next_offset()))?;

        debug!(block = i, len = block.encoded_len(), uncompressed_size, "built block");
        self.records.push(IndexRecord { unpadded_size: block.encoded_len(), uncompressed_size });
        self.blocks.push(block);
        Ok(self)
    }

    pub fn finish(self) -> Result<Stream> {
        let index_offset = self.next_offset();
        let index = Index::new(self.records)
            .map_err(|kind| XzError::format(kind, Section::Index, index_offset))?;
        let index_len = index.encoded_len();
        let backward_size = BackwardSize::from_index_len(index_len).ok_or_else(|| {
            XzError::format(
                ErrorKind::BackwardSizeMismatch { declared: 0, actual: index_len },
                Section::StreamFooter,
                index_offset + index_len,
            )
        })?;

        Ok(Stream {
            header:  StreamHeader::new(self.check),
            blocks:  self.blocks,
            index,
            footer:  StreamFooter::new(self.check, backward_size),
            padding: vec![StreamPadding::default(); self.padding],
        })
    }

    fn next_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.blocks.iter().map(Block::encoded_len).sum::<u64>()
    }
}

//! Per-block filter work, optionally spread across cores.
//!
//! Blocks are independent, so both directions run one filter pass per block
//! with no shared state.  With the `parallel` feature the passes go through
//! Rayon's global pool; without it they run in order on the calling thread.
//! Either way results come back in block order and the first failing block
//! (lowest index) is the one reported.
//!
//! Stream assembly and parsing stay sequential; only payload encoding and
//! decoding are handed out here.

use crate::block::Block;
use crate::error::{Result, XzError};
use crate::filter::{Filter, FilterError};

/// One compressed block payload.
#[derive(Debug)]
pub struct CompressedChunk {
    pub chunk_index: usize,
    /// Uncompressed byte count.
    pub orig_size:   usize,
    pub payload:     Vec<u8>,
}

/// Encode every chunk with `filter`.
pub fn compress_chunks(chunks: &[&[u8]], filter: &dyn Filter) -> Result<Vec<CompressedChunk>> {
    let encode = |(i, chunk): (usize, &&[u8])| -> Result<CompressedChunk> {
        let payload = filter.encode(chunk).map_err(|source| filter_error(i, source))?;
        Ok(CompressedChunk { chunk_index: i, orig_size: chunk.len(), payload })
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        let results: Vec<Result<CompressedChunk>> = chunks.par_iter().enumerate().map(encode).collect();
        results.into_iter().collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        chunks.iter().enumerate().map(encode).collect()
    }
}

/// Run every block back through its filter chain.
pub fn decode_blocks(blocks: &[Block], max_dict_size: Option<u32>) -> Result<Vec<Vec<u8>>> {
    let decode = |(i, block): (usize, &Block)| -> Result<Vec<u8>> {
        block.decode(max_dict_size).map_err(|source| filter_error(i, source))
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        let results: Vec<Result<Vec<u8>>> = blocks.par_iter().enumerate().map(decode).collect();
        results.into_iter().collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        blocks.iter().enumerate().map(decode).collect()
    }
}

fn filter_error(block: usize, source: FilterError) -> XzError {
    XzError::Filter { block, source }
}

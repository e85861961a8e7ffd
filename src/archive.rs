//! High-level API: whole buffers and files in, whole streams out.
//!
//! ```no_run
//! use xzframe::archive::{compress, decompress, CompressOptions, DecompressOptions};
//!
//! let stream = compress(b"Hello, world!", &CompressOptions::default())?;
//! let bytes = stream.to_bytes()?;
//!
//! let parsed = xzframe::Stream::from_bytes(&bytes)?;
//! assert_eq!(decompress(&parsed, &DecompressOptions::default())?, b"Hello, world!");
//! # Ok::<(), xzframe::XzError>(())
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::error::{ErrorKind, Result, Section, SizeField, XzError};
use crate::filter::{Filter, Lzma2Filter};
use crate::header::CheckType;
use crate::perf;
use crate::stream::{Stream, StreamBuilder};

pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_DICT_SIZE:  u32   = 8 * 1024 * 1024;

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`compress`].
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Integrity check stored after every block.
    pub check:          CheckType,
    /// Uncompressed bytes per block.  Zero is treated as one block for the
    /// whole input.
    pub block_size:     usize,
    /// Advertised LZMA2 dictionary size, rounded up to the next valid code.
    pub dict_size:      u32,
    /// Units of 4-byte zero padding after the footer.
    pub stream_padding: usize,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            check:          CheckType::Crc64,
            block_size:     DEFAULT_BLOCK_SIZE,
            dict_size:      DEFAULT_DICT_SIZE,
            stream_padding: 0,
        }
    }
}

/// Configuration for [`decompress`].
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    /// Refuse blocks whose LZMA2 dictionary is larger than this.
    pub max_dict_size: Option<u32>,
}

// ── In memory ────────────────────────────────────────────────────────────────

/// Compress `data` into a fresh stream, one LZMA2 block per `block_size`
/// bytes.  Empty input yields a stream without blocks.
pub fn compress(data: &[u8], opts: &CompressOptions) -> Result<Stream> {
    let filter = Lzma2Filter::new(opts.dict_size);
    let chunk_size = if opts.block_size == 0 { data.len().max(1) } else { opts.block_size };
    let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();

    let compressed = perf::compress_chunks(&chunks, &filter)?;

    let mut builder = StreamBuilder::new(opts.check).stream_padding(opts.stream_padding);
    for chunk in compressed {
        builder.push_block(vec![filter.flags()], chunk.payload, chunk.orig_size as u64)?;
    }
    let stream = builder.finish()?;

    info!(
        input = data.len(),
        output = stream.encoded_len(),
        blocks = stream.blocks.len(),
        check = opts.check.name(),
        "compressed"
    );
    Ok(stream)
}

/// Decode every block of `stream` and concatenate the output.
///
/// Each block's decoded length must match its index record.
pub fn decompress(stream: &Stream, opts: &DecompressOptions) -> Result<Vec<u8>> {
    let decoded = perf::decode_blocks(&stream.blocks, opts.max_dict_size)?;

    let offsets = stream.block_offsets();
    let mut out = Vec::with_capacity(decoded.iter().map(Vec::len).sum());
    for (i, (data, record)) in decoded.into_iter().zip(&stream.index.records).enumerate() {
        let actual = data.len() as u64;
        if actual != record.uncompressed_size {
            return Err(XzError::format(
                ErrorKind::SizeMismatch {
                    block:    i,
                    field:    SizeField::Uncompressed,
                    expected: record.uncompressed_size,
                    actual,
                },
                Section::Block(i),
                offsets[i],
            ));
        }
        out.extend_from_slice(&data);
    }

    info!(blocks = stream.blocks.len(), output = out.len(), "decompressed");
    Ok(out)
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Compress the file at `input` into an XZ file at `output`.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, opts: &CompressOptions) -> Result<Stream> {
    let mut data = Vec::new();
    BufReader::new(File::open(input)?).read_to_end(&mut data)?;

    let stream = compress(&data, opts)?;
    let mut writer = BufWriter::new(File::create(output)?);
    stream.write(&mut writer)?;
    writer.flush()?;
    Ok(stream)
}

/// Decompress the XZ file at `input` into `output`.  Returns the number of
/// bytes written.
pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, opts: &DecompressOptions) -> Result<u64> {
    let stream = read_headers(input)?;
    let data = decompress(&stream, opts)?;

    let mut writer = BufWriter::new(File::create(output)?);
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(data.len() as u64)
}

/// Parse and validate the XZ file at `path` without decoding any payload.
pub fn read_headers<P: AsRef<Path>>(path: P) -> Result<Stream> {
    Stream::read(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexRecord;
    use crate::stream::CheckVerification;

    fn text(len: usize) -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. ".iter().copied().cycle().take(len).collect()
    }

    #[test]
    fn default_options() {
        let opts = CompressOptions::default();
        assert_eq!(opts.check, CheckType::Crc64);
        assert_eq!(opts.block_size, 8 * 1024 * 1024);
        assert_eq!(opts.stream_padding, 0);
        assert_eq!(DecompressOptions::default().max_dict_size, None);
    }

    #[test]
    fn roundtrip_through_bytes() {
        let data = text(10_000);
        let stream = compress(&data, &CompressOptions::default()).unwrap();
        assert_eq!(stream.blocks.len(), 1);
        assert_eq!(stream.check_verification(), CheckVerification::Verified(CheckType::Crc64));

        let parsed = Stream::from_bytes(&stream.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, stream);
        assert_eq!(decompress(&parsed, &DecompressOptions::default()).unwrap(), data);
    }

    #[test]
    fn splits_into_blocks() {
        let data = text(2500);
        let opts = CompressOptions { block_size: 1000, check: CheckType::Crc32, ..Default::default() };
        let stream = compress(&data, &opts).unwrap();

        let sizes: Vec<u64> = stream.index.records.iter().map(|r| r.uncompressed_size).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(stream.uncompressed_size(), 2500);
        assert_eq!(decompress(&stream, &DecompressOptions::default()).unwrap(), data);
    }

    #[test]
    fn empty_input_has_no_blocks() {
        let stream = compress(&[], &CompressOptions::default()).unwrap();
        assert!(stream.blocks.is_empty());
        assert_eq!(stream.to_bytes().unwrap().len(), 32);
        assert!(decompress(&stream, &DecompressOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn stream_padding_option() {
        let opts = CompressOptions { stream_padding: 3, ..Default::default() };
        let stream = compress(b"abc", &opts).unwrap();
        let bytes = stream.to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 12..], &[0u8; 12]);
        assert_eq!(Stream::from_bytes(&bytes).unwrap().padding.len(), 3);
    }

    #[test]
    fn decoded_length_is_checked_against_index() {
        let mut stream = compress(b"hello hello hello", &CompressOptions::default()).unwrap();
        stream.index.records = vec![IndexRecord { uncompressed_size: 99, ..stream.index.records[0] }];

        let err = decompress(&stream, &DecompressOptions::default()).unwrap_err();
        assert!(matches!(
            err.kind(),
            Some(ErrorKind::SizeMismatch { block: 0, field: SizeField::Uncompressed, expected: 99, actual: 17 })
        ));
    }

    #[test]
    fn dictionary_limit() {
        let stream = compress(b"data", &CompressOptions::default()).unwrap();
        let opts = DecompressOptions { max_dict_size: Some(1 << 20) };
        let err = decompress(&stream, &opts).unwrap_err();
        assert!(matches!(err, XzError::Filter { block: 0, .. }));
    }
}

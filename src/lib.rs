pub mod error;
pub mod cursor;
pub mod varint;
pub mod check;
pub mod header;
pub mod block;
pub mod index;
pub mod filter;
pub mod stream;
pub mod perf;
pub mod archive;
mod serde_hex;

pub use error::{ErrorKind, Result, Section, SizeField, XzError};
pub use header::{CheckType, StreamFlags, StreamFooter, StreamHeader, StreamPadding};
pub use block::{Block, BlockHeader, FilterFlags};
pub use index::{Index, IndexRecord};
pub use filter::{Filter, FilterError, Lzma2Filter, get_filter};
pub use stream::{CheckVerification, Stream, StreamBuilder, StreamParser};
pub use archive::{CompressOptions, DecompressOptions, compress, decompress};

use std::io::{self, BufRead};
use tracing::{debug, info};

use crate::block::Block;
use crate::cursor::ByteReader;
use crate::error::{ErrorKind, Result, Section, XzError};
use crate::header::{CheckType, StreamFooter, StreamHeader, StreamPadding};
use crate::index::{Index, INDEX_INDICATOR};

use super::Stream;

/// Position of a [`StreamParser`] in the stream grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    ReadHeader,
    ReadBlockOrIndex,
    ReadFooter,
    ReadPadding,
    Validate,
    Done,
    Failed,
}

/// What the byte after the previous element announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextElement {
    /// A block header; the byte is its size indicator.
    Block,
    Index,
}

impl NextElement {
    fn from_indicator(byte: u8) -> Self {
        match byte {
            INDEX_INDICATOR => NextElement::Index,
            _ => NextElement::Block,
        }
    }
}

/// Everything parsed so far.  After a failure this is what was read before
/// the offending element.
#[derive(Debug, Clone, Default)]
pub struct PartialStream {
    pub header:  Option<StreamHeader>,
    pub blocks:  Vec<Block>,
    pub index:   Option<Index>,
    pub footer:  Option<StreamFooter>,
    pub padding: Vec<StreamPadding>,
}

impl From<Stream> for PartialStream {
    fn from(stream: Stream) -> Self {
        Self {
            header:  Some(stream.header),
            blocks:  stream.blocks,
            index:   Some(stream.index),
            footer:  Some(stream.footer),
            padding: stream.padding,
        }
    }
}

/// Forward-only reader over a single stream with one byte of lookahead.
pub struct StreamParser<R> {
    reader:  ByteReader<R>,
    state:   ParseState,
    check:   CheckType,
    partial: PartialStream,
}

impl<R: BufRead> StreamParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader:  ByteReader::new(reader),
            state:   ParseState::ReadHeader,
            check:   CheckType::None,
            partial: PartialStream::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.reader.offset()
    }

    pub fn partial(&self) -> &PartialStream {
        &self.partial
    }

    pub fn into_partial(self) -> PartialStream {
        self.partial
    }

    /// Drive the state machine to completion.
    pub fn run(&mut self) -> Result<Stream> {
        if matches!(self.state, ParseState::Done | ParseState::Failed) {
            return Err(finished());
        }
        loop {
            match self.step() {
                Ok(Some(stream)) => {
                    self.state = ParseState::Done;
                    info!(
                        blocks = stream.blocks.len(),
                        len = self.reader.offset(),
                        check = stream.check_type().name(),
                        "parsed stream"
                    );
                    return Ok(stream);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(state = ?self.state, error = %e, "stream parse failed");
                    self.state = ParseState::Failed;
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self) -> Result<Option<Stream>> {
        match self.state {
            ParseState::ReadHeader => {
                let header = StreamHeader::read(&mut self.reader)?;
                self.check = CheckType::from_id(header.flags.0[1]);
                self.partial.header = Some(header);
                self.state = ParseState::ReadBlockOrIndex;
            }
            ParseState::ReadBlockOrIndex => {
                let at = self.reader.offset();
                let byte = self
                    .reader
                    .peek_u8()?
                    .ok_or_else(|| XzError::format(ErrorKind::Truncated, Section::Index, at))?;
                match NextElement::from_indicator(byte) {
                    NextElement::Block => {
                        let i = self.partial.blocks.len();
                        let block = Block::read(&mut self.reader, i, self.check)?;
                        self.partial.blocks.push(block);
                    }
                    NextElement::Index => {
                        self.partial.index = Some(Index::read(&mut self.reader)?);
                        self.state = ParseState::ReadFooter;
                    }
                }
            }
            ParseState::ReadFooter => {
                self.partial.footer = Some(StreamFooter::read(&mut self.reader)?);
                self.state = ParseState::ReadPadding;
            }
            ParseState::ReadPadding => {
                self.partial.padding = StreamPadding::read_all(&mut self.reader)?;
                self.state = ParseState::Validate;
            }
            ParseState::Validate => {
                let stream = self.assemble()?;
                if let Err(e) = stream.validate() {
                    self.partial = stream.into();
                    return Err(e);
                }
                return Ok(Some(stream));
            }
            ParseState::Done | ParseState::Failed => return Err(finished()),
        }
        Ok(None)
    }

    fn assemble(&mut self) -> Result<Stream> {
        let at = self.reader.offset();
        let partial = std::mem::take(&mut self.partial);
        match partial {
            PartialStream {
                header:  Some(header),
                blocks,
                index:   Some(index),
                footer:  Some(footer),
                padding,
            } => Ok(Stream { header, blocks, index, footer, padding }),
            partial => {
                self.partial = partial;
                Err(XzError::format(ErrorKind::Truncated, Section::StreamFooter, at))
            }
        }
    }
}

fn finished() -> XzError {
    XzError::Io(io::Error::new(io::ErrorKind::Other, "stream parser has already finished"))
}

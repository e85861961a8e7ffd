//! Multibyte integers: base-128, least significant group first, with the
//! continuation bit `0x80` set on every byte except the last.

use std::io::BufRead;

use crate::cursor::ByteReader;
use crate::error::{ErrorKind, Result};

/// Largest value the format can carry.
pub const MAX_VALUE: u64 = (1 << 63) - 1;
/// Longest on-disk encoding.
pub const MAX_LEN: usize = 9;

/// Decode a complete encoding.
///
/// An empty buffer decodes to 0.  A zero byte after the first one ends the
/// value early; anything after it is ignored.
pub fn decode(buf: &[u8]) -> std::result::Result<u64, ErrorKind> {
    let Some((&first, rest)) = buf.split_first() else {
        return Ok(0);
    };
    if buf.len() > MAX_LEN {
        return Err(ErrorKind::VarintTooLong);
    }

    let mut value = u64::from(first & 0x7F);
    for (i, &byte) in rest.iter().enumerate() {
        if byte == 0x00 {
            break;
        }
        value |= u64::from(byte & 0x7F) << ((i + 1) * 7);
    }
    Ok(value)
}

pub fn encode(value: u64) -> std::result::Result<Vec<u8>, ErrorKind> {
    if value > MAX_VALUE {
        return Err(ErrorKind::VarintTooLarge);
    }
    let mut out = Vec::with_capacity(encoded_len(value));
    let mut num = value;
    while num >= 0x80 {
        out.push((num as u8) | 0x80);
        num >>= 7;
    }
    out.push(num as u8);
    Ok(out)
}

/// Number of bytes `encode(value)` produces.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Encode `value` in at least `width` bytes.  Extra bytes are zero groups:
/// continuation bits run on through `0x80` fillers and a final `0x00`, the
/// only shape a longer-than-needed encoding of `value` can take.
pub fn encode_padded(value: u64, width: usize) -> std::result::Result<Vec<u8>, ErrorKind> {
    let mut out = encode(value)?;
    if width > out.len() {
        let last = out.len() - 1;
        out[last] |= 0x80;
        out.resize(width - 1, 0x80);
        out.push(0x00);
    }
    Ok(out)
}

/// Read one integer from `reader`, a byte at a time.
pub fn read<R: BufRead>(reader: &mut ByteReader<R>) -> Result<u64> {
    let start = reader.offset();
    let mut buf = [0u8; MAX_LEN];
    for i in 0..MAX_LEN {
        let byte = reader.read_byte()?;
        buf[i] = byte;
        if byte & 0x80 == 0 {
            return decode(&buf[..=i]).map_err(|kind| reader.error_at(kind, start));
        }
    }
    Err(reader.error_at(ErrorKind::VarintTooLong, start))
}

// ── Widths ───────────────────────────────────────────────────────────────────

/// On-disk byte widths of a run of integers read from one structure.
///
/// Empty when every integer used its shortest form, which is also what
/// freshly built structures carry.  Otherwise holds one width per integer in
/// read order, so the run serializes back byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Widths(Vec<u8>);

impl Widths {
    pub fn is_minimal(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoded length of the `n`th integer of the run.
    pub fn len_of(&self, n: usize, value: u64) -> usize {
        encoded_len(value).max(self.width(n))
    }

    /// Encode the `n`th integer of the run at its recorded width.
    pub fn encode(&self, n: usize, value: u64) -> std::result::Result<Vec<u8>, ErrorKind> {
        encode_padded(value, self.width(n))
    }

    fn width(&self, n: usize) -> usize {
        self.0.get(n).map_or(0, |&w| usize::from(w))
    }
}

/// Reads a run of integers and remembers how wide each one was.
#[derive(Debug, Default)]
pub struct WidthRecorder {
    widths: Vec<u8>,
    padded: bool,
}

impl WidthRecorder {
    pub fn read<R: BufRead>(&mut self, reader: &mut ByteReader<R>) -> Result<u64> {
        let start = reader.offset();
        let value = read(reader)?;
        let width = (reader.offset() - start) as usize;
        self.padded |= width != encoded_len(value);
        // `read` never consumes more than MAX_LEN bytes.
        self.widths.push(width as u8);
        Ok(value)
    }

    pub fn finish(self) -> Widths {
        if self.padded { Widths(self.widths) } else { Widths::default() }
    }
}

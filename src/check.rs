//! CRC-32 and CRC-64 engines.
//!
//! Both functions take a seed: the finished checksum of everything that came
//! before.  `crc32(b, crc32(a, 0)) == crc32(a ++ b, 0)`, which lets callers
//! checksum a span in pieces.  CRC-32 is the IEEE polynomial via
//! `crc32fast`; CRC-64 is the reflected ECMA-182 polynomial from a
//! compile-time table.

const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

static CRC64_TABLE: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u64;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC64_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

pub fn crc32(data: &[u8], seed: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}

pub fn crc64(data: &[u8], seed: u64) -> u64 {
    let mut hasher = Crc64::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}

/// Incremental CRC-64, shaped like `crc32fast::Hasher`.
#[derive(Debug, Clone)]
pub struct Crc64 {
    state: u64,
}

impl Crc64 {
    pub fn new() -> Self {
        Self::new_with_initial(0)
    }

    pub fn new_with_initial(seed: u64) -> Self {
        Self { state: !seed }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            crc = CRC64_TABLE[((crc ^ u64::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    pub fn finalize(&self) -> u64 {
        !self.state
    }
}

impl Default for Crc64 {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"this is a test\n";

    #[test]
    fn crc32_reference_value() {
        assert_eq!(crc32(SAMPLE, 0), 0x7205_1312);
    }

    #[test]
    fn crc64_reference_value() {
        assert_eq!(crc64(SAMPLE, 0), 0x643D_26FB_7156_AB08);
    }

    #[test]
    fn empty_input_returns_seed() {
        assert_eq!(crc32(&[], 0), 0);
        assert_eq!(crc64(&[], 0), 0);
        assert_eq!(crc32(&[], 0xDEAD_BEEF), 0xDEAD_BEEF);
        assert_eq!(crc64(&[], 42), 42);
    }

    #[test]
    fn seeds_chain_partial_buffers() {
        let (a, b) = SAMPLE.split_at(6);
        assert_eq!(crc32(b, crc32(a, 0)), crc32(SAMPLE, 0));
        assert_eq!(crc64(b, crc64(a, 0)), crc64(SAMPLE, 0));
    }

    #[test]
    fn incremental_crc64_matches_one_shot() {
        let mut h = Crc64::new();
        for chunk in SAMPLE.chunks(4) {
            h.update(chunk);
        }
        assert_eq!(h.finalize(), crc64(SAMPLE, 0));
    }
}

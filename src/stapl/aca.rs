//! ACA ("array compression algorithm") decompression for STAPL `DATA`
//! blocks.
//!
//! Grounded on `ebyst/stapl/aca.py`: a custom 64-symbol alphabet packs 4
//! symbols into 3 raw bytes, and those raw bytes are read as a bitstream
//! of LZ-style records behind a 32-bit little-endian length header.

use super::StaplError;

const ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_@";

fn sextet(c: u8) -> Result<u32, StaplError> {
    ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|i| i as u32)
        .ok_or_else(|| StaplError::value(format!("{} is not a valid ACA symbol", c as char)))
}

/// Unpack the ACA symbol alphabet into raw bytes: every 4 symbols decode
/// to 3 bytes, symbols contributing their 6 bits least-significant-first
/// into the growing bit position.
fn symbols_to_bytes(text: &str) -> Result<Vec<u8>, StaplError> {
    let mut out = Vec::with_capacity(text.len() * 3 / 4 + 3);
    let mut acc: u32 = 0;
    let mut acc_bits = 0u32;
    for c in text.trim().bytes() {
        let v = sextet(c)?;
        acc |= v << acc_bits;
        acc_bits += 6;
        while acc_bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    Ok(out)
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, pos: 0 }
    }

    fn bit(&mut self) -> Result<bool, StaplError> {
        let byte_index = self.pos / 8;
        let byte = *self
            .bytes
            .get(byte_index)
            .ok_or_else(|| StaplError::value("ACA bitstream exhausted"))?;
        let bit = (byte >> (self.pos % 8)) & 1 != 0;
        self.pos += 1;
        Ok(bit)
    }

    fn bits(&mut self, n: u32) -> Result<u32, StaplError> {
        let mut v = 0u32;
        for i in 0..n {
            if self.bit()? {
                v |= 1 << i;
            }
        }
        Ok(v)
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()).min(usize::BITS)
    }
}

/// Decompress an ACA-encoded `DATA` block's text into its raw bytes.
pub fn decompress(text: &str) -> Result<Vec<u8>, StaplError> {
    let raw = symbols_to_bytes(text)?;
    if raw.len() < 4 {
        return Err(StaplError::value("ACA stream too short for length header"));
    }
    let length = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let mut reader = BitReader::new(&raw[4..]);
    let mut out = Vec::with_capacity(length);
    while out.len() < length {
        if !reader.bit()? {
            for _ in 0..3 {
                if out.len() >= length {
                    break;
                }
                out.push(reader.bits(8)? as u8);
            }
        } else {
            let ooffset = out.len();
            let offset_bits = ceil_log2(ooffset).min(13);
            let offset = reader.bits(offset_bits)? as usize;
            let run = reader.bits(8)? as usize;
            if offset > out.len() {
                return Err(StaplError::value("ACA back-reference precedes start of output"));
            }
            let start = out.len() - offset;
            for i in 0..run {
                let byte = out[start + i];
                out.push(byte);
            }
        }
    }
    out.truncate(length);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_alphabet_is_64_entries_and_distinct() {
        assert_eq!(ALPHABET.len(), 64);
        let mut sorted = ALPHABET.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 64);
    }

    #[test]
    fn ceil_log2_matches_expected_bit_widths() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(8192), 13);
    }

    #[test]
    fn decompress_rejects_truncated_header() {
        assert!(decompress("00").is_err());
    }

    #[test]
    fn decompress_matches_the_reference_vector() {
        let out = decompress("O00008Cn63PbPMRWpGBDgj6RV60").unwrap();
        assert_eq!(out, b"abcdefabcdefghijkldefabc");
    }
}

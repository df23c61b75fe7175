//! NRV2B codec.
//!
//! Control bits are packed MSB first into 32-bit little-endian words that sit
//! in the stream ahead of the literal and offset bytes they govern. Each
//! word is reserved when its first bit is emitted, which is exactly when a
//! decoder fetches it.

use thiserror::Error;

use super::{CompressError, Compressor};

/// Offsets above this cost one extra byte of minimum match length.
const FAR_OFFSET: usize = 0xd00;
/// Offset code that, with a low byte of 0xff, marks end of stream.
const END_CODE: u32 = 0x0100_0002;

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 0x4000;
const WINDOW: usize = 0x1_0000;
const MAX_CHAIN: usize = 256;
const HASH_BITS: u32 = 15;
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompressError {
    #[error("compressed stream ends unexpectedly at {pos:#x}")]
    UnexpectedEof { pos: usize },
    #[error("corrupt code in compressed stream at {pos:#x}")]
    Corrupt { pos: usize },
    #[error("match offset {offset:#x} reaches before start of output at {at:#x}")]
    BadOffset { offset: usize, at: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Nrv2b;

impl Compressor for Nrv2b {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressError> {
        if src.len() >= 0xffff_ff00 {
            return Err(CompressError::InputTooLarge { len: src.len() });
        }

        let mut out = BitWriter::new(dst);
        let mut matcher = Matcher::new(src);
        let mut last_off = 1usize;
        let mut i = 0usize;

        while i < src.len() {
            let (len, off) = matcher.find(i, last_off);
            if len == 0 {
                out.put_bit(1)?;
                out.put_byte(src[i])?;
                matcher.insert(i);
                i += 1;
                continue;
            }

            out.put_bit(0)?;
            if off == last_off {
                out.put_gamma(2)?;
            } else {
                let o = off - 1;
                out.put_gamma((o >> 8) as u32 + 3)?;
                out.put_byte((o & 0xff) as u8)?;
                last_off = off;
            }
            let base = len - 1 - usize::from(off > FAR_OFFSET);
            if base < 4 {
                out.put_bit((base >> 1) as u32 & 1)?;
                out.put_bit(base as u32 & 1)?;
            } else {
                out.put_bit(0)?;
                out.put_bit(0)?;
                out.put_gamma((base - 2) as u32)?;
            }

            for p in i..i + len {
                matcher.insert(p);
            }
            i += len;
        }

        out.put_bit(0)?;
        out.put_gamma(END_CODE)?;
        out.put_byte(0xff)?;
        out.finish()
    }
}

pub fn decompress(src: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let mut input = BitReader::new(src);
    let mut out = Vec::new();
    let mut last_off = 1usize;

    loop {
        while input.get_bit()? == 1 {
            out.push(input.get_byte()?);
        }

        let code = input.get_gamma(END_CODE)?;
        let off = if code == 2 {
            last_off
        } else {
            let low = u64::from(input.get_byte()?);
            let raw = (u64::from(code) - 3) * 256 + low;
            if raw == 0xffff_ffff {
                break;
            }
            last_off = raw as usize + 1;
            last_off
        };

        let mut len = (input.get_bit()? << 1) | input.get_bit()?;
        if len == 0 {
            len = input.get_gamma(MAX_MATCH as u32 * 2)? + 2;
        }
        let total = len as usize + usize::from(off > FAR_OFFSET) + 1;

        if off > out.len() {
            return Err(DecompressError::BadOffset {
                offset: off,
                at: out.len(),
            });
        }
        for _ in 0..total {
            out.push(out[out.len() - off]);
        }
    }
    Ok(out)
}

struct BitWriter<'a> {
    dst: &'a mut [u8],
    pos: usize,
    word_pos: usize,
    word: u32,
    bits: u32,
}

impl<'a> BitWriter<'a> {
    fn new(dst: &'a mut [u8]) -> Self {
        Self {
            dst,
            pos: 0,
            word_pos: 0,
            word: 0,
            bits: 0,
        }
    }

    fn claim(&mut self, size: usize) -> Result<usize, CompressError> {
        let at = self.pos;
        if at + size > self.dst.len() {
            return Err(CompressError::OutputFull {
                needed_at_least: at + size,
                available: self.dst.len(),
            });
        }
        self.pos += size;
        Ok(at)
    }

    fn put_bit(&mut self, bit: u32) -> Result<(), CompressError> {
        if self.bits == 0 {
            self.word_pos = self.claim(4)?;
        }
        self.word = (self.word << 1) | (bit & 1);
        self.bits += 1;
        if self.bits == 32 {
            self.flush_word();
        }
        Ok(())
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), CompressError> {
        let at = self.claim(1)?;
        self.dst[at] = byte;
        Ok(())
    }

    // Writes the bits of `value` below its leading one, each followed by a
    // continue(0)/stop(1) flag. `value` must be at least 2.
    fn put_gamma(&mut self, value: u32) -> Result<(), CompressError> {
        debug_assert!(value >= 2);
        let width = 32 - value.leading_zeros();
        for shift in (0..width - 1).rev() {
            self.put_bit((value >> shift) & 1)?;
            self.put_bit(u32::from(shift == 0))?;
        }
        Ok(())
    }

    fn flush_word(&mut self) {
        let word = self.word << (32 - self.bits);
        self.dst[self.word_pos..self.word_pos + 4].copy_from_slice(&word.to_le_bytes());
        self.word = 0;
        self.bits = 0;
    }

    fn finish(mut self) -> Result<usize, CompressError> {
        if self.bits > 0 {
            self.flush_word();
        }
        Ok(self.pos)
    }
}

struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    word: u32,
    bits: u32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            word: 0,
            bits: 0,
        }
    }

    fn get_bit(&mut self) -> Result<u32, DecompressError> {
        if self.bits == 0 {
            let bytes = self
                .src
                .get(self.pos..self.pos + 4)
                .ok_or(DecompressError::UnexpectedEof { pos: self.pos })?;
            self.word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            self.pos += 4;
            self.bits = 32;
        }
        self.bits -= 1;
        Ok((self.word >> self.bits) & 1)
    }

    fn get_byte(&mut self) -> Result<u8, DecompressError> {
        let byte = *self
            .src
            .get(self.pos)
            .ok_or(DecompressError::UnexpectedEof { pos: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn get_gamma(&mut self, limit: u32) -> Result<u32, DecompressError> {
        let mut value = 1u32;
        loop {
            value = (value << 1) | self.get_bit()?;
            if value > limit {
                return Err(DecompressError::Corrupt { pos: self.pos });
            }
            if self.get_bit()? == 1 {
                return Ok(value);
            }
        }
    }
}

struct Matcher<'a> {
    src: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl<'a> Matcher<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; src.len()],
        }
    }

    fn hash(&self, i: usize) -> usize {
        let key = u32::from(self.src[i]) << 16 | u32::from(self.src[i + 1]) << 8 | u32::from(self.src[i + 2]);
        (key.wrapping_mul(0x9e37_79b1) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, i: usize) {
        if i + MIN_MATCH > self.src.len() {
            return;
        }
        let h = self.hash(i);
        self.prev[i] = self.head[h];
        self.head[h] = i;
    }

    fn common_len(&self, earlier: usize, i: usize) -> usize {
        let limit = (self.src.len() - i).min(MAX_MATCH);
        let mut len = 0;
        while len < limit && self.src[earlier + len] == self.src[i + len] {
            len += 1;
        }
        len
    }

    /// Longest usable match at `i` as `(length, offset)`; length 0 means emit a
    /// literal. Ties go to `last_off`, which is cheaper to encode.
    fn find(&self, i: usize, last_off: usize) -> (usize, usize) {
        let mut best = (0usize, 0usize);

        if last_off <= i {
            let len = self.common_len(i - last_off, i);
            if len >= 2 + usize::from(last_off > FAR_OFFSET) {
                best = (len, last_off);
            }
        }

        if i + MIN_MATCH > self.src.len() {
            return best;
        }
        let mut cand = self.head[self.hash(i)];
        let mut steps = 0;
        while cand != NIL && steps < MAX_CHAIN {
            let off = i - cand;
            if off > WINDOW {
                break;
            }
            let len = self.common_len(cand, i);
            if len > best.0 && len >= MIN_MATCH {
                best = (len, off);
                if len == MAX_MATCH {
                    break;
                }
            }
            cand = self.prev[cand];
            steps += 1;
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{decompress, DecompressError, Nrv2b};
    use crate::compress::{CompressError, Compressor};

    fn pack(src: &[u8]) -> Vec<u8> {
        let mut dst = vec![0u8; src.len() * 2 + 64];
        let len = Nrv2b.compress(src, &mut dst).expect("compress");
        dst.truncate(len);
        dst
    }

    fn sample_text() -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..400u32 {
            data.extend_from_slice(format!("entry {i:04}: status=ok flags=none\n").as_bytes());
        }
        data
    }

    #[test]
    fn round_trips_assorted_inputs() {
        let mut noise = Vec::with_capacity(5000);
        let mut x = 0x1234_5678u32;
        for _ in 0..5000 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            noise.push(x as u8);
        }
        let mut far = noise[..3000].to_vec();
        far.extend_from_slice(&noise[..3000]);

        let inputs: Vec<Vec<u8>> = vec![
            Vec::new(),
            vec![1],
            vec![1, 2],
            vec![1, 2, 3, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 1, 2, 3, 4],
            vec![0xff; 0x10010],
            vec![0; 70_000],
            b"abababababcabcabcabcab".to_vec(),
            sample_text(),
            noise,
            far,
        ];
        for input in inputs {
            let packed = pack(&input);
            assert_eq!(decompress(&packed).expect("decompress"), input);
        }
    }

    #[test]
    fn shrinks_repetitive_data() {
        let input = sample_text();
        assert!(pack(&input).len() < input.len() / 2);
        assert!(pack(&[0u8; 4096]).len() < 64);
    }

    #[test]
    fn empty_input_is_just_the_end_marker() {
        let packed = pack(&[]);
        // 49 control bits in two words plus the 0xff marker byte.
        assert_eq!(packed.len(), 9);
        assert_eq!(decompress(&packed).expect("decompress"), Vec::<u8>::new());
    }

    #[test]
    fn growth_stays_within_nine_eighths() {
        let mut x = 0x9e37_79b9u32;
        let input: Vec<u8> = (0..4096)
            .map(|_| {
                x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (x >> 24) as u8
            })
            .collect();
        assert!(pack(&input).len() <= input.len() * 9 / 8 + 16);
    }

    #[test]
    fn reports_full_destination() {
        let mut dst = [0u8; 8];
        let err = Nrv2b.compress(b"hello, world", &mut dst).expect_err("must not fit");
        assert!(matches!(err, CompressError::OutputFull { available: 8, .. }));
    }

    #[test]
    fn rejects_truncated_stream() {
        let packed = pack(&sample_text());
        let err = decompress(&packed[..packed.len() - 1]).expect_err("must fail");
        assert!(matches!(err, DecompressError::UnexpectedEof { .. }));
    }

    #[test]
    fn rejects_match_before_start() {
        // Match flag 0, offset code 2 (reuse last offset 1), length bits 01,
        // with nothing decoded yet.
        let word: u32 = 0b0010_1000 << 24;
        let mut stream = word.to_le_bytes().to_vec();
        stream.extend_from_slice(&[0; 4]);
        let err = decompress(&stream).expect_err("must fail");
        assert_eq!(err, DecompressError::BadOffset { offset: 1, at: 0 });
    }
}

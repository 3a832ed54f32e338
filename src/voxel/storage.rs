//! Bit-packed palette index storage.
//!
//! Each voxel stores a palette index in `bits` bits, packed little-endian
//! into `u64` words. Values may straddle a word boundary.

use crate::core::{Error, Result};

/// Widest supported index, in bits.
pub const MAX_BITS: u8 = 32;

/// Minimum bits needed to represent indices `0..palette_len` (at least 1).
pub const fn bits_required(palette_len: usize) -> u8 {
    if palette_len <= 1 {
        1
    } else {
        (usize::BITS - (palette_len - 1).leading_zeros()) as u8
    }
}

/// Words needed to hold `count` values of `bits` bits each.
pub const fn required_words(count: usize, bits: u8) -> usize {
    (count * bits as usize).div_ceil(64)
}

/// Fixed-length array of small unsigned integers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackedIndices {
    words: Vec<u64>,
    bits: u8,
    len: usize,
}

impl PackedIndices {
    /// `len` zeros at `bits` bits each.
    pub fn new(len: usize, bits: u8) -> Self {
        let bits = bits.clamp(1, MAX_BITS);
        Self {
            words: vec![0; required_words(len, bits)],
            bits,
            len,
        }
    }

    /// Rebuild from persisted words, checking the layout is consistent.
    pub fn from_words(len: usize, bits: u8, words: Vec<u64>) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(Error::corrupt(format!("invalid index width {}", bits)));
        }
        let expected = required_words(len, bits);
        if words.len() != expected {
            return Err(Error::corrupt(format!(
                "expected {} index words for {} values at {} bits, got {}",
                expected,
                len,
                bits,
                words.len()
            )));
        }
        Ok(Self { words, bits, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    /// Value at `index`. Panics if `index >= len`.
    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.len, "packed index {} out of bounds ({})", index, self.len);
        let bit = index * self.bits as usize;
        let word = bit >> 6;
        let offset = bit & 63;
        let mut value = self.words[word] >> offset;
        if offset + self.bits as usize > 64 {
            value |= self.words[word + 1] << (64 - offset);
        }
        (value & self.mask()) as u32
    }

    /// Store `value` at `index`. `value` must fit in the current width.
    pub fn set(&mut self, index: usize, value: u32) {
        assert!(index < self.len, "packed index {} out of bounds ({})", index, self.len);
        debug_assert!((value as u64) <= self.mask(), "value {} needs more than {} bits", value, self.bits);
        let mask = self.mask();
        let value = value as u64 & mask;
        let bit = index * self.bits as usize;
        let word = bit >> 6;
        let offset = bit & 63;

        self.words[word] = (self.words[word] & !(mask << offset)) | (value << offset);
        if offset + self.bits as usize > 64 {
            let spill = 64 - offset;
            self.words[word + 1] = (self.words[word + 1] & !(mask >> spill)) | (value >> spill);
        }
    }

    /// Set every slot to `value`.
    pub fn fill(&mut self, value: u32) {
        if value == 0 {
            self.words.iter_mut().for_each(|w| *w = 0);
            return;
        }
        for index in 0..self.len {
            self.set(index, value);
        }
    }

    /// Change the per-value width, keeping every value.
    pub fn repack(&mut self, bits: u8) {
        let bits = bits.clamp(1, MAX_BITS);
        if bits == self.bits {
            return;
        }
        let mut packed = PackedIndices::new(self.len, bits);
        for index in 0..self.len {
            packed.set(index, self.get(index));
        }
        *self = packed;
    }

    /// Rewrite every value through `f`.
    pub fn map_in_place(&mut self, mut f: impl FnMut(u32) -> u32) {
        for index in 0..self.len {
            let value = self.get(index);
            let mapped = f(value);
            if mapped != value {
                self.set(index, mapped);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(move |index| self.get(index))
    }
}

//! Arbitrary-width bit strings for field values and policy masks.
//!
//! Bit `0` is the least significant bit.  Hex text is read and written
//! most-significant digit first, so `"00000000ffffffff"` is a 64-bit
//! value with the low 32 bits set.

use crate::verified::bits::significant_bits;
use bitvec::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from parsing hex bit strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitsError {
    #[error("invalid hex bit string {text:?}: {reason}")]
    InvalidHex { text: String, reason: String },
}

/// A fixed-width string of bits.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitString {
    bits: BitVec<u64, Lsb0>,
}

impl BitString {
    /// All-zero string of `width` bits.
    pub fn zeros(width: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; width],
        }
    }

    /// All-one string of `width` bits.
    pub fn ones(width: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 1; width],
        }
    }

    /// The low `width` bits of `value`.  Bits above 64 are zero.
    pub fn from_u64(value: u64, width: usize) -> Self {
        let mut out = Self::zeros(width);
        for i in 0..width.min(64) {
            out.bits.set(i, (value >> i) & 1 != 0);
        }
        out
    }

    /// Build from bits listed most significant first.
    pub fn from_msb_first<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut bits: BitVec<u64, Lsb0> = bits.into_iter().collect();
        bits.reverse();
        Self { bits }
    }

    /// Parse hex digits, most significant first.  An optional `0x`
    /// prefix and `_` separators are accepted; width is four bits per
    /// digit.
    pub fn from_hex(text: &str) -> Result<Self, BitsError> {
        let trimmed = text.trim();
        let digits: String = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed)
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if digits.is_empty() {
            return Err(BitsError::InvalidHex {
                text: text.to_string(),
                reason: "no digits".to_string(),
            });
        }

        let width = digits.len() * 4;
        // hex::decode wants whole bytes
        let padded = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits
        };
        let bytes = hex::decode(&padded).map_err(|e| BitsError::InvalidHex {
            text: text.to_string(),
            reason: e.to_string(),
        })?;

        let mut out = Self::zeros(width);
        for (i, byte) in bytes.iter().rev().enumerate() {
            for b in 0..8 {
                let idx = i * 8 + b;
                if idx < width {
                    out.bits.set(idx, (byte >> b) & 1 != 0);
                }
            }
        }
        Ok(out)
    }

    /// Number of bits.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Index of the highest set bit plus one (0 when all zero).
    pub fn significant_width(&self) -> usize {
        self.bits.last_one().map_or(0, |i| i + 1)
    }

    /// Re-width to exactly `width` bits.
    ///
    /// Leading zeros are dropped or added freely; returns `None` if a set
    /// bit would be lost.
    pub fn fit_to(&self, width: usize) -> Option<Self> {
        if self.significant_width() > width {
            return None;
        }
        let mut bits = self.bits.clone();
        bits.resize(width, false);
        Some(Self { bits })
    }

    /// Value as `u64`, if it has at most 64 significant bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.significant_width() > 64 {
            return None;
        }
        Some(
            self.bits
                .iter_ones()
                .fold(0u64, |acc, i| acc | (1u64 << i)),
        )
    }

    pub fn get(&self, index: usize) -> bool {
        self.bits.get(index).map_or(false, |b| *b)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.bits.set(index, value);
    }

    pub fn is_all_zero(&self) -> bool {
        self.bits.not_any()
    }

    pub fn is_all_one(&self) -> bool {
        self.bits.all()
    }

    /// Bits from most significant to least significant.
    pub fn iter_msb_first(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().rev().map(|b| *b)
    }

    /// Hex digits, most significant first, zero padded to the width.
    pub fn to_hex(&self) -> String {
        let digits = self.width().div_ceil(4);
        let mut out = String::with_capacity(digits);
        for d in (0..digits).rev() {
            let mut nibble = 0u8;
            for b in 0..4 {
                if self.get(d * 4 + b) {
                    nibble |= 1 << b;
                }
            }
            out.push(char::from_digit(nibble as u32, 16).unwrap_or('0'));
        }
        out
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString({}'h{})", self.width(), self.to_hex())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h{}", self.width(), self.to_hex())
    }
}

impl From<u64> for BitString {
    /// A value with exactly as many bits as it needs (at least one).
    fn from(value: u64) -> Self {
        Self::from_u64(value, significant_bits(value).max(1) as usize)
    }
}

impl Serialize for BitString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BitString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        // a zero-width string serializes as ""
        if text.trim().is_empty() {
            return Ok(BitString::default());
        }
        BitString::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

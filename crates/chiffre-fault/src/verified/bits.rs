//! Bit and word arithmetic shared by the serializer and mask generator.

/// Width of one scan-register word in bits.
pub const WORD_BITS: u32 = 32;

/// Number of 32-bit words needed to hold `bits` bits.
///
/// # Examples
///
/// ```
/// use chiffre_fault::verified::bits::words_for_bits;
///
/// assert_eq!(words_for_bits(0), 0);
/// assert_eq!(words_for_bits(1), 1);
/// assert_eq!(words_for_bits(64), 2);
/// assert_eq!(words_for_bits(65), 3);
/// ```
pub const fn words_for_bits(bits: u64) -> u64 {
    bits.div_ceil(WORD_BITS as u64)
}

/// Round `bits` up to a whole number of words.
pub const fn round_up_to_word(bits: u64) -> u64 {
    words_for_bits(bits) * WORD_BITS as u64
}

/// Per-draw threshold for a trigger probability.
///
/// A bit is set iff a uniformly drawn `u32` is strictly below the
/// threshold.  `0.0` maps to `0` (never) and `1.0` to `2^32` (always),
/// so both endpoints are exact.  Returns `None` outside `[0, 1]` or for
/// NaN.
pub fn probability_threshold(probability: f64) -> Option<u64> {
    if !(0.0..=1.0).contains(&probability) {
        return None;
    }
    if probability == 1.0 {
        return Some(1u64 << 32);
    }
    let threshold = (probability * (1u64 << 32) as f64).floor() as u64;

    // Tiger Style: below 1.0 the threshold never reaches "always".
    debug_assert!(threshold < (1u64 << 32));

    Some(threshold)
}

/// Threshold encoded into a `width`-bit difficulty register.
///
/// `floor(probability * (2^width - 1))`, saturating at the field maximum.
/// `width` must be in `1..=64`.
pub fn difficulty_value(probability: f64, width: u32) -> Option<u64> {
    if !(0.0..=1.0).contains(&probability) || width == 0 || width > 64 {
        return None;
    }
    let max = low_mask(width);
    if probability == 1.0 {
        return Some(max);
    }
    Some(((probability * max as f64).floor() as u64).min(max))
}

/// A mask of the `width` low bits (`width` in `0..=64`).
pub const fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Number of significant bits in `value` (0 for 0).
pub const fn significant_bits(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Pack MSB-first bits into words: bit `i` of the stream lands in bit
/// `31 - (i % 32)` of word `i / 32`.  The tail is zero padded.
pub fn pack_msb_first(bits: &[bool]) -> Vec<u32> {
    let mut words = vec![0u32; words_for_bits(bits.len() as u64) as usize];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            words[i / 32] |= 1 << (31 - (i % 32));
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_counts() {
        assert_eq!(words_for_bits(31), 1);
        assert_eq!(words_for_bits(32), 1);
        assert_eq!(words_for_bits(33), 2);
        assert_eq!(round_up_to_word(33), 64);
        assert_eq!(round_up_to_word(0), 0);
    }

    #[test]
    fn threshold_endpoints_are_exact() {
        assert_eq!(probability_threshold(0.0), Some(0));
        assert_eq!(probability_threshold(1.0), Some(1 << 32));
        assert_eq!(probability_threshold(0.5), Some(1 << 31));
    }

    #[test]
    fn threshold_rejects_out_of_range() {
        assert_eq!(probability_threshold(-0.01), None);
        assert_eq!(probability_threshold(1.01), None);
        assert_eq!(probability_threshold(f64::NAN), None);
        assert_eq!(probability_threshold(f64::INFINITY), None);
    }

    #[test]
    fn difficulty_scales_to_field() {
        assert_eq!(difficulty_value(0.0, 32), Some(0));
        assert_eq!(difficulty_value(1.0, 32), Some(0xffff_ffff));
        assert_eq!(difficulty_value(0.5, 8), Some(127));
        assert_eq!(difficulty_value(1.0, 64), Some(u64::MAX));
        assert_eq!(difficulty_value(0.5, 0), None);
    }

    #[test]
    fn low_mask_widths() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(1), 1);
        assert_eq!(low_mask(32), 0xffff_ffff);
        assert_eq!(low_mask(64), u64::MAX);
    }

    #[test]
    fn significant_bit_count() {
        assert_eq!(significant_bits(0), 0);
        assert_eq!(significant_bits(1), 1);
        assert_eq!(significant_bits(0xdead_beef), 32);
        assert_eq!(significant_bits(u64::MAX), 64);
    }

    #[test]
    fn pack_places_first_bit_in_msb() {
        let mut bits = vec![false; 33];
        bits[0] = true;
        bits[31] = true;
        bits[32] = true;
        assert_eq!(pack_msb_first(&bits), vec![0x8000_0001, 0x8000_0000]);
    }

    #[test]
    fn pack_empty() {
        assert!(pack_msb_first(&[]).is_empty());
    }
}

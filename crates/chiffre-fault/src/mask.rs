//! Deterministic fault-mask generation.
//!
//! Random flip masks come from a ChaCha20 stream keyed only by the policy
//! seed, so the same `(seed, probability, width)` sequence reproduces the
//! same masks on any machine and in any reimplementation.  Every mask bit
//! consumes exactly one 32-bit draw, independent of the probability, which
//! keeps stream positions stable when only the probability changes.

use crate::bits::BitString;
use crate::policy::PolicyError;
use crate::verified::bits::probability_threshold;
use crate::verified::seed::expand_seed;
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Generate a single `width`-bit mask where each bit is set with
/// `probability`.
///
/// Equivalent to the first mask drawn from
/// [`FaultMaskGenerator::new(seed)`](FaultMaskGenerator::new).
///
/// # Example
///
/// ```
/// use chiffre_fault::mask::generate;
///
/// let a = generate(7, 0.25, 64).unwrap();
/// let b = generate(7, 0.25, 64).unwrap();
/// assert_eq!(a, b);
/// assert!(generate(7, 0.0, 64).unwrap().is_all_zero());
/// assert!(generate(7, 1.0, 64).unwrap().is_all_one());
/// ```
pub fn generate(seed: u64, probability: f64, width: usize) -> Result<BitString, PolicyError> {
    FaultMaskGenerator::new(seed).next_mask(probability, width)
}

/// A seeded stream of fault masks.
///
/// One generator is created per compilation and consumed in chain order,
/// then field order.
pub struct FaultMaskGenerator {
    seed: u64,
    rng: ChaCha20Rng,
}

impl FaultMaskGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha20Rng::from_seed(expand_seed(seed)),
        }
    }

    /// The seed this stream was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of 32-bit draws consumed so far.
    pub fn position(&self) -> u128 {
        self.rng.get_word_pos()
    }

    /// Draw the next `width`-bit mask, most significant bit first.
    pub fn next_mask(&mut self, probability: f64, width: usize) -> Result<BitString, PolicyError> {
        let threshold = probability_threshold(probability)
            .ok_or(PolicyError::ProbabilityOutOfRange { probability })?;

        let start = self.position();
        let mask = BitString::from_msb_first(
            (0..width).map(|_| (self.rng.next_u32() as u64) < threshold),
        );

        // Tiger Style: one draw per bit
        debug_assert_eq!(self.position() - start, width as u128);

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn half_probability_is_mixed() {
        let mask = generate(0, 0.5, 32).unwrap();
        assert!(!mask.is_all_zero());
        assert!(!mask.is_all_one());
        assert_eq!(mask, generate(0, 0.5, 32).unwrap());
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(generate(1, 0.5, 64).unwrap(), generate(2, 0.5, 64).unwrap());
    }

    #[test]
    fn stream_advances_one_draw_per_bit() {
        let mut gen = FaultMaskGenerator::new(9);
        assert_eq!(gen.seed(), 9);
        assert_eq!(gen.position(), 0);
        gen.next_mask(0.5, 13).unwrap();
        assert_eq!(gen.position(), 13);
        gen.next_mask(0.0, 7).unwrap();
        assert_eq!(gen.position(), 20);
    }

    #[test]
    fn first_stream_mask_matches_generate() {
        let mut gen = FaultMaskGenerator::new(42);
        assert_eq!(gen.next_mask(0.3, 48).unwrap(), generate(42, 0.3, 48).unwrap());
        assert_ne!(gen.next_mask(0.3, 48).unwrap(), generate(42, 0.3, 48).unwrap());
    }

    #[test]
    fn probability_does_not_shift_stream() {
        let mut a = FaultMaskGenerator::new(5);
        let mut b = FaultMaskGenerator::new(5);
        a.next_mask(0.1, 16).unwrap();
        b.next_mask(0.9, 16).unwrap();
        assert_eq!(a.next_mask(0.5, 16).unwrap(), b.next_mask(0.5, 16).unwrap());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(matches!(
            generate(0, 1.5, 8),
            Err(PolicyError::ProbabilityOutOfRange { .. })
        ));
        assert!(generate(0, -0.1, 8).is_err());
        assert!(generate(0, f64::NAN, 8).is_err());
    }

    #[test]
    fn zero_width_mask() {
        assert_eq!(generate(0, 0.5, 0).unwrap().width(), 0);
    }

    proptest! {
        #[test]
        fn zero_probability_is_all_zero(seed in any::<u64>(), width in 1usize..300) {
            let mask = generate(seed, 0.0, width).unwrap();
            prop_assert_eq!(mask.width(), width);
            prop_assert!(mask.is_all_zero());
        }

        #[test]
        fn unit_probability_is_all_one(seed in any::<u64>(), width in 1usize..300) {
            let mask = generate(seed, 1.0, width).unwrap();
            prop_assert_eq!(mask.width(), width);
            prop_assert!(mask.is_all_one());
        }

        #[test]
        fn generation_is_deterministic(
            seed in any::<u64>(),
            probability in 0.0f64..=1.0,
            width in 0usize..300,
        ) {
            let a = generate(seed, probability, width).unwrap();
            let b = generate(seed, probability, width).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

//! MISR signature over scan-chain payload words.
//!
//! The optional image checksum is the state of a 32-bit multiple-input
//! signature register after absorbing every payload word, which is what
//! the `CHECK` operation reports once the chain is loaded.

/// Feedback polynomial x^32 + x^22 + x^2 + x^1 + 1.
pub const MISR_POLY_32: u32 = 0x8020_0003;

/// Absorb one word into the signature (Galois form).
#[inline]
pub const fn misr_update(signature: u32, data: u32, poly: u32) -> u32 {
    let shifted = signature >> 1;
    let feedback = if signature & 1 != 0 { poly } else { 0 };
    shifted ^ feedback ^ data
}

/// Signature of a word sequence, starting from zero.
pub fn misr_signature(words: &[u32]) -> u32 {
    words
        .iter()
        .fold(0, |sig, &w| misr_update(sig, w, MISR_POLY_32))
}

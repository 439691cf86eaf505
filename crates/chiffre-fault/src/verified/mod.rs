//! Verified pure functions for the scan-chain compiler.
//!
//! Small arithmetic kernels pulled out of the serializer and mask
//! generator: word counting, MSB-first packing, probability thresholds
//! and signature steps.  Every function here takes values in and returns
//! values out, with **no I/O and no external state mutation**, so they
//! can be exercised with plain `#[test]`s and reasoned about in
//! isolation from the `bitvec`/`rand_chacha` shell around them.

pub mod bits;
pub mod seed;
pub mod signature;

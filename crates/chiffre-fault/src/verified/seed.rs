//! Seed expansion for the fault-mask stream.

/// Expand a u64 seed into a 32-byte ChaCha20 key.
///
/// The seed's little-endian bytes fill the first 8 bytes; the rest are
/// zero.
///
/// # Examples
///
/// ```
/// use chiffre_fault::verified::seed::expand_seed;
///
/// let key = expand_seed(0x0102030405060708);
/// assert_eq!(&key[..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
/// assert_eq!(&key[8..], &[0u8; 24]);
/// ```
pub fn expand_seed(seed: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());

    // Tiger Style: remaining key bytes are zero
    debug_assert!(key[8..].iter().all(|&b| b == 0));

    key
}

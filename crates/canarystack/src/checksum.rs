//! Seeded checksum over arbitrary byte ranges.
//!
//! Used to fingerprint the backing buffer and the control block. This is a
//! corruption detector, not a security primitive: the requirement is that the
//! same input always yields the same value and that any change to the input
//! changes the value with overwhelming probability.
//!
//! The default is SipHash-2-4 keyed from the seed. Builds with the
//! `checksum-blake3` feature use a keyed BLAKE3 digest truncated to 64 bits.

/// Compute the checksum of `bytes` under `seed`.
#[must_use]
pub fn checksum(bytes: &[u8], seed: u64) -> u64 {
    #[cfg(feature = "checksum-blake3")]
    {
        blake3_keyed(bytes, seed)
    }
    #[cfg(not(feature = "checksum-blake3"))]
    {
        let (k0, k1) = keys_from_seed(seed);
        sip_hash_2_4(bytes, k0, k1)
    }
}

/// Spread a 64-bit seed over the two SipHash key words.
#[cfg_attr(feature = "checksum-blake3", allow(dead_code))]
fn keys_from_seed(seed: u64) -> (u64, u64) {
    let k0 = seed ^ 0x0706_0504_0302_0100;
    let k1 = seed.rotate_left(32) ^ 0x0F0E_0D0C_0B0A_0908;
    (k0, k1)
}

#[cfg(feature = "checksum-blake3")]
fn blake3_keyed(bytes: &[u8], seed: u64) -> u64 {
    let mut key = [0u8; 32];
    for (i, chunk) in key.chunks_exact_mut(8).enumerate() {
        chunk.copy_from_slice(&seed.rotate_left(16 * i as u32).to_le_bytes());
    }
    let digest = blake3::keyed_hash(&key, bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// SipHash-2-4 over a byte slice with an explicit 128-bit key.
#[cfg_attr(feature = "checksum-blake3", allow(dead_code))]
pub(crate) fn sip_hash_2_4(bytes: &[u8], k0: u64, k1: u64) -> u64 {
    let mut v0: u64 = k0 ^ 0x736f_6d65_7073_6575;
    let mut v1: u64 = k1 ^ 0x646f_7261_6e64_6f6d;
    let mut v2: u64 = k0 ^ 0x6c79_6765_6e65_7261;
    let mut v3: u64 = k1 ^ 0x7465_6462_7974_6573;

    let mut words = bytes.chunks_exact(8);
    for chunk in &mut words {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let m = u64::from_le_bytes(word);
        v3 ^= m;
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= m;
    }

    // Last block: remaining bytes, length in the top byte.
    let mut last = (bytes.len() as u64) << 56;
    for (i, &b) in words.remainder().iter().enumerate() {
        last |= u64::from(b) << (8 * i);
    }
    v3 ^= last;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    v0 ^= last;

    // Finalization
    v2 ^= 0xFF;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);

    v0 ^ v1 ^ v2 ^ v3
}

#[inline(always)]
fn sip_round(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);
    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;
    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;
    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Key bytes 00..0f, as in the SipHash reference vectors.
    const REF_K0: u64 = 0x0706_0504_0302_0100;
    const REF_K1: u64 = 0x0F0E_0D0C_0B0A_0908;

    #[test]
    fn sip_matches_reference_vectors() {
        assert_eq!(sip_hash_2_4(&[], REF_K0, REF_K1), 0x726f_db47_dd0e_0e31);
        let msg: Vec<u8> = (0u8..15).collect();
        assert_eq!(sip_hash_2_4(&msg, REF_K0, REF_K1), 0xa129_ca61_49be_45e5);
    }

    #[test]
    fn checksum_is_deterministic() {
        let data = b"guarded stack payload";
        assert_eq!(checksum(data, 7), checksum(data, 7));
    }

    #[test]
    fn seed_changes_checksum() {
        let data = [0x11u8; 48];
        assert_ne!(checksum(&data, 1), checksum(&data, 2));
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let mut data = [0u8; 64];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        let clean = checksum(&data, 42);
        for idx in [0usize, 7, 8, 31, 63] {
            let mut flipped = data;
            flipped[idx] ^= 0x01;
            assert_ne!(checksum(&flipped, 42), clean, "flip at byte {idx} undetected");
        }
    }

    #[test]
    fn length_is_part_of_the_checksum() {
        assert_ne!(checksum(&[0u8; 8], 3), checksum(&[0u8; 9], 3));
        assert_ne!(checksum(&[], 3), checksum(&[0u8], 3));
    }
}

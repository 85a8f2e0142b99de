//! djb2-xor key hash shared by the writer and the reader.

use crate::consts::{BUCKETS, HASH_SEED};

/// `h = h * 33 ^ byte` over every byte value of `key`, wrapping at 2^32.
#[inline]
pub fn hash(key: &[u8]) -> u32 {
    key.iter()
        .fold(HASH_SEED, |h, &b| h.wrapping_mul(33) ^ u32::from(b))
}

#[inline]
pub fn bucket_of(hash: u32) -> usize { (hash as usize) & (BUCKETS - 1) }

/// First slot to probe in a table of `slots` cells. `slots` must be non-zero.
#[inline]
pub fn primary_slot(hash: u32, slots: u32) -> u32 {
    debug_assert!(slots > 0, "empty tables are never probed");
    (hash >> 8) % slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_seed() {
        assert_eq!(hash(b""), 5381);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(hash(b"a"), 177_604);
        let ab = 177_604u32.wrapping_mul(33) ^ u32::from(b'b');
        assert_eq!(hash(b"ab"), ab);
    }

    #[test]
    fn hashes_byte_values_not_positions() {
        // A position-based hash would give these two keys the same value.
        assert_ne!(hash(&[7, 7]), hash(&[0, 1]));
        assert_eq!(hash(&[0, 1]), (5381u32.wrapping_mul(33)).wrapping_mul(33) ^ 1);
    }

    #[test]
    fn long_keys_wrap() {
        let key = vec![0xFFu8; 4096];
        assert_eq!(hash(&key), hash(&key.clone()));
    }

    #[test]
    fn bucket_and_primary_slot() {
        let h = 0x1234_5607;
        assert_eq!(bucket_of(h), 7);
        assert_eq!(primary_slot(h, 1), 0);
        assert_eq!(primary_slot(h, 0x1000), 0x456);
    }
}

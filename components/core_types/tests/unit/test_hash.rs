//! Unit tests for the hashing algorithms

use core_types::{hash_bytes, hash_float, hash_int, hash_small_int, HashSecret, HASH_MODULUS};
use num_bigint::BigInt;

#[cfg(test)]
mod secret_tests {
    use super::*;

    #[test]
    fn test_views_alias_the_same_bytes() {
        let mut bytes = [0u8; 24];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let secret = HashSecret::from_bytes(bytes);
        assert_eq!(secret.fnv_prefix(), secret.siphash_k0() as i64);
        assert_eq!(secret.fnv_suffix(), secret.siphash_k1() as i64);
        assert_eq!(secret.djbx33a_suffix(), secret.expat_hashsalt());
        assert_eq!(secret.siphash_k0(), u64::from_le_bytes([0, 1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(secret.as_bytes(), &bytes);
    }
}

#[cfg(test)]
mod bytes_hash_tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_for_fixed_seed() {
        let first = HashSecret::from_seed(42);
        let second = HashSecret::from_seed(42);
        assert_eq!(hash_bytes(&first, b"Monty Python"), hash_bytes(&second, b"Monty Python"));
    }

    #[test]
    fn test_hash_depends_on_seed() {
        let first = HashSecret::from_seed(1);
        let second = HashSecret::from_seed(2);
        assert_ne!(hash_bytes(&first, b"jo"), hash_bytes(&second, b"jo"));
    }

    #[test]
    fn test_hash_never_minus_one() {
        let secret = HashSecret::default();
        for word in ["a", "bb", "ccc", "spam", "eggs", "hello world"] {
            assert_ne!(hash_bytes(&secret, word.as_bytes()), -1);
        }
    }
}

#[cfg(test)]
mod numeric_hash_tests {
    use super::*;

    #[test]
    fn test_equal_numbers_hash_equal() {
        for value in [0i64, 1, -1, 2, 1000, -123_456_789] {
            assert_eq!(hash_small_int(value), hash_float(value as f64));
            assert_eq!(hash_small_int(value), hash_int(&BigInt::from(value)));
        }
    }

    #[test]
    fn test_modulus_wraps() {
        assert_eq!(hash_small_int(HASH_MODULUS as i64 + 1), 1);
        assert_eq!(hash_int(&(BigInt::from(HASH_MODULUS) + BigInt::from(10u32))), 10);
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(hash_float(f64::NEG_INFINITY), -314_159);
        assert_eq!(hash_float(f64::NAN), 0);
    }
}

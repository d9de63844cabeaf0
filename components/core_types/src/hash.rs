//! Hash algorithms for literal values.
//!
//! Strings and bytes hash with SipHash-2-4 keyed by the runtime's
//! [`HashSecret`]. Numbers use the modular scheme that makes equal numeric
//! values of different types hash alike: the hash of `x` is `x` reduced
//! modulo the Mersenne prime 2^61 - 1, with the sign preserved and -1
//! replaced by -2.

use num_bigint::{BigInt, Sign};
use num_traits::{Float, ToPrimitive};

/// Modulus of the numeric hash.
pub const HASH_MODULUS: u64 = (1 << HASH_BITS) - 1;
const HASH_BITS: u32 = 61;
const HASH_INF: i64 = 314_159;
const HASH_NAN: i64 = 0;

/// Seed material for keyed hashing.
///
/// The 24 bytes can be read through several structured views. All views
/// alias the same bytes, so `fnv_prefix() == siphash_k0() as i64`,
/// `fnv_suffix() == siphash_k1() as i64` and
/// `djbx33a_suffix() == expat_hashsalt()` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSecret {
    bytes: [u8; 24],
}

impl HashSecret {
    /// Derive a secret deterministically from `seed`.
    pub fn from_seed(seed: u64) -> Self {
        let mut state = seed;
        let mut bytes = [0u8; 24];
        for chunk in bytes.chunks_mut(8) {
            // splitmix64
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            chunk.copy_from_slice(&z.to_le_bytes());
        }
        HashSecret { bytes }
    }

    /// Use `bytes` verbatim.
    pub fn from_bytes(bytes: [u8; 24]) -> Self {
        HashSecret { bytes }
    }

    /// The raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; 24] {
        &self.bytes
    }

    fn word(&self, index: usize) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.bytes[index * 8..index * 8 + 8]);
        u64::from_le_bytes(word)
    }

    /// First SipHash key.
    pub fn siphash_k0(&self) -> u64 {
        self.word(0)
    }

    /// Second SipHash key.
    pub fn siphash_k1(&self) -> u64 {
        self.word(1)
    }

    /// FNV prefix view of the first eight bytes.
    pub fn fnv_prefix(&self) -> i64 {
        self.word(0) as i64
    }

    /// FNV suffix view of the second eight bytes.
    pub fn fnv_suffix(&self) -> i64 {
        self.word(1) as i64
    }

    /// DJBX33A suffix view of the last eight bytes.
    pub fn djbx33a_suffix(&self) -> i64 {
        self.word(2) as i64
    }

    /// Expat salt view of the last eight bytes.
    pub fn expat_hashsalt(&self) -> i64 {
        self.word(2) as i64
    }
}

impl Default for HashSecret {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

#[inline]
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

/// SipHash-2-4 of `data` with keys `k0`, `k1`.
pub fn siphash24(k0: u64, k1: u64, data: &[u8]) -> u64 {
    let mut v0 = k0 ^ 0x736f_6d65_7073_6575;
    let mut v1 = k1 ^ 0x646f_7261_6e64_6f6d;
    let mut v2 = k0 ^ 0x6c79_6765_6e65_7261;
    let mut v3 = k1 ^ 0x7465_6462_7974_6573;

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let m = u64::from_le_bytes(word);
        v3 ^= m;
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= m;
    }

    let mut last = (data.len() as u64 & 0xff) << 56;
    for (i, byte) in chunks.remainder().iter().enumerate() {
        last |= (*byte as u64) << (8 * i);
    }
    v3 ^= last;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    v0 ^= last;

    v2 ^= 0xff;
    for _ in 0..4 {
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    }
    v0 ^ v1 ^ v2 ^ v3
}

fn fix_minus_one(hash: i64) -> i64 {
    if hash == -1 {
        -2
    } else {
        hash
    }
}

/// Hash of a str or bytes value. The empty sequence hashes to zero.
pub fn hash_bytes(secret: &HashSecret, data: &[u8]) -> i64 {
    if data.is_empty() {
        return 0;
    }
    let hash = siphash24(secret.siphash_k0(), secret.siphash_k1(), data) as i64;
    fix_minus_one(hash)
}

/// Hash of an integer that fits a machine word.
pub fn hash_small_int(value: i64) -> i64 {
    let magnitude = value.unsigned_abs() % HASH_MODULUS;
    let hash = if value < 0 {
        -(magnitude as i64)
    } else {
        magnitude as i64
    };
    fix_minus_one(hash)
}

/// Hash of an arbitrary precision integer.
pub fn hash_int(value: &BigInt) -> i64 {
    let modulus = BigInt::from(HASH_MODULUS);
    let magnitude = (value.magnitude() % modulus.magnitude())
        .to_u64()
        .unwrap_or(0) as i64;
    let hash = match value.sign() {
        Sign::Minus => -magnitude,
        _ => magnitude,
    };
    fix_minus_one(hash)
}

/// Hash of a float. Integral values hash like the equal integer.
pub fn hash_float(value: f64) -> i64 {
    if value.is_nan() {
        return HASH_NAN;
    }
    if value.is_infinite() {
        return if value > 0.0 { HASH_INF } else { -HASH_INF };
    }
    let (mantissa, exponent, sign) = Float::integer_decode(value);
    if mantissa == 0 {
        return 0;
    }
    // value == sign * mantissa * 2**exponent and mantissa < 2**53, so the
    // reduction is a rotation of the mantissa within 61 bits.
    let mut x = mantissa % HASH_MODULUS;
    let exponent = exponent as i64;
    let shift = if exponent >= 0 {
        exponent % HASH_BITS as i64
    } else {
        HASH_BITS as i64 - 1 - ((-1 - exponent) % HASH_BITS as i64)
    } as u32;
    if shift != 0 {
        x = ((x << shift) & HASH_MODULUS) | (x >> (HASH_BITS - shift));
    }
    let hash = x as i64 * sign as i64;
    fix_minus_one(hash)
}

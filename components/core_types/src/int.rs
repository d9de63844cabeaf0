//! Digit encoding of large integers.
//!
//! A LargeInt stores its value as little-endian 64-bit digits in two's
//! complement, sign-extended from the most significant digit. The encoding
//! is canonical: the top digit is never a redundant sign extension of the
//! digit below it.

use num_bigint::BigInt;

/// Canonical digits of `value`.
pub fn digits_from_bigint(value: &BigInt) -> Vec<u64> {
    let bytes = value.to_signed_bytes_le();
    let fill = if bytes.last().is_some_and(|byte| byte & 0x80 != 0) {
        0xff
    } else {
        0
    };
    let mut digits: Vec<u64> = bytes
        .chunks(8)
        .map(|chunk| {
            let mut word = [fill; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect();
    if digits.is_empty() {
        digits.push(0);
    }
    normalize_digits(&mut digits);
    digits
}

/// Value of two's complement `digits`.
pub fn bigint_from_digits(digits: &[u64]) -> BigInt {
    let bytes: Vec<u8> = digits.iter().flat_map(|digit| digit.to_le_bytes()).collect();
    BigInt::from_signed_bytes_le(&bytes)
}

fn is_negative(digit: u64) -> bool {
    (digit as i64) < 0
}

/// Whether `digits` is the shortest encoding of its value.
pub fn is_canonical(digits: &[u64]) -> bool {
    match digits {
        [] => false,
        [_] => true,
        [.., below, top] => {
            !((*top == 0 && !is_negative(*below)) || (*top == u64::MAX && is_negative(*below)))
        }
    }
}

/// Drop redundant sign-extension digits.
pub fn normalize_digits(digits: &mut Vec<u64>) {
    while digits.len() > 1 && !is_canonical(digits) {
        digits.pop();
    }
}

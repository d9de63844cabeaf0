//! Contract compliance tests for core_types
//!
//! These tests pin the observable encoding other components rely on:
//! immediate layout ids, the LOAD_IMMEDIATE operand scheme and canonical
//! LargeInt digits.

use core_types::{
    bigint_from_digits, digits_from_bigint, is_canonical, object_from_oparg, LayoutId, RawObject,
};
use num_bigint::BigInt;

#[cfg(test)]
mod layout_contract_tests {
    use super::*;

    /// Contract: immediate layout ids are fixed
    #[test]
    fn test_immediate_layout_ids_are_fixed() {
        assert_eq!(LayoutId::SMALL_INT.raw(), 0);
        assert_eq!(LayoutId::BOOL.raw(), 7);
        assert_eq!(LayoutId::NONE_TYPE.raw(), 15);
        assert_eq!(LayoutId::ERROR.raw(), 23);
        assert_eq!(LayoutId::SMALL_STR.raw(), 31);
        assert_eq!(LayoutId::OBJECT.raw(), 32);
    }

    /// Contract: an immediate's layout is derivable from its word
    #[test]
    fn test_immediates_report_their_layout() {
        assert_eq!(
            RawObject::small_str("x").unwrap().immediate_layout_id(),
            Some(LayoutId::SMALL_STR)
        );
        assert_eq!(RawObject::bool(false).immediate_layout_id(), Some(LayoutId::BOOL));
    }
}

#[cfg(test)]
mod oparg_contract_tests {
    use super::*;

    /// Contract: operand bytes decode by sign extension
    #[test]
    fn test_operand_sign_extends() {
        assert_eq!(object_from_oparg(-2).raw(), u64::MAX - 1);
        assert_eq!(object_from_oparg(-2).as_small_int(), Some(-1));
        assert_eq!(object_from_oparg(15), RawObject::none());
    }
}

#[cfg(test)]
mod large_int_contract_tests {
    use super::*;

    /// Contract: no bignum uses more digits than it needs
    #[test]
    fn test_digits_are_canonical() {
        for value in [
            BigInt::from(0i64),
            BigInt::from(-1i64),
            BigInt::from(u64::MAX),
            BigInt::from(i64::MIN),
            BigInt::from(u64::MAX) * BigInt::from(u64::MAX),
            -(BigInt::from(u64::MAX) * BigInt::from(17u32)),
        ] {
            let digits = digits_from_bigint(&value);
            assert!(is_canonical(&digits), "{} -> {:?}", value, digits);
            assert_eq!(bigint_from_digits(&digits), value);
        }
    }
}

//! Unit tests for RawObject, Header and LayoutId

use core_types::{object_from_oparg, oparg_from_object, Header, LayoutId, ObjectFormat, RawObject, Sentinel};

#[cfg(test)]
mod immediate_tests {
    use super::*;

    #[test]
    fn test_none_is_none() {
        let value = RawObject::none();
        assert!(value.is_none());
        assert!(value.is_immediate());
        assert_eq!(value.immediate_truthiness(), Some(false));
    }

    #[test]
    fn test_bools() {
        assert_eq!(RawObject::bool(true).as_bool(), Some(true));
        assert_eq!(RawObject::bool(false).as_bool(), Some(false));
        assert_ne!(RawObject::bool(true), RawObject::bool(false));
        assert!(RawObject::bool(true).as_small_int().is_none());
    }

    #[test]
    fn test_small_int_negative() {
        let value = RawObject::small_int(-100);
        assert_eq!(value.as_small_int(), Some(-100));
        assert_eq!(value.immediate_truthiness(), Some(true));
    }

    #[test]
    fn test_small_int_zero_is_falsy() {
        assert_eq!(RawObject::small_int(0).immediate_truthiness(), Some(false));
    }

    #[test]
    fn test_small_int_range_covers_62_bits() {
        assert!(RawObject::is_small_int_value((1 << 62) - 1));
        assert!(RawObject::is_small_int_value(-(1 << 62)));
        assert!(!RawObject::is_small_int_value(1 << 62));
        assert!(!RawObject::is_small_int_value(-(1 << 62) - 1));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RawObject::error_not_found().as_error(), Some(Sentinel::NotFound));
        assert_eq!(RawObject::unbound().as_error(), Some(Sentinel::Unbound));
        assert!(RawObject::error_exception().is_error_exception());
        assert!(!RawObject::error_not_found().is_error_exception());
    }

    #[test]
    fn test_small_str_empty() {
        let empty = RawObject::empty_str();
        assert_eq!(RawObject::small_str(""), Some(empty));
        assert_eq!(empty.small_str_length(), Some(0));
        assert_eq!(empty.immediate_truthiness(), Some(false));
    }

    #[test]
    fn test_small_strs_compare_by_content() {
        assert_eq!(RawObject::small_str("foo"), RawObject::small_str("foo"));
        assert_ne!(RawObject::small_str("foo"), RawObject::small_str("bar"));
    }
}

#[cfg(test)]
mod oparg_tests {
    use super::*;

    #[test]
    fn test_load_immediate_candidates() {
        assert_eq!(object_from_oparg(oparg_from_object(RawObject::none())), RawObject::none());
        assert_eq!(
            object_from_oparg(oparg_from_object(RawObject::bool(true))),
            RawObject::bool(true)
        );
        assert_eq!(
            object_from_oparg(oparg_from_object(RawObject::empty_str())),
            RawObject::empty_str()
        );
    }

    #[test]
    fn test_wide_values_do_not_roundtrip() {
        let wide = RawObject::small_int(64);
        assert_ne!(object_from_oparg(oparg_from_object(wide)), wide);
        let text = RawObject::small_str("a").unwrap();
        assert_ne!(object_from_oparg(oparg_from_object(text)), text);
    }
}

#[cfg(test)]
mod header_tests {
    use super::*;

    #[test]
    fn test_header_is_not_a_heap_reference() {
        let header = Header::new(3, 0, LayoutId::TUPLE, ObjectFormat::ObjectArray).as_raw();
        assert!(header.is_header());
        assert!(!header.is_heap_object());
        assert!(!header.is_immediate());
    }

    #[test]
    fn test_from_raw_rejects_values() {
        assert!(Header::from_raw(RawObject::small_int(3)).is_none());
        assert!(Header::from_raw(RawObject::from_address(0x2000)).is_none());
    }

    #[test]
    fn test_layout_id_bits() {
        let header = Header::new(0, 0, LayoutId::MAX, ObjectFormat::ObjectInstance);
        assert_eq!(header.layout_id(), LayoutId::MAX);
        assert_eq!(header.format(), ObjectFormat::ObjectInstance);
    }
}

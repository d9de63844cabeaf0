//! Unit tests for VmError and ErrorKind

use core_types::{ErrorKind, TracebackEntry, VmError};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::TypeError.name(), "TypeError");
        assert_eq!(ErrorKind::EOFError.name(), "EOFError");
        assert_eq!(ErrorKind::NotImplementedError.name(), "NotImplementedError");
        assert_eq!(ErrorKind::OutOfMemory.name(), "MemoryError");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::IndexError), "IndexError");
    }
}

#[cfg(test)]
mod vm_error_tests {
    use super::*;

    #[test]
    fn test_vm_error_creation() {
        let error = VmError::type_error("'f' takes 1 positional arguments but 2 were given");
        assert_eq!(error.kind, ErrorKind::TypeError);
        assert!(error.message.contains("but 2 were given"));
    }

    #[test]
    fn test_vm_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&VmError::value_error("bad marshal data"));
    }

    #[test]
    fn test_vm_error_traceback_order() {
        let mut error = VmError::new(ErrorKind::ZeroDivisionError, "division by zero");
        error.push_frame("inner", 6);
        error.push_frame("outer", 2);
        assert_eq!(
            error.traceback,
            vec![
                TracebackEntry {
                    function: "inner".to_string(),
                    pc: 6
                },
                TracebackEntry {
                    function: "outer".to_string(),
                    pc: 2
                },
            ]
        );
    }

    #[test]
    fn test_out_of_memory_message() {
        let error = VmError::out_of_memory(4096);
        assert_eq!(error.kind, ErrorKind::OutOfMemory);
        assert_eq!(error.message, "failed to allocate 4096 bytes");
        assert!(!error.kind.is_catchable());
    }

    #[test]
    fn test_unimplemented_is_catchable() {
        let error = VmError::unimplemented("marshal type code 'x'");
        assert_eq!(error.kind, ErrorKind::NotImplementedError);
        assert!(error.kind.is_catchable());
    }
}

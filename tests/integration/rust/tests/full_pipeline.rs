//! Full Pipeline Integration Tests
//!
//! Tests the complete path from a JSON program description through the
//! loader, the runtime and the dispatch loop to the rendered result.

use core_types::ErrorKind;
use interpreter::RuntimeConfig;
use py_cli::{CliError, Program, Runner};

/// ```python
/// class Counter:
///     def __init__(self, start):
///         self.value = start
///     def bump(self):
///         self.value = self.value + 1
///         return self.value
/// c = Counter(10)
/// c.bump()
/// return c.bump()
/// ```
const COUNTER: &str = r#"{
    "bytecode": [
        ["LOAD_BUILD_CLASS", 0], ["LOAD_CONST", 0], ["LOAD_CONST", 1], ["MAKE_FUNCTION", 0],
        ["LOAD_CONST", 1], ["CALL_FUNCTION", 2], ["STORE_NAME", 0],
        ["LOAD_NAME", 0], ["LOAD_CONST", 2], ["CALL_FUNCTION", 1], ["STORE_NAME", 1],
        ["LOAD_NAME", 1], ["LOAD_METHOD", 2], ["CALL_METHOD", 0], ["POP_TOP", 0],
        ["LOAD_NAME", 1], ["LOAD_METHOD", 2], ["CALL_METHOD", 0], ["RETURN_VALUE", 0]
    ],
    "consts": [
        {
            "name": "Counter",
            "bytecode": [
                ["LOAD_CONST", 0], ["LOAD_CONST", 1], ["MAKE_FUNCTION", 0], ["STORE_NAME", 0],
                ["LOAD_CONST", 2], ["LOAD_CONST", 3], ["MAKE_FUNCTION", 0], ["STORE_NAME", 1],
                ["LOAD_CONST", 4], ["RETURN_VALUE", 0]
            ],
            "consts": [
                {
                    "name": "__init__",
                    "argcount": 2,
                    "varnames": ["self", "start"],
                    "names": ["value"],
                    "bytecode": [
                        ["LOAD_FAST", 1], ["LOAD_FAST", 0], ["STORE_ATTR", 0],
                        ["LOAD_CONST", 0], ["RETURN_VALUE", 0]
                    ],
                    "consts": [null]
                },
                "Counter.__init__",
                {
                    "name": "bump",
                    "argcount": 1,
                    "varnames": ["self"],
                    "names": ["value"],
                    "bytecode": [
                        ["LOAD_FAST", 0], ["LOAD_ATTR", 0], ["LOAD_CONST", 0], ["BINARY_ADD", 0],
                        ["LOAD_FAST", 0], ["STORE_ATTR", 0],
                        ["LOAD_FAST", 0], ["LOAD_ATTR", 0], ["RETURN_VALUE", 0]
                    ],
                    "consts": [1]
                },
                "Counter.bump",
                null
            ],
            "names": ["__init__", "bump"]
        },
        "Counter",
        10
    ],
    "names": ["Counter", "c", "bump"]
}"#;

/// ```python
/// try:
///     raise ValueError("bad")
/// except <caught>:
///     return 1
/// return 0
/// ```
fn guarded_raise(caught: &str) -> String {
    format!(
        r#"{{
            "bytecode": [
                ["SETUP_FINALLY", 14],
                ["LOAD_NAME", 0], ["LOAD_CONST", 0], ["CALL_FUNCTION", 1], ["RAISE_VARARGS", 1],
                ["POP_BLOCK", 0], ["LOAD_CONST", 1], ["RETURN_VALUE", 0],
                ["DUP_TOP", 0], ["LOAD_NAME", 1], ["COMPARE_OP", 10], ["POP_JUMP_IF_FALSE", 36],
                ["POP_TOP", 0], ["POP_TOP", 0], ["POP_TOP", 0], ["POP_EXCEPT", 0],
                ["LOAD_CONST", 2], ["RETURN_VALUE", 0],
                ["RERAISE", 0]
            ],
            "consts": ["bad", 0, 1],
            "names": ["ValueError", "{}"]
        }}"#,
        caught
    )
}

fn run(json: &str, config: RuntimeConfig) -> Result<Option<String>, CliError> {
    let program = Program::from_json_str(json).unwrap();
    let mut runner = Runner::new(config).unwrap();
    runner.run(&program, None)
}

fn configs() -> [RuntimeConfig; 2] {
    [
        RuntimeConfig::default(),
        RuntimeConfig {
            cache_enabled: false,
            ..RuntimeConfig::default()
        },
    ]
}

/// Test: Classes with __init__ and methods
#[test]
fn test_pipeline_class_with_methods() {
    for config in configs() {
        assert_eq!(run(COUNTER, config).unwrap(), Some("12".to_string()));
    }
}

/// Test: Collections triggered while the program runs keep its state
#[test]
fn test_pipeline_under_small_heap() {
    let config = RuntimeConfig {
        heap_size: 1 << 21,
        ..RuntimeConfig::default()
    };
    let program = Program::from_json_str(COUNTER).unwrap();
    let mut runner = Runner::new(config).unwrap();
    for _ in 0..50 {
        assert_eq!(runner.run(&program, None).unwrap(), Some("12".to_string()));
    }
}

/// Test: A matching handler catches the exception
#[test]
fn test_pipeline_exception_caught() {
    for config in configs() {
        assert_eq!(run(&guarded_raise("ValueError"), config).unwrap(), Some("1".to_string()));
    }
}

/// Test: A handler for a base class catches subclasses
#[test]
fn test_pipeline_exception_caught_by_base() {
    assert_eq!(
        run(&guarded_raise("Exception"), RuntimeConfig::default()).unwrap(),
        Some("1".to_string())
    );
}

/// Test: A non-matching handler re-raises
#[test]
fn test_pipeline_exception_reraised() {
    for config in configs() {
        let err = run(&guarded_raise("KeyError"), config).unwrap_err();
        let CliError::Vm(err) = err else {
            panic!("expected a runtime error");
        };
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert_eq!(err.message, "bad");
    }
}

/// Test: Attribute errors from program-defined instances
#[test]
fn test_pipeline_missing_attribute() {
    let json = r#"{
        "bytecode": [
            ["LOAD_NAME", 0], ["CALL_FUNCTION", 0], ["LOAD_ATTR", 1], ["RETURN_VALUE", 0]
        ],
        "names": ["object", "missing"]
    }"#;
    let err = run(json, RuntimeConfig::default()).unwrap_err();
    let CliError::Vm(err) = err else {
        panic!("expected a runtime error");
    };
    assert_eq!(err.kind, ErrorKind::AttributeError);
    assert_eq!(err.message, "'object' object has no attribute 'missing'");
}

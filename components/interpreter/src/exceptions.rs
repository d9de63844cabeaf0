//! Exception objects.
//!
//! Errors travel through Rust code as [`VmError`] values. When one reaches
//! bytecode that can observe it, it is materialized as an exception object
//! and stored as the thread's pending exception; errors raised by bytecode
//! start out as objects and carry a [`VmError`] summary for the embedder.

use core_types::{ErrorKind, LayoutId, RawObject, VmError, VmResult};
use memory_manager::{exception_fields, Type};

use crate::runtime::Runtime;

/// Layout of the builtin exception type raised for `kind`.
pub fn layout_for_kind(kind: ErrorKind) -> LayoutId {
    match kind {
        ErrorKind::TypeError => LayoutId::TYPE_ERROR,
        ErrorKind::ValueError => LayoutId::VALUE_ERROR,
        ErrorKind::OverflowError => LayoutId::OVERFLOW_ERROR,
        ErrorKind::IndexError => LayoutId::INDEX_ERROR,
        ErrorKind::KeyError => LayoutId::KEY_ERROR,
        ErrorKind::ImportError => LayoutId::IMPORT_ERROR,
        ErrorKind::EOFError => LayoutId::EOF_ERROR,
        ErrorKind::AttributeError => LayoutId::ATTRIBUTE_ERROR,
        ErrorKind::NameError => LayoutId::NAME_ERROR,
        ErrorKind::ZeroDivisionError => LayoutId::ZERO_DIVISION_ERROR,
        ErrorKind::NotImplementedError => LayoutId::NOT_IMPLEMENTED_ERROR,
        ErrorKind::RecursionError => LayoutId::RECURSION_ERROR,
        ErrorKind::RuntimeError => LayoutId::RUNTIME_ERROR,
        ErrorKind::SystemError => LayoutId::SYSTEM_ERROR,
        ErrorKind::OutOfMemory => LayoutId::MEMORY_ERROR,
        ErrorKind::Exception | ErrorKind::Fatal => LayoutId::EXCEPTION,
    }
}

fn kind_for_layout(id: LayoutId) -> Option<ErrorKind> {
    let kind = match id {
        LayoutId::TYPE_ERROR => ErrorKind::TypeError,
        LayoutId::VALUE_ERROR => ErrorKind::ValueError,
        LayoutId::OVERFLOW_ERROR => ErrorKind::OverflowError,
        LayoutId::INDEX_ERROR => ErrorKind::IndexError,
        LayoutId::KEY_ERROR => ErrorKind::KeyError,
        LayoutId::IMPORT_ERROR => ErrorKind::ImportError,
        LayoutId::EOF_ERROR => ErrorKind::EOFError,
        LayoutId::ATTRIBUTE_ERROR => ErrorKind::AttributeError,
        LayoutId::NAME_ERROR => ErrorKind::NameError,
        LayoutId::ZERO_DIVISION_ERROR => ErrorKind::ZeroDivisionError,
        LayoutId::NOT_IMPLEMENTED_ERROR => ErrorKind::NotImplementedError,
        LayoutId::RECURSION_ERROR => ErrorKind::RecursionError,
        LayoutId::RUNTIME_ERROR => ErrorKind::RuntimeError,
        LayoutId::SYSTEM_ERROR => ErrorKind::SystemError,
        LayoutId::MEMORY_ERROR => ErrorKind::OutOfMemory,
        LayoutId::EXCEPTION | LayoutId::BASE_EXCEPTION => ErrorKind::Exception,
        _ => return None,
    };
    Some(kind)
}

impl Runtime {
    /// The error kind reported for exceptions of type `ty`: that of the
    /// nearest builtin exception class in its MRO.
    pub fn kind_of_type(&self, ty: RawObject) -> ErrorKind {
        self.type_mro(ty)
            .into_iter()
            .filter(|candidate| self.is_builtin_type(*candidate))
            .find_map(|candidate| kind_for_layout(Type::from_raw(candidate).instance_layout(&self.heap)))
            .unwrap_or(ErrorKind::Exception)
    }

    /// Whether `object` is an exception instance.
    pub fn is_exception(&self, object: RawObject) -> bool {
        self.is_exception_type(self.type_of(object))
    }

    /// Whether `ty` derives from BaseException.
    pub fn is_exception_type(&self, ty: RawObject) -> bool {
        self.is_type(ty)
            && self
                .type_mro(ty)
                .iter()
                .any(|base| Type::from_raw(*base).instance_layout(&self.heap) == LayoutId::BASE_EXCEPTION)
    }

    /// Arguments tuple of an exception.
    pub fn exception_args(&self, exception: RawObject) -> RawObject {
        self.heap.field(exception, exception_fields::ARGS)
    }

    /// The message an exception contributes to a [`VmError`].
    pub fn exception_message(&self, exception: RawObject) -> String {
        let args = self.exception_args(exception);
        let message = match self.tuple_items(args).as_deref() {
            None | Some([]) => String::new(),
            Some([single]) => match self.str_value(*single) {
                Some(text) => text,
                None => self.display_value(*single),
            },
            Some(_) => self.display_value(args),
        };
        let ty = self.type_of(exception);
        if self.is_builtin_type(ty) {
            message
        } else if message.is_empty() {
            self.type_name(ty)
        } else {
            format!("{}: {}", self.type_name(ty), message)
        }
    }

    /// Summary of an exception object for the embedder.
    pub fn error_for_exception(&self, exception: RawObject) -> VmError {
        let kind = self.kind_of_type(self.type_of(exception));
        let message = self.exception_message(exception);
        VmError::new(kind, message)
    }

    /// Create an exception with layout `layout` and `args`.
    pub fn new_exception(&mut self, layout: LayoutId, args: RawObject) -> VmResult<RawObject> {
        let num_fields = self
            .layout(layout)
            .filter(|info| info.builtin_fields == exception_fields::SIZE)
            .map(|info| info.num_fields())
            .ok_or_else(|| VmError::fatal(format!("layout {} is not an exception layout", layout.raw())))?;
        let mut live = [args];
        let exception = self.allocate_with(&mut live, |heap, _| heap.create_instance(layout, num_fields))?;
        self.heap.set_field(exception, exception_fields::ARGS, live[0]);
        Ok(exception)
    }

    /// Materialize `error` as the pending exception unless it already is
    /// one. Returns the pending exception, or None for errors that handlers
    /// cannot observe.
    pub fn materialize(&mut self, error: &VmError) -> VmResult<RawObject> {
        if !error.kind.is_catchable() {
            return Ok(RawObject::none());
        }
        if self.thread.has_pending_exception() {
            return Ok(self.thread.pending_exception);
        }
        let exception = self.with_handles(|rt| {
            let message = rt.new_str(&error.message)?;
            let args = rt.new_tuple_from(&[message])?;
            let args = rt.new_handle(args);
            rt.new_exception(layout_for_kind(error.kind), rt.handle(args))
        })?;
        let context = self.thread.handled_exception;
        self.heap.set_field(exception, exception_fields::CONTEXT, context);
        self.thread.pending_exception = exception;
        Ok(exception)
    }

    /// Make `exception` the pending exception and describe it.
    pub fn raise_object(&mut self, exception: RawObject) -> VmError {
        let context = self.thread.handled_exception;
        if context != exception && self.heap.field(exception, exception_fields::CONTEXT).is_none() {
            self.heap.set_field(exception, exception_fields::CONTEXT, context);
        }
        self.thread.pending_exception = exception;
        self.error_for_exception(exception)
    }

    /// Forget the pending exception after an error was handled in Rust.
    pub fn clear_pending_exception(&mut self) {
        self.thread.pending_exception = RawObject::none();
    }

    /// Text of `object` for error messages; never runs program code.
    pub fn display_value(&self, object: RawObject) -> String {
        if let Some(value) = object.as_small_int() {
            return value.to_string();
        }
        if let Some(value) = object.as_bool() {
            return if value { "True" } else { "False" }.to_string();
        }
        if object.is_none() {
            return "None".to_string();
        }
        if let Some(text) = self.str_value(object) {
            return format!("'{}'", text);
        }
        if let Some(value) = self.int_value(object) {
            return value.to_string();
        }
        if let Some(value) = self.float_value(object) {
            return crate::builtins::float_repr(value);
        }
        if let Some(items) = self.tuple_items(object) {
            let parts: Vec<String> = items.iter().map(|item| self.display_value(*item)).collect();
            return if parts.len() == 1 {
                format!("({},)", parts[0])
            } else {
                format!("({})", parts.join(", "))
            };
        }
        if self.is_type(object) {
            return format!("<class '{}'>", self.type_name(object));
        }
        format!("<{} object>", self.type_name_of(object))
    }
}

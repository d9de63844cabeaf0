//! The calling convention.
//!
//! Arguments arrive as a slice of positional values whose last
//! `kwnames.len()` entries are keyword arguments named by `kwnames`, the
//! layout CALL_FUNCTION_KW leaves on the stack. Binding produces the callee's
//! local slots: parameters in varname order, then `*args`, then `**kwargs`,
//! then the remaining locals, all Unbound until assigned.

use core_types::{ErrorKind, LayoutId, RawObject, VmError, VmResult};
use memory_manager::{code_flags, BoundMethod, Code, Function, Handle, Tuple, Type};

use crate::interpreter;
use crate::runtime::Runtime;

fn takes_min(name: &str, min: usize, given: usize) -> String {
    format!("'{}' takes min {} positional arguments but {} given", name, min, given)
}

fn takes_max(name: &str, max: usize, given: usize) -> String {
    format!("'{}' takes max {} positional arguments but {} given", name, max, given)
}

impl Runtime {
    /// Call `callable` with positional `args`.
    pub fn call(&mut self, callable: RawObject, args: &[RawObject]) -> VmResult<RawObject> {
        self.call_kw(callable, args, &[])
    }

    /// Call `callable` with `args`, the last `kwnames.len()` of which are
    /// keyword arguments.
    pub fn call_kw(&mut self, callable: RawObject, args: &[RawObject], kwnames: &[RawObject]) -> VmResult<RawObject> {
        if Function::cast(&self.heap, callable).is_some() {
            return self.call_function(callable, args, kwnames);
        }
        if let Some(method) = BoundMethod::cast(&self.heap, callable) {
            let mut with_receiver = Vec::with_capacity(args.len() + 1);
            with_receiver.push(method.receiver(&self.heap));
            with_receiver.extend_from_slice(args);
            return self.call_kw(method.function(&self.heap), &with_receiver, kwnames);
        }
        if self.is_type(callable) {
            return self.call_type(callable, args, kwnames);
        }
        match self.special_method(callable, "__call__")? {
            Some(method) => {
                let mut with_receiver = Vec::with_capacity(args.len() + 1);
                with_receiver.push(callable);
                with_receiver.extend_from_slice(args);
                self.call_kw(method, &with_receiver, kwnames)
            }
            None => Err(VmError::type_error(format!(
                "'{}' object is not callable",
                self.type_name_of(callable)
            ))),
        }
    }

    pub(crate) fn function_name(&self, function: RawObject) -> String {
        self.str_value(Function::from_raw(function).name(&self.heap))
            .unwrap_or_default()
    }

    fn call_function(&mut self, function: RawObject, args: &[RawObject], kwnames: &[RawObject]) -> VmResult<RawObject> {
        let code = Code::from_raw(Function::from_raw(function).code(&self.heap));
        let Some(index) = code.builtin_index(&self.heap) else {
            let locals = self.bind_arguments(function, args, kwnames)?;
            return interpreter::execute(self, function, locals, None);
        };
        let name = self.function_name(function);
        if !kwnames.is_empty() {
            return Err(VmError::type_error(format!("'{}' takes no keyword arguments", name)));
        }
        let argcount = code.argcount(&self.heap);
        let varargs = code.flags(&self.heap) & code_flags::VARARGS != 0;
        if args.len() < argcount {
            return Err(VmError::type_error(takes_min(&name, argcount, args.len())));
        }
        if args.len() > argcount && !varargs {
            return Err(VmError::type_error(takes_max(&name, argcount, args.len())));
        }
        let entry = self.builtin_entry(index)?;
        (entry.function)(self, args)
    }

    fn call_type(&mut self, ty: RawObject, args: &[RawObject], kwnames: &[RawObject]) -> VmResult<RawObject> {
        let layout = Type::from_raw(ty).instance_layout(&self.heap);
        if layout == LayoutId::TYPE && args.len() == 1 && kwnames.is_empty() {
            return Ok(self.type_of(args[0]));
        }
        if self.is_builtin_type(ty) && !self.is_exception_type(ty) {
            let Some(new) = self.type_lookup_str(ty, "__new__")? else {
                return Err(VmError::type_error(format!(
                    "cannot create '{}' instances",
                    self.type_name(ty)
                )));
            };
            let mut with_type = Vec::with_capacity(args.len() + 1);
            with_type.push(ty);
            with_type.extend_from_slice(args);
            return self.call_kw(new, &with_type, kwnames);
        }
        self.with_handles(|rt| {
            let ty = rt.new_handle(ty);
            let args: Vec<Handle> = args.iter().map(|arg| rt.new_handle(*arg)).collect();
            let kwnames: Vec<Handle> = kwnames.iter().map(|keyword| rt.new_handle(*keyword)).collect();
            let instance = if rt.is_exception_type(rt.handle(ty)) {
                let positional = args.len() - kwnames.len().min(args.len());
                let values: Vec<RawObject> = args[..positional].iter().map(|arg| rt.handle(*arg)).collect();
                let tuple = rt.new_tuple_from(&values)?;
                rt.new_exception(layout, tuple)?
            } else {
                rt.new_instance(layout)?
            };
            let instance = rt.new_handle(instance);
            let init = rt.type_lookup_str(rt.handle(ty), "__init__")?;
            match init {
                Some(init) => {
                    let mut with_receiver = vec![rt.handle(instance)];
                    with_receiver.extend(args.iter().map(|arg| rt.handle(*arg)));
                    let kwnames: Vec<RawObject> = kwnames.iter().map(|keyword| rt.handle(*keyword)).collect();
                    let result = rt.call_kw(init, &with_receiver, &kwnames)?;
                    if !result.is_none() {
                        return Err(VmError::type_error(format!(
                            "__init__() should return None, not '{}'",
                            rt.type_name_of(result)
                        )));
                    }
                }
                None if !args.is_empty() => {
                    return Err(VmError::type_error(format!(
                        "{}() takes no arguments",
                        rt.type_name(rt.handle(ty))
                    )));
                }
                None => {}
            }
            Ok(rt.handle(instance))
        })
    }

    /// Bind `args` to the local slots of `function`.
    pub fn bind_arguments(
        &mut self,
        function: RawObject,
        args: &[RawObject],
        kwnames: &[RawObject],
    ) -> VmResult<Vec<RawObject>> {
        let code = Code::from_raw(Function::from_raw(function).code(&self.heap));
        let argcount = code.argcount(&self.heap);
        let posonly = code.posonlyargcount(&self.heap);
        let kwonly = code.kwonlyargcount(&self.heap);
        let flags = code.flags(&self.heap);
        let has_varargs = flags & code_flags::VARARGS != 0;
        let has_varkeywords = flags & code_flags::VARKEYWORDS != 0;
        let total_locals = code.total_locals(&self.heap);
        let varnames = code.varnames(&self.heap);
        let name = self.function_name(function);

        let npositional = args.len().checked_sub(kwnames.len()).ok_or_else(|| {
            VmError::new(ErrorKind::SystemError, "more keyword names than arguments")
        })?;
        let params = argcount + kwonly;
        let varargs_slot = has_varargs.then_some(params);
        let varkeywords_slot = has_varkeywords.then_some(params + has_varargs as usize);
        let needed = params + has_varargs as usize + has_varkeywords as usize;
        if total_locals < needed {
            return Err(VmError::fatal(format!("code of '{}' has too few locals", name)));
        }

        let defaults = Function::from_raw(function).defaults(&self.heap);
        let defaults = self.tuple_items(defaults).unwrap_or_default();
        if npositional > argcount && !has_varargs {
            return Err(VmError::type_error(takes_max(&name, argcount, npositional)));
        }

        self.with_handles(|rt| {
            let function = rt.new_handle(function);
            let varnames = rt.new_handle(varnames);
            let args: Vec<Handle> = args.iter().map(|arg| rt.new_handle(*arg)).collect();
            let kwnames: Vec<Handle> = kwnames.iter().map(|keyword| rt.new_handle(*keyword)).collect();
            let mut slots: Vec<Option<Handle>> = vec![None; total_locals];
            for (slot, arg) in slots.iter_mut().zip(&args[..npositional.min(argcount)]) {
                *slot = Some(*arg);
            }
            if let Some(slot) = varargs_slot {
                let extra: Vec<RawObject> = args[npositional.min(argcount)..npositional]
                    .iter()
                    .map(|arg| rt.handle(*arg))
                    .collect();
                let tuple = rt.new_tuple_from(&extra)?;
                slots[slot] = Some(rt.new_handle(tuple));
            }
            if let Some(slot) = varkeywords_slot {
                let dict = rt.new_dict()?;
                slots[slot] = Some(rt.new_handle(dict));
            }

            for (keyword, value) in kwnames.iter().zip(&args[npositional..]) {
                let keyword = rt.handle(*keyword);
                let parameter = (posonly..params).find(|index| {
                    let varname = Tuple::from_raw(rt.handle(varnames)).at(&rt.heap, *index);
                    rt.heap.str_equals(varname, keyword)
                });
                match (parameter, varkeywords_slot) {
                    (Some(index), _) => {
                        if slots[index].is_some() {
                            return Err(VmError::type_error(format!(
                                "'{}' got multiple values for argument '{}'",
                                name,
                                rt.str_value(keyword).unwrap_or_default()
                            )));
                        }
                        slots[index] = Some(*value);
                    }
                    (None, Some(slot)) => {
                        let dict = slots[slot].map(|dict| rt.handle(dict)).unwrap_or_default();
                        let value = rt.handle(*value);
                        rt.dict_at_put(dict, keyword, value)?;
                    }
                    (None, None) => {
                        return Err(VmError::type_error(format!(
                            "'{}' got an unexpected keyword argument '{}'",
                            name,
                            rt.str_value(keyword).unwrap_or_default()
                        )));
                    }
                }
            }

            let mut locals: Vec<RawObject> = slots
                .iter()
                .map(|slot| slot.map_or(RawObject::unbound(), |handle| rt.handle(handle)))
                .collect();
            let first_default = argcount.saturating_sub(defaults.len());
            let defaults = Function::from_raw(rt.handle(function)).defaults(&rt.heap);
            let kwdefaults = Function::from_raw(rt.handle(function)).kwdefaults(&rt.heap);
            for index in 0..params {
                if !locals[index].is_unbound() {
                    continue;
                }
                let varname = Tuple::from_raw(rt.handle(varnames)).at(&rt.heap, index);
                let default = if index < argcount {
                    (index >= first_default)
                        .then(|| Tuple::from_raw(defaults).at(&rt.heap, index - first_default))
                } else if kwdefaults.is_none() {
                    None
                } else {
                    rt.dict_at(kwdefaults, varname)?
                };
                locals[index] = match default {
                    Some(default) => default,
                    None if index < argcount && kwnames.is_empty() => {
                        let message = takes_min(&name, first_default, npositional);
                        return Err(VmError::type_error(message));
                    }
                    None => {
                        return Err(VmError::type_error(format!(
                            "'{}' missing required argument '{}'",
                            name,
                            rt.str_value(varname).unwrap_or_default()
                        )));
                    }
                };
            }
            Ok(locals)
        })
    }
}

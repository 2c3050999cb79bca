//! Call dispatch and argument binding.

use std::sync::Arc;

use crate::errors::{RunError, RunResult};
use crate::heap::{Cell, Heap, HeapData, HeapId};
use crate::program::{FuncId, Funcode, Program};
use crate::thread::{Frame, Thread};
use crate::value::Value;
use crate::vm::Vm;

/// Calls a callable value with positional arguments and name/value keyword
/// pairs. Keyword names are string values.
pub(crate) fn call(
    thread: &mut Thread,
    callee: Value,
    positional: Vec<Value>,
    named: Vec<(Value, Value)>,
) -> RunResult<Value> {
    match callee {
        Value::Ref(id) if matches!(thread.heap().get(id), HeapData::Function(_)) => {
            call_function(thread, id, positional, named)
        }
        Value::Builtin(def) => {
            thread.frames.push(Frame {
                name: def.name.to_owned(),
                pc: 0,
                func: None,
            });
            let result = (def.func)(thread, &positional, &named);
            let result = result.map_err(|e| e.with_frames(|| thread.backtrace()));
            thread.frames.pop();
            result
        }
        _ => Err(RunError::type_error(format!(
            "invalid call of non-function ({})",
            callee.type_of(thread.heap())
        ))),
    }
}

fn call_function(
    thread: &mut Thread,
    func_id: HeapId,
    positional: Vec<Value>,
    named: Vec<(Value, Value)>,
) -> RunResult<Value> {
    let (program, func, module, defaults, name) = {
        let HeapData::Function(f) = thread.heap().get(func_id) else {
            unreachable!("checked by caller");
        };
        (
            f.program.clone(),
            f.func,
            f.module,
            f.defaults.clone(),
            f.name().to_owned(),
        )
    };

    thread.frames.push(Frame {
        name: name.clone(),
        pc: 0,
        func: Some((program.clone(), func)),
    });
    let result = enter(
        thread, program, func, func_id, module, defaults, &name, positional, named,
    );
    let result = result.map_err(|e| e.with_frames(|| thread.backtrace()));
    thread.frames.pop();
    result
}

#[allow(clippy::too_many_arguments)]
fn enter(
    thread: &mut Thread,
    program: Arc<Program>,
    func: FuncId,
    func_id: HeapId,
    module: HeapId,
    defaults: Vec<Value>,
    name: &str,
    positional: Vec<Value>,
    named: Vec<(Value, Value)>,
) -> RunResult<Value> {
    // The recursion guard compares funcodes, not function values, so a
    // recursive call cannot be disguised behind a fresh closure.
    if !program.recursion {
        let own = thread.frames.len() - 1;
        for fr in &thread.frames[..own] {
            if let Some((p, id)) = &fr.func {
                if Arc::ptr_eq(p, &program) && *id == func {
                    return Err(RunError::recursion_error(format!(
                        "function {name} called recursively"
                    )));
                }
            }
        }
    }

    let fcode = program.funcode(func);
    let mut locals = bind_args(thread.heap_mut(), fcode, name, &defaults, positional, named)?;

    // Spill the indicated locals to cells so nested functions can share
    // them.
    for &cell_index in &fcode.cells {
        let idx = cell_index as usize;
        let inner = locals[idx].take();
        let cell = thread.heap_mut().alloc(HeapData::Cell(Cell { value: inner }));
        locals[idx] = Some(Value::Ref(cell));
    }

    let max_stack = fcode.max_stack as usize;
    let mut vm = Vm::new(thread, program.clone(), func, func_id, module, locals, max_stack);
    vm.run()
}

/// Binds call arguments into the local slots of a frame.
///
/// Slot layout: named parameters first (keyword-only last), then the
/// varargs tuple slot and the kwargs dict slot when present, then plain
/// locals.
fn bind_args(
    heap: &mut Heap,
    fcode: &Funcode,
    name: &str,
    defaults: &[Value],
    positional: Vec<Value>,
    named: Vec<(Value, Value)>,
) -> RunResult<Vec<Option<Value>>> {
    let nparams = fcode.num_params as usize;
    let kwonly = fcode.num_kwonly_params as usize;
    let npos_params = nparams - kwonly;

    let mut locals: Vec<Option<Value>> = vec![None; fcode.locals.len()];

    // Positional arguments.
    let bound = positional.len().min(npos_params);
    for (slot, &arg) in locals.iter_mut().zip(&positional[..bound]) {
        *slot = Some(arg);
    }
    if positional.len() > npos_params {
        if !fcode.has_varargs {
            return Err(RunError::type_error(format!(
                "function {name} accepts at most {npos_params} positional arguments ({} given)",
                positional.len()
            )));
        }
    }
    if fcode.has_varargs {
        let rest = positional[bound..].to_vec();
        let tuple = heap.alloc_tuple(rest);
        locals[nparams] = Some(tuple);
    }

    // Keyword arguments.
    let kwargs_slot = if fcode.has_kwargs {
        let slot = nparams + usize::from(fcode.has_varargs);
        let dict = heap.alloc(HeapData::Dict(crate::types::Dict::new()));
        locals[slot] = Some(Value::Ref(dict));
        Some(dict)
    } else {
        None
    };
    for (key, value) in named {
        let Some(param) = heap.str_value(key).map(str::to_owned) else {
            return Err(RunError::type_error(format!(
                "keywords must be strings, not {}",
                key.type_of(heap)
            )));
        };
        let index = fcode.locals[..nparams].iter().position(|b| b.name == param);
        match index {
            Some(i) => {
                if locals[i].is_some() {
                    return Err(RunError::type_error(format!(
                        "function {name} got multiple values for parameter \"{param}\""
                    )));
                }
                locals[i] = Some(value);
            }
            None => match kwargs_slot {
                Some(dict) => {
                    if heap.dict_set(dict, key, value)?.is_some() {
                        return Err(RunError::type_error(format!(
                            "function {name} got multiple values for parameter \"{param}\""
                        )));
                    }
                }
                None => {
                    return Err(RunError::type_error(format!(
                        "function {name} got an unexpected keyword argument \"{param}\""
                    )));
                }
            },
        }
    }

    // Defaults cover the trailing parameters; Mandatory marks a required
    // keyword-only parameter.
    let first_default = nparams - defaults.len().min(nparams);
    for i in 0..nparams {
        if locals[i].is_some() {
            continue;
        }
        let pname = &fcode.locals[i].name;
        if i < first_default {
            return Err(RunError::type_error(format!(
                "function {name} missing required argument \"{pname}\""
            )));
        }
        match defaults[i - first_default] {
            Value::Mandatory => {
                return Err(RunError::type_error(format!(
                    "function {name} missing required keyword-only argument \"{pname}\""
                )));
            }
            d => locals[i] = Some(d),
        }
    }

    Ok(locals)
}

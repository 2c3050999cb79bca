//! Callable values: language-level functions and host builtins.

use std::fmt;
use std::sync::Arc;

use crate::errors::{RunError, RunResult};
use crate::heap::{HeapData, HeapId};
use crate::program::{FuncId, Funcode, Program};
use crate::thread::Thread;
use crate::value::Value;

/// A language-level function value: a funcode closed over its module,
/// evaluated defaults and captured free-variable cells.
#[derive(Debug)]
pub(crate) struct Function {
    pub program: Arc<Program>,
    pub func: FuncId,
    pub module: HeapId,
    /// Evaluated default values for trailing parameters; `Value::Mandatory`
    /// marks a required keyword-only parameter.
    pub defaults: Vec<Value>,
    /// Captured cells, one per freevar of the funcode.
    pub freevars: Vec<Value>,
}

impl Function {
    pub fn funcode(&self) -> &Funcode {
        self.program.funcode(self.func)
    }

    pub fn name(&self) -> &str {
        &self.funcode().name
    }
}

/// The signature of a host function.
///
/// Receives the calling thread (heap included), positional arguments and
/// name/value keyword pairs.
pub type NativeFn = fn(&mut Thread, &[Value], &[(Value, Value)]) -> RunResult<Value>;

/// A host function exposed to programs as a value.
#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: NativeFn,
}

impl fmt::Display for BuiltinDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// Resolves a name in the universal scope consulted by the UNIVERSAL opcode.
#[must_use]
pub fn universal(name: &str) -> Option<Value> {
    static LEN: BuiltinDef = BuiltinDef { name: "len", func: builtin_len };
    static TYPE: BuiltinDef = BuiltinDef { name: "type", func: builtin_type };
    static STR: BuiltinDef = BuiltinDef { name: "str", func: builtin_str };
    static BOOL: BuiltinDef = BuiltinDef { name: "bool", func: builtin_bool };
    static FAIL: BuiltinDef = BuiltinDef { name: "fail", func: builtin_fail };

    match name {
        "len" => Some(Value::Builtin(&LEN)),
        "type" => Some(Value::Builtin(&TYPE)),
        "str" => Some(Value::Builtin(&STR)),
        "bool" => Some(Value::Builtin(&BOOL)),
        "fail" => Some(Value::Builtin(&FAIL)),
        _ => None,
    }
}

fn one_arg(name: &str, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() {
        return Err(RunError::type_error(format!("{name}: unexpected keyword arguments")));
    }
    match args {
        [v] => Ok(*v),
        _ => Err(RunError::type_error(format!(
            "{name}: got {} arguments, want 1",
            args.len()
        ))),
    }
}

fn builtin_len(thread: &mut Thread, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    let v = one_arg("len", args, kwargs)?;
    let heap = thread.heap();
    let len = match v {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => Some(s.chars().count()),
            HeapData::Bytes(b) => Some(b.len()),
            HeapData::Tuple(t) => Some(t.len()),
            HeapData::List(l) => Some(l.elems.len()),
            HeapData::Dict(d) => Some(d.len()),
            HeapData::Set(s) => Some(s.len()),
            _ => None,
        },
        _ => None,
    };
    match len {
        Some(n) => Ok(Value::Int(n as i64)),
        None => Err(RunError::type_error(format!(
            "len: value of type {} has no len",
            v.type_of(heap)
        ))),
    }
}

fn builtin_type(thread: &mut Thread, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    let v = one_arg("type", args, kwargs)?;
    let name = v.type_of(thread.heap()).to_string();
    Ok(thread.heap_mut().alloc_str(name))
}

fn builtin_str(thread: &mut Thread, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    let v = one_arg("str", args, kwargs)?;
    let s = thread.heap().to_str(v);
    Ok(thread.heap_mut().alloc_str(s))
}

fn builtin_bool(thread: &mut Thread, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    let v = one_arg("bool", args, kwargs)?;
    Ok(Value::Bool(v.truth(thread.heap())))
}

fn builtin_fail(thread: &mut Thread, args: &[Value], kwargs: &[(Value, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() {
        return Err(RunError::type_error("fail: unexpected keyword arguments"));
    }
    let parts: Vec<String> = args.iter().map(|&v| thread.heap().to_str(v)).collect();
    Err(RunError::value_error(format!("fail: {}", parts.join(" "))))
}

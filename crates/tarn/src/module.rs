//! Module state and program initialisation.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::{RunError, RunResult};
use crate::function::Function;
use crate::heap::{Heap, HeapData};
use crate::program::{Constant, FuncId, Program};
use crate::thread::Thread;
use crate::value::Value;
use crate::vm;

/// An ordered name-to-value mapping: module exports, predeclared bindings
/// and load results.
pub type StringDict = IndexMap<String, Value>;

/// Per-module runtime state, shared by every function of the module.
#[derive(Debug)]
pub(crate) struct Module {
    /// Constants materialised from the program pool.
    pub constants: Vec<Value>,
    /// Global slots; `None` means unassigned and reads fail.
    pub globals: Vec<Option<Value>>,
    /// Application-supplied bindings consulted by PREDECLARED.
    pub predeclared: StringDict,
}

impl Program {
    /// Materialises a module for `program`, executes its top-level function
    /// on `thread`, and returns the module's assigned globals by name.
    pub fn init(program: &Arc<Program>, thread: &mut Thread, predeclared: StringDict) -> RunResult<StringDict> {
        let constants = program
            .constants
            .iter()
            .map(|c| materialise(c, thread.heap_mut()))
            .collect();
        let module = thread.heap_mut().alloc(HeapData::Module(Module {
            constants,
            globals: vec![None; program.globals.len()],
            predeclared,
        }));
        let toplevel = thread.heap_mut().alloc(HeapData::Function(Function {
            program: program.clone(),
            func: FuncId::Toplevel,
            module,
            defaults: Vec::new(),
            freevars: Vec::new(),
        }));

        vm::call(thread, Value::Ref(toplevel), Vec::new(), Vec::new())?;

        let HeapData::Module(m) = thread.heap().get(module) else {
            return Err(RunError::internal("module entry corrupted"));
        };
        let mut out = StringDict::new();
        for (i, binding) in program.globals.iter().enumerate() {
            if let Some(v) = m.globals[i] {
                out.insert(binding.name.clone(), v);
            }
        }
        Ok(out)
    }
}

fn materialise(c: &Constant, heap: &mut Heap) -> Value {
    match c {
        Constant::Int(i) => Value::Int(*i),
        Constant::BigInt(b) => heap.alloc_bigint(b.clone()),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => heap.alloc_str(s.clone()),
        Constant::Bytes(b) => heap.alloc_bytes(b.clone()),
    }
}

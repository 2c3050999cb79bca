//! Runtime values.
//!
//! `Value` is a small `Copy` tagged enum: immediate values (None, Bool, Int,
//! Float) are stored inline, aggregates live in the arena and are referenced
//! via `Ref(HeapId)`. Keeping the enum small and copyable keeps the operand
//! stack cheap to shuffle.

use crate::errors::{RunError, RunResult};
use crate::function::BuiltinDef;
use crate::heap::{Heap, HeapData, HeapId};
use crate::types::Type;

/// A runtime value.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Aggregate payload stored in the arena: strings, bytes, big integers,
    /// tuples, lists, dicts, sets, functions, cells and modules.
    Ref(HeapId),
    /// A host function.
    Builtin(&'static BuiltinDef),
    /// Sentinel marking a required keyword-only parameter in a defaults
    /// tuple.
    Mandatory,
}

impl Value {
    /// The dynamic type of this value.
    #[must_use]
    pub fn type_of(self, heap: &Heap) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Builtin(_) => Type::Builtin,
            Self::Mandatory => Type::Mandatory,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(_) => Type::String,
                HeapData::Bytes(_) => Type::Bytes,
                HeapData::BigInt(_) => Type::Int,
                HeapData::Tuple(_) => Type::Tuple,
                HeapData::List(_) => Type::List,
                HeapData::Dict(_) => Type::Dict,
                HeapData::Set(_) => Type::Set,
                HeapData::Function(_) => Type::Function,
                HeapData::Cell(_) => Type::Cell,
                HeapData::Module(_) => Type::Module,
            },
        }
    }

    /// The truth value: None and numeric zeroes are false, sequences and
    /// mappings are true when non-empty.
    #[must_use]
    pub fn truth(self, heap: &Heap) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::Float(f) => f != 0.0,
            Self::Builtin(_) => true,
            Self::Mandatory => false,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => !s.is_empty(),
                HeapData::Bytes(b) => !b.is_empty(),
                HeapData::BigInt(_) => true, // big by construction, never zero
                HeapData::Tuple(t) => !t.is_empty(),
                HeapData::List(l) => !l.elems.is_empty(),
                HeapData::Dict(d) => d.len() != 0,
                HeapData::Set(s) => s.len() != 0,
                HeapData::Function(_) | HeapData::Cell(_) | HeapData::Module(_) => true,
            },
        }
    }
}

/// Converts a value to a signed 32-bit machine integer.
///
/// Fails on non-int values and on ints outside the 32-bit range; big
/// integers are out of range by construction.
pub fn as_int32(v: Value, heap: &Heap) -> RunResult<i32> {
    match v {
        Value::Int(i) => i32::try_from(i)
            .map_err(|_| RunError::value_error(format!("{i} out of range (want signed 32-bit value)"))),
        Value::Ref(id) => match heap.get(id) {
            HeapData::BigInt(b) => Err(RunError::value_error(format!(
                "{b} out of range (want signed 32-bit value)"
            ))),
            _ => Err(RunError::type_error(format!(
                "got {}, want int",
                v.type_of(heap)
            ))),
        },
        _ => Err(RunError::type_error(format!("got {}, want int", v.type_of(heap)))),
    }
}

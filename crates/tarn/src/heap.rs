//! The value arena.
//!
//! All aggregate runtime values live here and are addressed by [`HeapId`].
//! The arena has module lifetime: it is owned by the `Thread` and dropped
//! wholesale, so values need no per-reference bookkeeping and `Value` stays
//! `Copy`. Mutations that must re-enter the arena (hashing a dict key while
//! the dict is borrowed, for example) go through [`Heap::with_entry_mut`],
//! which temporarily takes the entry out.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;

use ahash::AHashSet;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::errors::{RunError, RunResult};
use crate::function::Function;
use crate::module::Module;
use crate::quote::{quote_bytes, quote_str};
use crate::types::{Dict, List, Set, Type};
use crate::value::Value;

/// Equality recursion cutoff for deeply nested or cyclic structures.
const MAX_COMPARE_DEPTH: u32 = 100;

/// Unique identifier of a value stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

/// Every runtime value that lives in the arena.
#[derive(Debug)]
pub(crate) enum HeapData {
    Str(String),
    Bytes(Vec<u8>),
    /// An integer outside the `i64` range; results that fit are demoted to
    /// `Value::Int` on allocation.
    BigInt(BigInt),
    /// An immutable ordered sequence. Has no mutation gates; freezing only
    /// recurses into the elements.
    Tuple(Vec<Value>),
    List(List),
    Dict(Dict),
    Set(Set),
    /// A closure over a funcode.
    Function(Function),
    /// A single-slot box shared between an enclosing scope and the closures
    /// that capture it.
    Cell(Cell),
    /// Per-module state: materialised constants, global slots, predeclared
    /// bindings.
    Module(Module),
}

/// The box behind LOCALCELL/FREECELL. `None` means the variable has not
/// been assigned yet.
#[derive(Debug, Default)]
pub(crate) struct Cell {
    pub value: Option<Value>,
}

/// The arena.
#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<Option<HeapData>>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.entries.len()).expect("heap exhausted"));
        self.entries.push(Some(data));
        id
    }

    /// Returns the data stored at `id`.
    ///
    /// # Panics
    /// Panics if the id is invalid or the entry is currently taken out via
    /// [`Heap::with_entry_mut`].
    pub(crate) fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.0 as usize)
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: entry currently borrowed")
    }

    pub(crate) fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.0 as usize)
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: entry currently borrowed")
    }

    /// Temporarily takes the entry out so its data and the rest of the arena
    /// can be borrowed simultaneously. The entry is restored afterwards.
    pub(crate) fn with_entry_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut Self, &mut HeapData) -> R) -> R {
        let mut data = self.entries[id.0 as usize]
            .take()
            .expect("Heap::with_entry_mut: entry currently borrowed");
        let result = f(self, &mut data);
        self.entries[id.0 as usize] = Some(data);
        result
    }

    // --- allocation helpers ---

    pub(crate) fn alloc_str(&mut self, s: impl Into<String>) -> Value {
        Value::Ref(self.alloc(HeapData::Str(s.into())))
    }

    pub(crate) fn alloc_bytes(&mut self, b: Vec<u8>) -> Value {
        Value::Ref(self.alloc(HeapData::Bytes(b)))
    }

    /// Allocates a big integer, demoting to `Value::Int` when it fits.
    pub(crate) fn alloc_bigint(&mut self, b: BigInt) -> Value {
        match b.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::Ref(self.alloc(HeapData::BigInt(b))),
        }
    }

    pub(crate) fn alloc_tuple(&mut self, elems: Vec<Value>) -> Value {
        Value::Ref(self.alloc(HeapData::Tuple(elems)))
    }

    pub(crate) fn alloc_list(&mut self, elems: Vec<Value>) -> Value {
        Value::Ref(self.alloc(HeapData::List(List::new(elems))))
    }

    // --- shared accessors ---

    /// The arena payload behind a value, when it has one.
    pub(crate) fn data(&self, v: Value) -> Option<&HeapData> {
        match v {
            Value::Ref(id) => Some(self.get(id)),
            _ => None,
        }
    }

    pub(crate) fn str_value(&self, v: Value) -> Option<&str> {
        match v {
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Numeric view of a value, when it has one.
    pub(crate) fn num(&self, v: Value) -> Option<Num<'_>> {
        match v {
            Value::Int(i) => Some(Num::Int(i)),
            Value::Float(f) => Some(Num::Float(f)),
            Value::Ref(id) => match self.get(id) {
                HeapData::BigInt(b) => Some(Num::Big(b)),
                _ => None,
            },
            _ => None,
        }
    }

    // --- freezing ---

    /// Deep freeze: marks every container reachable from `v` immutable.
    /// Idempotent; terminates on cycles via a visited set.
    pub fn freeze(&mut self, v: Value) {
        let mut seen = AHashSet::new();
        let mut work = Vec::new();
        if let Value::Ref(id) = v {
            work.push(id);
        }
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let mut children = Vec::new();
            match self.get_mut(id) {
                HeapData::Str(_) | HeapData::Bytes(_) | HeapData::BigInt(_) | HeapData::Module(_) => {}
                HeapData::Tuple(elems) => children.extend_from_slice(elems),
                HeapData::List(l) => {
                    l.frozen = true;
                    children.extend_from_slice(&l.elems);
                }
                HeapData::Dict(d) => {
                    d.frozen = true;
                    for e in d.entries() {
                        children.push(e.key);
                        children.push(e.value);
                    }
                }
                HeapData::Set(s) => {
                    s.frozen = true;
                    let elems: Vec<Value> = s.elems().collect();
                    children.extend(elems);
                }
                HeapData::Function(f) => {
                    children.extend_from_slice(&f.defaults);
                    children.extend_from_slice(&f.freevars);
                }
                HeapData::Cell(c) => {
                    children.extend(c.value);
                }
            }
            for child in children {
                if let Value::Ref(cid) = child {
                    work.push(cid);
                }
            }
        }
    }

    /// Reports whether a container value is currently frozen. Immediate
    /// values and immutable aggregates count as frozen.
    pub fn is_frozen(&self, v: Value) -> bool {
        match v {
            Value::Ref(id) => match self.get(id) {
                HeapData::List(l) => l.frozen,
                HeapData::Dict(d) => d.frozen,
                HeapData::Set(s) => s.frozen,
                _ => true,
            },
            _ => true,
        }
    }

    // --- hashing ---

    /// Hashes a value for use as a dict key or set element.
    ///
    /// Fails for mutable containers and functions. Equal numbers hash
    /// equally across int and float.
    pub(crate) fn hash(&self, v: Value) -> RunResult<u64> {
        let mut hasher = DefaultHasher::new();
        self.hash_into(v, &mut hasher)?;
        Ok(hasher.finish())
    }

    fn hash_into(&self, v: Value, hasher: &mut DefaultHasher) -> RunResult<()> {
        match v {
            Value::None => 0u8.hash(hasher),
            Value::Bool(b) => (1u8, b).hash(hasher),
            Value::Int(i) => (2u8, i).hash(hasher),
            Value::Float(f) => {
                // Keep int/float hashing consistent for equal values.
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    (2u8, f as i64).hash(hasher);
                } else {
                    (3u8, f.to_bits()).hash(hasher);
                }
            }
            Value::Mandatory => 4u8.hash(hasher),
            Value::Builtin(_) => {
                return Err(RunError::type_error("unhashable type: builtin_function_or_method"))
            }
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => s.hash(hasher),
                HeapData::Bytes(b) => b.hash(hasher),
                HeapData::BigInt(b) => (5u8, b).hash(hasher),
                HeapData::Tuple(elems) => {
                    (6u8, elems.len()).hash(hasher);
                    for &e in elems {
                        self.hash_into(e, hasher)?;
                    }
                }
                other => {
                    let name = match other {
                        HeapData::List(_) => Type::List,
                        HeapData::Dict(_) => Type::Dict,
                        HeapData::Set(_) => Type::Set,
                        HeapData::Function(_) => Type::Function,
                        HeapData::Cell(_) => Type::Cell,
                        HeapData::Module(_) => Type::Module,
                        _ => unreachable!("hashable variants handled above"),
                    };
                    return Err(RunError::type_error(format!("unhashable type: {name}")));
                }
            },
        }
        Ok(())
    }

    // --- equality ---

    /// Structural equality. Numbers compare across int/float/bigint; values
    /// of unrelated types are unequal without error.
    pub(crate) fn equal(&self, x: Value, y: Value) -> RunResult<bool> {
        self.equal_depth(x, y, 0)
    }

    fn equal_depth(&self, x: Value, y: Value, depth: u32) -> RunResult<bool> {
        if depth > MAX_COMPARE_DEPTH {
            return Err(RunError::value_error("comparison exceeded maximum recursion depth"));
        }
        if let (Some(a), Some(b)) = (self.num(x), self.num(y)) {
            return Ok(num_equal(a, b));
        }
        match (x, y) {
            (Value::None, Value::None) => Ok(true),
            (Value::Mandatory, Value::Mandatory) => Ok(true),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Builtin(a), Value::Builtin(b)) => Ok(std::ptr::eq(a, b)),
            (Value::Ref(a), Value::Ref(b)) => {
                if a == b {
                    return Ok(true);
                }
                match (self.get(a), self.get(b)) {
                    (HeapData::Str(sa), HeapData::Str(sb)) => Ok(sa == sb),
                    (HeapData::Bytes(ba), HeapData::Bytes(bb)) => Ok(ba == bb),
                    (HeapData::Tuple(ea), HeapData::Tuple(eb)) => self.seq_equal(ea, eb, depth),
                    (HeapData::List(la), HeapData::List(lb)) => self.seq_equal(&la.elems, &lb.elems, depth),
                    (HeapData::Dict(da), HeapData::Dict(db)) => {
                        if da.len() != db.len() {
                            return Ok(false);
                        }
                        for e in da.entries() {
                            let hash = self.hash(e.key)?;
                            let Some(idx) = db.find(hash, |k| self.equal(k, e.key).unwrap_or(false)) else {
                                return Ok(false);
                            };
                            if !self.equal_depth(e.value, db.value_at(idx), depth + 1)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    (HeapData::Set(sa), HeapData::Set(sb)) => {
                        if sa.len() != sb.len() {
                            return Ok(false);
                        }
                        for e in sa.elems() {
                            let hash = self.hash(e)?;
                            if !sb.contains_hashed(hash, |k| self.equal(k, e).unwrap_or(false)) {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    // Functions, cells and modules compare by identity only.
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    fn seq_equal(&self, a: &[Value], b: &[Value], depth: u32) -> RunResult<bool> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (&ea, &eb) in a.iter().zip(b) {
            if !self.equal_depth(ea, eb, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // --- dict and set operations ---

    pub(crate) fn dict_get(&self, dict_id: HeapId, key: Value) -> RunResult<Option<Value>> {
        let hash = self.hash(key)?;
        let HeapData::Dict(d) = self.get(dict_id) else {
            return Err(RunError::internal("dict_get: not a dict"));
        };
        Ok(d.find(hash, |k| self.equal(k, key).unwrap_or(false))
            .map(|i| d.value_at(i)))
    }

    /// Inserts into a dict, returning the value it replaced.
    pub(crate) fn dict_set(&mut self, dict_id: HeapId, key: Value, value: Value) -> RunResult<Option<Value>> {
        {
            let HeapData::Dict(d) = self.get(dict_id) else {
                return Err(RunError::internal("dict_set: not a dict"));
            };
            d.check_mutable("insert into")?;
        }
        let hash = self.hash(key)?;
        Ok(self.with_entry_mut(dict_id, |heap, data| {
            let HeapData::Dict(d) = data else {
                unreachable!("entry type changed during borrow");
            };
            d.insert_with_hash(key, hash, value, |k| heap.equal(k, key).unwrap_or(false))
        }))
    }

    pub(crate) fn set_contains(&self, set_id: HeapId, elem: Value) -> RunResult<bool> {
        let hash = self.hash(elem)?;
        let HeapData::Set(s) = self.get(set_id) else {
            return Err(RunError::internal("set_contains: not a set"));
        };
        Ok(s.contains_hashed(hash, |k| self.equal(k, elem).unwrap_or(false)))
    }

    pub(crate) fn set_add(&mut self, set_id: HeapId, elem: Value) -> RunResult<bool> {
        {
            let HeapData::Set(s) = self.get(set_id) else {
                return Err(RunError::internal("set_add: not a set"));
            };
            s.check_mutable("insert into")?;
        }
        let hash = self.hash(elem)?;
        Ok(self.with_entry_mut(set_id, |heap, data| {
            let HeapData::Set(s) = data else {
                unreachable!("entry type changed during borrow");
            };
            s.add_with_hash(elem, hash, |k| heap.equal(k, elem).unwrap_or(false))
        }))
    }

    // --- iterator accounting ---

    /// Bumps the live-iterator count of a mutable container. No-op for
    /// immutable aggregates.
    pub(crate) fn begin_iteration(&mut self, id: HeapId) {
        match self.get_mut(id) {
            HeapData::List(l) => l.itercount += 1,
            HeapData::Dict(d) => d.itercount += 1,
            HeapData::Set(s) => s.itercount += 1,
            _ => {}
        }
    }

    pub(crate) fn end_iteration(&mut self, id: HeapId) {
        match self.get_mut(id) {
            HeapData::List(l) => l.itercount -= 1,
            HeapData::Dict(d) => d.itercount -= 1,
            HeapData::Set(s) => s.itercount -= 1,
            _ => {}
        }
    }

    // --- stringification ---

    /// The string form: strings render raw, everything else as `repr`.
    #[must_use]
    pub fn to_str(&self, v: Value) -> String {
        if let Some(s) = self.str_value(v) {
            return s.to_owned();
        }
        self.repr(v)
    }

    /// The quoted, cycle-safe display form.
    #[must_use]
    pub fn repr(&self, v: Value) -> String {
        let mut out = String::new();
        let mut seen = AHashSet::new();
        self.repr_fmt(v, &mut out, &mut seen);
        out
    }

    fn repr_fmt(&self, v: Value, out: &mut String, seen: &mut AHashSet<HeapId>) {
        match v {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => {
                let s = f.to_string();
                out.push_str(&s);
                if !s.contains('.') && !s.contains("inf") && !s.contains("NaN") {
                    out.push_str(".0");
                }
            }
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name)),
            Value::Mandatory => out.push_str("mandatory"),
            Value::Ref(id) => {
                if seen.contains(&id) {
                    out.push_str(match self.get(id) {
                        HeapData::List(_) => "[...]",
                        HeapData::Tuple(_) => "(...)",
                        HeapData::Dict(_) => "{...}",
                        _ => "...",
                    });
                    return;
                }
                seen.insert(id);
                match self.get(id) {
                    HeapData::Str(s) => out.push_str(&quote_str(s)),
                    HeapData::Bytes(b) => {
                        out.push('b');
                        out.push_str(&quote_bytes(b));
                    }
                    HeapData::BigInt(b) => out.push_str(&b.to_string()),
                    HeapData::Tuple(elems) => {
                        out.push('(');
                        for (i, &e) in elems.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.repr_fmt(e, out, seen);
                        }
                        if elems.len() == 1 {
                            out.push(',');
                        }
                        out.push(')');
                    }
                    HeapData::List(l) => {
                        out.push('[');
                        for (i, &e) in l.elems.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.repr_fmt(e, out, seen);
                        }
                        out.push(']');
                    }
                    HeapData::Dict(d) => {
                        out.push('{');
                        for (i, e) in d.entries().iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.repr_fmt(e.key, out, seen);
                            out.push_str(": ");
                            self.repr_fmt(e.value, out, seen);
                        }
                        out.push('}');
                    }
                    HeapData::Set(s) => {
                        out.push_str("set([");
                        for (i, e) in s.elems().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.repr_fmt(e, out, seen);
                        }
                        out.push_str("])");
                    }
                    HeapData::Function(f) => out.push_str(&format!("<function {}>", f.name())),
                    HeapData::Cell(_) => out.push_str("cell"),
                    HeapData::Module(_) => out.push_str("<module>"),
                }
                seen.remove(&id);
            }
        }
    }
}

/// Numeric view used by arithmetic, comparison and equality.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num<'a> {
    Int(i64),
    Big(&'a BigInt),
    Float(f64),
}

pub(crate) fn num_equal(a: Num<'_>, b: Num<'_>) -> bool {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x == y,
        (Num::Float(x), Num::Float(y)) => x == y,
        (Num::Int(x), Num::Float(y)) | (Num::Float(y), Num::Int(x)) => x as f64 == y,
        (Num::Big(x), Num::Big(y)) => x == y,
        // Bigs never fit i64, so they can never equal a machine int.
        (Num::Big(_), Num::Int(_)) | (Num::Int(_), Num::Big(_)) => false,
        (Num::Big(x), Num::Float(y)) | (Num::Float(y), Num::Big(x)) => {
            x.to_f64().is_some_and(|xf| xf == y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_is_deep_and_idempotent() {
        let mut heap = Heap::new();
        let inner = heap.alloc_list(vec![Value::Int(1)]);
        let outer = heap.alloc_list(vec![inner]);
        assert!(!heap.is_frozen(inner));

        heap.freeze(outer);
        heap.freeze(outer);
        assert!(heap.is_frozen(outer));
        assert!(heap.is_frozen(inner));
    }

    #[test]
    fn freeze_terminates_on_cycles() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![]);
        let Value::Ref(id) = list else { unreachable!() };
        if let HeapData::List(l) = heap.get_mut(id) {
            l.elems.push(list);
        }
        heap.freeze(list);
        assert!(heap.is_frozen(list));
    }

    #[test]
    fn int_float_hash_consistency() {
        let heap = Heap::new();
        assert_eq!(heap.hash(Value::Int(3)).unwrap(), heap.hash(Value::Float(3.0)).unwrap());
    }

    #[test]
    fn unhashable_types_fail() {
        let mut heap = Heap::new();
        let l = heap.alloc_list(vec![]);
        let err = heap.hash(l).unwrap_err();
        assert!(err.message().contains("unhashable type: list"));
    }

    #[test]
    fn structural_equality() {
        let mut heap = Heap::new();
        let a = heap.alloc_list(vec![Value::Int(1), Value::Float(2.0)]);
        let b = heap.alloc_list(vec![Value::Int(1), Value::Int(2)]);
        assert!(heap.equal(a, b).unwrap());

        let s1 = heap.alloc_str("abc");
        let s2 = heap.alloc_str("abc");
        assert!(heap.equal(s1, s2).unwrap());
        assert!(!heap.equal(s1, a).unwrap());
    }

    #[test]
    fn dict_insert_and_lookup() {
        let mut heap = Heap::new();
        let d = heap.alloc(HeapData::Dict(Dict::new()));
        let key = heap.alloc_str("k");
        let key2 = heap.alloc_str("k");
        assert!(heap.dict_set(d, key, Value::Int(1)).unwrap().is_none());
        let old = heap.dict_set(d, key2, Value::Int(2)).unwrap();
        assert!(matches!(old, Some(Value::Int(1))));
        assert!(matches!(heap.dict_get(d, key).unwrap(), Some(Value::Int(2))));
    }

    #[test]
    fn repr_handles_cycles() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1)]);
        let Value::Ref(id) = list else { unreachable!() };
        if let HeapData::List(l) = heap.get_mut(id) {
            l.elems.push(list);
        }
        assert_eq!(heap.repr(list), "[1, [...]]");
    }
}

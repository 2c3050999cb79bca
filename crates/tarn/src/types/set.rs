//! The insertion-ordered set payload.
//!
//! Same storage strategy as `Dict`: a hash table of indices over a dense
//! element vector.

use hashbrown::HashTable;

use crate::errors::{RunError, RunResult};
use crate::value::Value;

#[derive(Debug)]
struct SetEntry {
    elem: Value,
    hash: u64,
}

/// A mutable insertion-ordered set of hashable values.
#[derive(Debug, Default)]
pub(crate) struct Set {
    indices: HashTable<usize>,
    entries: Vec<SetEntry>,
    pub frozen: bool,
    pub itercount: u32,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn elem_at(&self, index: usize) -> Option<Value> {
        self.entries.get(index).map(|e| e.elem)
    }

    pub fn elems(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|e| e.elem)
    }

    /// Fails when the set is frozen or currently iterated.
    pub fn check_mutable(&self, verb: &str) -> RunResult<()> {
        if self.frozen {
            return Err(RunError::mutation_error(format!("cannot {verb} frozen set")));
        }
        if self.itercount > 0 {
            return Err(RunError::mutation_error(format!(
                "cannot {verb} set during iteration"
            )));
        }
        Ok(())
    }

    pub fn contains_hashed(&self, hash: u64, mut same_elem: impl FnMut(Value) -> bool) -> bool {
        self.indices
            .find(hash, |&idx| same_elem(self.entries[idx].elem))
            .is_some()
    }

    /// Adds an element; reports whether it was newly inserted.
    pub fn add_with_hash(&mut self, elem: Value, hash: u64, same_elem: impl FnMut(Value) -> bool) -> bool {
        if self.contains_hashed(hash, same_elem) {
            return false;
        }
        let index = self.entries.len();
        self.entries.push(SetEntry { elem, hash });
        self.indices
            .insert_unique(hash, index, |&idx| self.entries[idx].hash);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_elem(v: Value) -> i64 {
        match v {
            Value::Int(i) => i,
            _ => panic!("test set holds ints"),
        }
    }

    #[test]
    fn add_dedupes() {
        let mut s = Set::new();
        assert!(s.add_with_hash(Value::Int(1), 1, |e| int_elem(e) == 1));
        assert!(!s.add_with_hash(Value::Int(1), 1, |e| int_elem(e) == 1));
        assert!(s.add_with_hash(Value::Int(2), 2, |e| int_elem(e) == 2));
        assert_eq!(s.len(), 2);
        assert!(s.contains_hashed(2, |e| int_elem(e) == 2));
        assert!(!s.contains_hashed(3, |_| true));
    }
}

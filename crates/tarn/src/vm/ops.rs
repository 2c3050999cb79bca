//! Binary, unary, comparison, indexing and slicing operations.
//!
//! Every function here surfaces failures as `RunError`; the dispatch loop
//! never panics on bad operands.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};

use crate::errors::{RunError, RunResult};
use crate::heap::{Heap, HeapData, HeapId, Num};
use crate::opcode::Opcode;
use crate::types::{Dict, Set};
use crate::value::Value;

/// Maximum number of elements a sequence-repeat may produce.
const MAX_REPEAT_ELEMS: usize = 1 << 30;

fn op_sym(op: Opcode) -> &'static str {
    match op {
        Opcode::Plus => "+",
        Opcode::Minus => "-",
        Opcode::Star => "*",
        Opcode::Slash => "/",
        Opcode::Slashslash => "//",
        Opcode::Percent => "%",
        Opcode::Amp => "&",
        Opcode::Pipe => "|",
        Opcode::Circumflex => "^",
        Opcode::Ltlt => "<<",
        Opcode::Gtgt => ">>",
        Opcode::In => "in",
        Opcode::Eql => "==",
        Opcode::Neq => "!=",
        Opcode::Lt => "<",
        Opcode::Gt => ">",
        Opcode::Le => "<=",
        Opcode::Ge => ">=",
        _ => "?",
    }
}

fn unknown_binary(heap: &Heap, op: Opcode, x: Value, y: Value) -> RunError {
    RunError::type_error(format!(
        "unknown binary op: {} {} {}",
        x.type_of(heap),
        op_sym(op),
        y.type_of(heap)
    ))
}

/// Owned numeric result, materialised into a `Value` after arithmetic.
enum NumOut {
    Int(i64),
    Big(BigInt),
    Float(f64),
}

fn big_of(n: Num<'_>) -> BigInt {
    match n {
        Num::Int(i) => BigInt::from(i),
        Num::Big(b) => b.clone(),
        Num::Float(_) => unreachable!("float handled before widening"),
    }
}

fn float_of(n: Num<'_>) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Big(b) => b.to_f64().unwrap_or(f64::NAN),
        Num::Float(f) => f,
    }
}

/// Numeric binary arithmetic; `Ok(None)` means the operator does not apply
/// to numbers.
fn num_binary(op: Opcode, a: Num<'_>, b: Num<'_>) -> RunResult<Option<NumOut>> {
    let any_float = matches!(a, Num::Float(_)) || matches!(b, Num::Float(_));
    let out = match op {
        Opcode::Plus | Opcode::Minus | Opcode::Star => {
            if any_float {
                let (x, y) = (float_of(a), float_of(b));
                NumOut::Float(match op {
                    Opcode::Plus => x + y,
                    Opcode::Minus => x - y,
                    _ => x * y,
                })
            } else if let (Num::Int(x), Num::Int(y)) = (a, b) {
                let checked = match op {
                    Opcode::Plus => x.checked_add(y),
                    Opcode::Minus => x.checked_sub(y),
                    _ => x.checked_mul(y),
                };
                match checked {
                    Some(v) => NumOut::Int(v),
                    None => {
                        let (bx, by) = (BigInt::from(x), BigInt::from(y));
                        NumOut::Big(match op {
                            Opcode::Plus => bx + by,
                            Opcode::Minus => bx - by,
                            _ => bx * by,
                        })
                    }
                }
            } else {
                let (bx, by) = (big_of(a), big_of(b));
                NumOut::Big(match op {
                    Opcode::Plus => bx + by,
                    Opcode::Minus => bx - by,
                    _ => bx * by,
                })
            }
        }
        Opcode::Slash => {
            let y = float_of(b);
            if y == 0.0 {
                return Err(RunError::value_error("floating-point division by zero"));
            }
            NumOut::Float(float_of(a) / y)
        }
        Opcode::Slashslash => {
            if any_float {
                let y = float_of(b);
                if y == 0.0 {
                    return Err(RunError::value_error("floored division by zero"));
                }
                NumOut::Float((float_of(a) / y).floor())
            } else {
                let (bx, by) = (big_of(a), big_of(b));
                if by.is_zero() {
                    return Err(RunError::value_error("floored division by zero"));
                }
                NumOut::Big(bx.div_floor(&by))
            }
        }
        Opcode::Percent => {
            if any_float {
                let y = float_of(b);
                if y == 0.0 {
                    return Err(RunError::value_error("floating-point modulo by zero"));
                }
                let x = float_of(a);
                // Result takes the sign of the divisor.
                let mut r = x % y;
                if r != 0.0 && (r < 0.0) != (y < 0.0) {
                    r += y;
                }
                NumOut::Float(r)
            } else {
                let (bx, by) = (big_of(a), big_of(b));
                if by.is_zero() {
                    return Err(RunError::value_error("integer modulo by zero"));
                }
                NumOut::Big(bx.mod_floor(&by))
            }
        }
        Opcode::Amp | Opcode::Pipe | Opcode::Circumflex => {
            if any_float {
                return Ok(None);
            }
            let (bx, by) = (big_of(a), big_of(b));
            NumOut::Big(match op {
                Opcode::Amp => bx & by,
                Opcode::Pipe => bx | by,
                _ => bx ^ by,
            })
        }
        Opcode::Ltlt | Opcode::Gtgt => {
            if any_float {
                return Ok(None);
            }
            let shift = match b {
                Num::Int(y) if y < 0 => return Err(RunError::value_error("negative shift count")),
                Num::Int(y) if y >= 512 => return Err(RunError::value_error("shift count too large")),
                Num::Int(y) => y as u32,
                _ => return Err(RunError::value_error("shift count too large")),
            };
            let bx = big_of(a);
            NumOut::Big(if op == Opcode::Ltlt { bx << shift } else { bx >> shift })
        }
        _ => return Ok(None),
    };
    Ok(Some(out))
}

/// Applies a binary operator, surfacing a type error for unsupported
/// operand combinations.
pub(crate) fn binary(heap: &mut Heap, op: Opcode, x: Value, y: Value) -> RunResult<Value> {
    // Numbers first: both operands numeric and the operator arithmetic.
    let num_out = match (heap.num(x), heap.num(y)) {
        (Some(a), Some(b)) => num_binary(op, a, b)?,
        _ => None,
    };
    if let Some(out) = num_out {
        return Ok(match out {
            NumOut::Int(i) => Value::Int(i),
            NumOut::Big(b) => heap.alloc_bigint(b),
            NumOut::Float(f) => Value::Float(f),
        });
    }

    match op {
        Opcode::Plus => match (heap.data(x), heap.data(y)) {
            (Some(HeapData::Str(a)), Some(HeapData::Str(b))) => {
                let s = format!("{a}{b}");
                Ok(heap.alloc_str(s))
            }
            (Some(HeapData::Bytes(a)), Some(HeapData::Bytes(b))) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend_from_slice(a);
                v.extend_from_slice(b);
                Ok(heap.alloc_bytes(v))
            }
            (Some(HeapData::List(a)), Some(HeapData::List(b))) => {
                let mut elems = a.elems.clone();
                elems.extend_from_slice(&b.elems);
                Ok(heap.alloc_list(elems))
            }
            (Some(HeapData::Tuple(a)), Some(HeapData::Tuple(b))) => {
                let mut elems = a.clone();
                elems.extend_from_slice(b);
                Ok(heap.alloc_tuple(elems))
            }
            _ => Err(unknown_binary(heap, op, x, y)),
        },
        Opcode::Star => {
            let (seq, n) = match (x, y) {
                (seq, Value::Int(n)) => (seq, n),
                (Value::Int(n), seq) => (seq, n),
                _ => return Err(unknown_binary(heap, op, x, y)),
            };
            repeat_sequence(heap, seq, n).ok_or_else(|| unknown_binary(heap, op, x, y))?
        }
        Opcode::Pipe => match (heap.data(x), heap.data(y)) {
            (Some(HeapData::Dict(_)), Some(HeapData::Dict(_))) => {
                let merged = heap.alloc(HeapData::Dict(Dict::new()));
                let (Value::Ref(xid), Value::Ref(yid)) = (x, y) else {
                    unreachable!("dicts are heap values");
                };
                dict_update(heap, merged, xid)?;
                dict_update(heap, merged, yid)?;
                Ok(Value::Ref(merged))
            }
            (Some(HeapData::Set(_)), Some(HeapData::Set(_))) => {
                let union = heap.alloc(HeapData::Set(Set::new()));
                let (Value::Ref(xid), Value::Ref(yid)) = (x, y) else {
                    unreachable!("sets are heap values");
                };
                set_extend(heap, union, xid)?;
                set_extend(heap, union, yid)?;
                Ok(Value::Ref(union))
            }
            _ => Err(unknown_binary(heap, op, x, y)),
        },
        Opcode::Amp => match (heap.data(x), heap.data(y)) {
            (Some(HeapData::Set(a)), Some(HeapData::Set(_))) => {
                let elems: Vec<Value> = a.elems().collect();
                let (Value::Ref(_), Value::Ref(yid)) = (x, y) else {
                    unreachable!("sets are heap values");
                };
                let inter = heap.alloc(HeapData::Set(Set::new()));
                for e in elems {
                    if heap.set_contains(yid, e)? {
                        heap.set_add(inter, e)?;
                    }
                }
                Ok(Value::Ref(inter))
            }
            _ => Err(unknown_binary(heap, op, x, y)),
        },
        Opcode::In => contains(heap, x, y),
        _ => Err(unknown_binary(heap, op, x, y)),
    }
}

/// `seq * n`; `None` when the left operand is not repeatable.
fn repeat_sequence(heap: &mut Heap, seq: Value, n: i64) -> Option<RunResult<Value>> {
    let count = usize::try_from(n).unwrap_or(0);
    let Value::Ref(id) = seq else { return None };
    let result = match heap.get(id) {
        HeapData::Str(s) => {
            if let Err(e) = check_repeat(s.len(), count) {
                return Some(Err(e));
            }
            let repeated = s.repeat(count);
            Ok(heap.alloc_str(repeated))
        }
        HeapData::Bytes(b) => {
            if let Err(e) = check_repeat(b.len(), count) {
                return Some(Err(e));
            }
            let repeated = b.repeat(count);
            Ok(heap.alloc_bytes(repeated))
        }
        HeapData::List(l) => {
            if let Err(e) = check_repeat(l.elems.len(), count) {
                return Some(Err(e));
            }
            let repeated = repeat_elems(&l.elems, count);
            Ok(heap.alloc_list(repeated))
        }
        HeapData::Tuple(t) => {
            if let Err(e) = check_repeat(t.len(), count) {
                return Some(Err(e));
            }
            let repeated = repeat_elems(t, count);
            Ok(heap.alloc_tuple(repeated))
        }
        _ => return None,
    };
    Some(result)
}

fn check_repeat(len: usize, count: usize) -> RunResult<()> {
    if len.checked_mul(count).is_none() || len * count > MAX_REPEAT_ELEMS {
        return Err(RunError::value_error(format!("excessive repeat ({len} * {count} elements)")));
    }
    Ok(())
}

fn repeat_elems(elems: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(elems.len() * count);
    for _ in 0..count {
        out.extend_from_slice(elems);
    }
    out
}

/// Copies every entry of dict `src` into dict `dst`.
pub(crate) fn dict_update(heap: &mut Heap, dst: HeapId, src: HeapId) -> RunResult<()> {
    let pairs: Vec<(Value, Value)> = match heap.get(src) {
        HeapData::Dict(d) => d.entries().iter().map(|e| (e.key, e.value)).collect(),
        _ => return Err(RunError::internal("dict_update: not a dict")),
    };
    for (k, v) in pairs {
        heap.dict_set(dst, k, v)?;
    }
    Ok(())
}

fn set_extend(heap: &mut Heap, dst: HeapId, src: HeapId) -> RunResult<()> {
    let elems: Vec<Value> = match heap.get(src) {
        HeapData::Set(s) => s.elems().collect(),
        _ => return Err(RunError::internal("set_extend: not a set")),
    };
    for e in elems {
        heap.set_add(dst, e)?;
    }
    Ok(())
}

/// `x in y`.
fn contains(heap: &Heap, x: Value, y: Value) -> RunResult<Value> {
    let Value::Ref(yid) = y else {
        return Err(unknown_binary(heap, Opcode::In, x, y));
    };
    let found = match heap.get(yid) {
        HeapData::List(l) => seq_contains(heap, &l.elems, x)?,
        HeapData::Tuple(t) => seq_contains(heap, t, x)?,
        HeapData::Dict(_) => heap.dict_get(yid, x)?.is_some(),
        HeapData::Set(_) => heap.set_contains(yid, x)?,
        HeapData::Str(s) => match heap.str_value(x) {
            Some(needle) => s.contains(needle),
            None => {
                return Err(RunError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    x.type_of(heap)
                )))
            }
        },
        HeapData::Bytes(b) => match x {
            Value::Int(i) => u8::try_from(i).map_or(false, |byte| b.contains(&byte)),
            Value::Ref(xid) => match heap.get(xid) {
                HeapData::Bytes(needle) => {
                    needle.is_empty() || b.windows(needle.len().max(1)).any(|w| w == &needle[..])
                }
                _ => return Err(unknown_binary(heap, Opcode::In, x, y)),
            },
            _ => return Err(unknown_binary(heap, Opcode::In, x, y)),
        },
        _ => return Err(unknown_binary(heap, Opcode::In, x, y)),
    };
    Ok(Value::Bool(found))
}

fn seq_contains(heap: &Heap, elems: &[Value], x: Value) -> RunResult<bool> {
    for &e in elems {
        if heap.equal(e, x)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Applies a unary operator.
pub(crate) fn unary(heap: &mut Heap, op: Opcode, x: Value) -> RunResult<Value> {
    let sym = match op {
        Opcode::Uplus => "+",
        Opcode::Uminus => "-",
        Opcode::Tilde => "~",
        _ => "?",
    };
    let out = match (op, heap.num(x)) {
        (Opcode::Uplus, Some(_)) => return Ok(x),
        (Opcode::Uminus, Some(Num::Int(i))) => match i.checked_neg() {
            Some(v) => NumOut::Int(v),
            None => NumOut::Big(-BigInt::from(i)),
        },
        (Opcode::Uminus, Some(Num::Big(b))) => NumOut::Big(-b.clone()),
        (Opcode::Uminus, Some(Num::Float(f))) => NumOut::Float(-f),
        (Opcode::Tilde, Some(Num::Int(i))) => NumOut::Int(!i),
        (Opcode::Tilde, Some(Num::Big(b))) => NumOut::Big(-(b.clone() + 1i32)),
        _ => {
            return Err(RunError::type_error(format!(
                "unknown unary op: {sym}{}",
                x.type_of(heap)
            )))
        }
    };
    Ok(match out {
        NumOut::Int(i) => Value::Int(i),
        NumOut::Big(b) => heap.alloc_bigint(b),
        NumOut::Float(f) => Value::Float(f),
    })
}

/// Applies a comparison operator, returning the boolean outcome.
///
/// Equality is structural and total; ordered comparison fails on
/// incompatible types.
pub(crate) fn compare(heap: &Heap, op: Opcode, x: Value, y: Value) -> RunResult<bool> {
    match op {
        Opcode::Eql => heap.equal(x, y),
        Opcode::Neq => Ok(!heap.equal(x, y)?),
        _ => {
            let ord = order(heap, op, x, y, 0)?;
            Ok(match op {
                Opcode::Lt => ord == Ordering::Less,
                Opcode::Le => ord != Ordering::Greater,
                Opcode::Gt => ord == Ordering::Greater,
                Opcode::Ge => ord != Ordering::Less,
                _ => unreachable!("comparison opcodes handled above"),
            })
        }
    }
}

fn num_order(a: Num<'_>, b: Num<'_>) -> Ordering {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.cmp(&y),
        (Num::Big(x), Num::Big(y)) => x.cmp(y),
        (Num::Big(x), Num::Int(y)) => x.cmp(&BigInt::from(y)),
        (Num::Int(x), Num::Big(y)) => BigInt::from(x).cmp(y),
        // Floats order totally, with NaN after every other value.
        _ => float_of(a).total_cmp(&float_of(b)),
    }
}

fn order(heap: &Heap, op: Opcode, x: Value, y: Value, depth: u32) -> RunResult<Ordering> {
    if depth > 100 {
        return Err(RunError::value_error("comparison exceeded maximum recursion depth"));
    }
    if let (Some(a), Some(b)) = (heap.num(x), heap.num(y)) {
        return Ok(num_order(a, b));
    }
    match (x, y) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(&b)),
        (Value::Ref(a), Value::Ref(b)) => match (heap.get(a), heap.get(b)) {
            (HeapData::Str(sa), HeapData::Str(sb)) => Ok(sa.cmp(sb)),
            (HeapData::Bytes(ba), HeapData::Bytes(bb)) => Ok(ba.cmp(bb)),
            (HeapData::List(la), HeapData::List(lb)) => seq_order(heap, op, &la.elems, &lb.elems, depth),
            (HeapData::Tuple(ta), HeapData::Tuple(tb)) => seq_order(heap, op, ta, tb, depth),
            _ => Err(order_error(heap, op, x, y)),
        },
        _ => Err(order_error(heap, op, x, y)),
    }
}

fn seq_order(heap: &Heap, op: Opcode, a: &[Value], b: &[Value], depth: u32) -> RunResult<Ordering> {
    for (&ea, &eb) in a.iter().zip(b) {
        let ord = order(heap, op, ea, eb, depth + 1)?;
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn order_error(heap: &Heap, op: Opcode, x: Value, y: Value) -> RunError {
    RunError::type_error(format!(
        "{} {} {} not implemented",
        x.type_of(heap),
        op_sym(op),
        y.type_of(heap)
    ))
}

// --- indexing ---

fn seq_index(i: i64, len: usize, what: &str) -> RunResult<usize> {
    let n = len as i64;
    let resolved = if i < 0 { i + n } else { i };
    if resolved < 0 || resolved >= n {
        return Err(RunError::value_error(format!(
            "{what} index {i} out of range [0:{n})"
        )));
    }
    Ok(resolved as usize)
}

fn index_int(heap: &Heap, v: Value) -> RunResult<i64> {
    match v {
        Value::Int(i) => Ok(i),
        _ => Err(RunError::type_error(format!(
            "got {}, want int",
            v.type_of(heap)
        ))),
    }
}

/// `x[y]`.
pub(crate) fn get_index(heap: &mut Heap, x: Value, y: Value) -> RunResult<Value> {
    let Value::Ref(id) = x else {
        return Err(unhandled_index(heap, x, y));
    };
    match heap.get(id) {
        HeapData::List(l) => {
            let i = seq_index(index_int(heap, y)?, l.elems.len(), "list")?;
            Ok(l.elems[i])
        }
        HeapData::Tuple(t) => {
            let i = seq_index(index_int(heap, y)?, t.len(), "tuple")?;
            Ok(t[i])
        }
        HeapData::Str(s) => {
            let count = s.chars().count();
            let i = seq_index(index_int(heap, y)?, count, "string")?;
            let c = s.chars().nth(i).expect("index checked");
            Ok(heap.alloc_str(c.to_string()))
        }
        HeapData::Bytes(b) => {
            let i = seq_index(index_int(heap, y)?, b.len(), "bytes")?;
            Ok(Value::Int(i64::from(b[i])))
        }
        HeapData::Dict(_) => match heap.dict_get(id, y)? {
            Some(v) => Ok(v),
            None => Err(RunError::value_error(format!(
                "key {} not found in dict",
                heap.repr(y)
            ))),
        },
        _ => Err(unhandled_index(heap, x, y)),
    }
}

/// `x[y] = z`.
pub(crate) fn set_index(heap: &mut Heap, x: Value, y: Value, z: Value) -> RunResult<()> {
    let Value::Ref(id) = x else {
        return Err(unhandled_index(heap, x, y));
    };
    match heap.get(id) {
        HeapData::List(l) => {
            l.check_mutable("assign to element of")?;
            let i = seq_index(index_int(heap, y)?, l.elems.len(), "list")?;
            let HeapData::List(l) = heap.get_mut(id) else {
                unreachable!("entry type changed");
            };
            l.elems[i] = z;
            Ok(())
        }
        HeapData::Dict(_) => {
            heap.dict_set(id, y, z)?;
            Ok(())
        }
        _ => Err(unhandled_index(heap, x, y)),
    }
}

fn unhandled_index(heap: &Heap, x: Value, y: Value) -> RunError {
    RunError::type_error(format!(
        "unhandled index operation {}[{}]",
        x.type_of(heap),
        y.type_of(heap)
    ))
}

// --- slicing ---

/// `x[lo:hi:step]` over lists, tuples, strings and bytes.
pub(crate) fn slice(heap: &mut Heap, x: Value, lo: Value, hi: Value, step: Value) -> RunResult<Value> {
    let step = match step {
        Value::None => 1,
        v => index_int(heap, v)?,
    };
    if step == 0 {
        return Err(RunError::value_error("zero is not a valid slice step"));
    }

    let Value::Ref(id) = x else {
        return Err(RunError::type_error(format!(
            "invalid slice operand {}",
            x.type_of(heap)
        )));
    };
    match heap.get(id) {
        HeapData::List(l) => {
            let picked = slice_indices(l.elems.len(), lo, hi, step, heap)?;
            let elems = pick(&l.elems, &picked);
            Ok(heap.alloc_list(elems))
        }
        HeapData::Tuple(t) => {
            let picked = slice_indices(t.len(), lo, hi, step, heap)?;
            let elems = pick(t, &picked);
            Ok(heap.alloc_tuple(elems))
        }
        HeapData::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lo, hi, step, heap)?;
            let out: String = picked.iter().map(|&i| chars[i]).collect();
            Ok(heap.alloc_str(out))
        }
        HeapData::Bytes(b) => {
            let picked = slice_indices(b.len(), lo, hi, step, heap)?;
            let out: Vec<u8> = picked.iter().map(|&i| b[i]).collect();
            Ok(heap.alloc_bytes(out))
        }
        _ => Err(RunError::type_error(format!(
            "invalid slice operand {}",
            x.type_of(heap)
        ))),
    }
}

fn pick(elems: &[Value], indices: &[usize]) -> Vec<Value> {
    indices.iter().map(|&i| elems[i]).collect()
}

/// Resolves slice bounds with the usual clamping rules and returns the
/// selected indices in order.
fn slice_indices(len: usize, lo: Value, hi: Value, step: i64, heap: &Heap) -> RunResult<Vec<usize>> {
    let n = len as i64;
    let clamp = |v: i64, min: i64, max: i64| v.max(min).min(max);

    let (mut start, mut end) = if step > 0 { (0, n) } else { (n - 1, -1) };
    if let Value::Int(_) = lo {
        let mut v = index_int(heap, lo)?;
        if v < 0 {
            v += n;
        }
        start = if step > 0 { clamp(v, 0, n) } else { clamp(v, -1, n - 1) };
    } else if !matches!(lo, Value::None) {
        return Err(RunError::type_error(format!(
            "invalid slice index: got {}, want int",
            lo.type_of(heap)
        )));
    }
    if let Value::Int(_) = hi {
        let mut v = index_int(heap, hi)?;
        if v < 0 {
            v += n;
        }
        end = if step > 0 { clamp(v, 0, n) } else { clamp(v, -1, n - 1) };
    } else if !matches!(hi, Value::None) {
        return Err(RunError::type_error(format!(
            "invalid slice index: got {}, want int",
            hi.type_of(heap)
        )));
    }

    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

// --- attributes ---

/// `x.name`; the core carries no built-in methods, so every lookup reports
/// the absence.
pub(crate) fn get_attr(heap: &Heap, x: Value, name: &str) -> RunResult<Value> {
    Err(RunError::type_error(format!(
        "{} value has no .{name} field or method",
        x.type_of(heap)
    )))
}

/// `x.name = y`.
pub(crate) fn set_field(heap: &Heap, x: Value, name: &str) -> RunResult<()> {
    Err(RunError::type_error(format!(
        "can't assign to .{name} field of {}",
        x.type_of(heap)
    )))
}

/// Snapshot of the elements an iterable yields, or `None` when the value is
/// not iterable. Dicts yield their keys.
pub(crate) fn iterable_elems(heap: &Heap, v: Value) -> Option<Vec<Value>> {
    let Value::Ref(id) = v else { return None };
    match heap.get(id) {
        HeapData::List(l) => Some(l.elems.clone()),
        HeapData::Tuple(t) => Some(t.clone()),
        HeapData::Dict(d) => Some(d.entries().iter().map(|e| e.key).collect()),
        HeapData::Set(s) => Some(s.elems().collect()),
        _ => None,
    }
}

//! The bytecode interpreter loop.
//!
//! One [`Vm`] instance executes one call frame: it owns the frame's locals,
//! operand stack, open-iterator stack and deferred-action stack, and borrows
//! the thread for the heap, the step budget and nested calls. Errors are
//! values: an opcode body that fails short-circuits to the error-disposition
//! step at the bottom of the loop, which consults the defer and catch
//! tables before giving up and returning the error with a backtrace.

mod call;
mod defer;
mod ops;

pub(crate) use call::call;

use std::sync::Arc;

use defer::{innermost_catch, next_deferred, DeferredAction};

use crate::errors::{EvalException, RunError, RunResult};
use crate::function::{universal, Function};
use crate::heap::{HeapData, HeapId};
use crate::opcode::{decode_arg, Opcode};
use crate::program::{FuncId, Funcode, Program};
use crate::value::Value;
use crate::thread::Thread;

/// What a single dispatched instruction asks the loop to do next.
enum Flow {
    Next,
    Return(Value),
}

/// An iterator opened by ITERPUSH.
///
/// Index-based so the heap stays borrowable while iterating; the container's
/// live-iterator count is held until [`ActiveIter::done`] runs, which the
/// loop guarantees on every exit path.
struct ActiveIter {
    id: HeapId,
    index: usize,
}

impl ActiveIter {
    fn next(&mut self, heap: &crate::heap::Heap) -> Option<Value> {
        let v = match heap.get(self.id) {
            HeapData::List(l) => l.elems.get(self.index).copied(),
            HeapData::Tuple(t) => t.get(self.index).copied(),
            HeapData::Dict(d) => d.entries().get(self.index).map(|e| e.key),
            HeapData::Set(s) => s.elem_at(self.index),
            _ => None,
        };
        if v.is_some() {
            self.index += 1;
        }
        v
    }

    fn done(self, heap: &mut crate::heap::Heap) {
        heap.end_iteration(self.id);
    }
}

/// Per-call interpreter state.
pub(crate) struct Vm<'a> {
    thread: &'a mut Thread,
    program: Arc<Program>,
    func: FuncId,
    /// The function value being executed; FREE/FREECELL read its captured
    /// cells.
    function: HeapId,
    module: HeapId,
    locals: Vec<Option<Value>>,
    stack: Vec<Value>,
    max_stack: usize,
    iters: Vec<ActiveIter>,
    actions: Vec<DeferredAction>,
    /// Address of the next instruction.
    pc: u32,
    /// Address of the instruction currently executing; the defer/catch
    /// tables are consulted against this.
    insn_pc: u32,
    /// Set by RUNDEFER, observed and cleared by the next control-transfer
    /// opcode.
    run_defer: bool,
    /// The error visible inside a catch body; cleared by CATCHJMP.
    caught: Option<Box<EvalException>>,
}

impl<'a> Vm<'a> {
    pub(crate) fn new(
        thread: &'a mut Thread,
        program: Arc<Program>,
        func: FuncId,
        function: HeapId,
        module: HeapId,
        locals: Vec<Option<Value>>,
        max_stack: usize,
    ) -> Self {
        Self {
            thread,
            program,
            func,
            function,
            module,
            locals,
            stack: Vec::with_capacity(max_stack),
            max_stack,
            iters: Vec::new(),
            actions: Vec::new(),
            pc: 0,
            insn_pc: 0,
            run_defer: false,
            caught: None,
        }
    }

    pub(crate) fn run(&mut self) -> RunResult<Value> {
        let program = self.program.clone();
        let fcode = program.funcode(self.func);

        let outcome: RunResult<Value> = 'outer: loop {
            // Dispatch until something breaks the flow.
            let err = loop {
                match self.step(fcode) {
                    Ok(Flow::Next) => {}
                    Ok(Flow::Return(v)) => break 'outer Ok(v),
                    Err(e) => break e,
                }
            };

            // Error disposition: run eligible defers, then the innermost
            // covering catch; uncatchable errors skip both.
            let exc = match err {
                RunError::Exc(e) => e,
                other => break 'outer Err(other),
            };
            let from = i64::from(self.insn_pc);
            let handler = innermost_catch(&fcode.catches, from);
            let to = handler.map_or(-1, |c| i64::from(c.start_pc));
            if let Some(start) = next_deferred(&fcode.defers, from, to) {
                self.actions.push(DeferredAction::Throw {
                    exc,
                    pc: self.insn_pc,
                });
                self.pc = start;
                continue 'outer;
            }
            if let Some(c) = handler {
                self.caught = Some(exc);
                self.pc = c.start_pc;
                continue 'outer;
            }
            break 'outer Err(RunError::Exc(exc));
        };

        // Close every iterator still open, whatever the exit path.
        for it in std::mem::take(&mut self.iters) {
            it.done(self.thread.heap_mut());
        }

        outcome
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
        debug_assert!(
            self.stack.len() <= self.max_stack,
            "operand stack exceeded declared maximum {}",
            self.max_stack
        );
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    /// A control transfer to `target`, entering the deferred subsystem
    /// first when RUNDEFER marked this transfer.
    fn transfer(&mut self, fcode: &Funcode, target: u32) {
        if std::mem::take(&mut self.run_defer) {
            if let Some(start) = next_deferred(&fcode.defers, i64::from(self.insn_pc), i64::from(target)) {
                self.actions.push(DeferredAction::Jump(target));
                self.pc = start;
                return;
            }
        }
        self.pc = target;
    }

    fn constant(&self, index: u32) -> RunResult<Value> {
        let HeapData::Module(m) = self.thread.heap.get(self.module) else {
            return Err(RunError::internal("module entry corrupted"));
        };
        m.constants
            .get(index as usize)
            .copied()
            .ok_or_else(|| RunError::internal(format!("constant index {index} out of range")))
    }

    fn freevar(&self, index: u32) -> RunResult<Value> {
        let HeapData::Function(f) = self.thread.heap.get(self.function) else {
            return Err(RunError::internal("function entry corrupted"));
        };
        f.freevars
            .get(index as usize)
            .copied()
            .ok_or_else(|| RunError::internal(format!("freevar index {index} out of range")))
    }

    fn cell_value(&self, cell: Value) -> RunResult<Option<Value>> {
        let Value::Ref(id) = cell else {
            return Err(RunError::internal("cell slot does not hold a cell"));
        };
        match self.thread.heap.get(id) {
            HeapData::Cell(c) => Ok(c.value),
            _ => Err(RunError::internal("cell slot does not hold a cell")),
        }
    }

    fn set_cell_value(&mut self, cell: Value, v: Value) -> RunResult<()> {
        let Value::Ref(id) = cell else {
            return Err(RunError::internal("cell slot does not hold a cell"));
        };
        match self.thread.heap.get_mut(id) {
            HeapData::Cell(c) => {
                c.value = Some(v);
                Ok(())
            }
            _ => Err(RunError::internal("cell slot does not hold a cell")),
        }
    }

    /// Decodes and executes one instruction.
    fn step(&mut self, fcode: &Funcode) -> RunResult<Flow> {
        self.thread.steps += 1;
        if self.thread.steps >= self.thread.max_steps() {
            if let Some(hook) = self.thread.on_max_steps_hook() {
                hook(&mut *self.thread);
            } else {
                self.thread.cancel("too many steps");
            }
        }
        if let Some(reason) = self.thread.cancelled() {
            return Err(RunError::cancelled(&reason));
        }

        self.insn_pc = self.pc;
        if let Some(fr) = self.thread.frames.last_mut() {
            fr.pc = self.pc;
        }

        let code = &fcode.code;
        // Running off the end of the body returns None; jump targets are
        // validated against instruction starts, so only fallthrough gets
        // here.
        let Some(&byte) = code.get(self.pc as usize) else {
            return Ok(Flow::Return(Value::None));
        };
        let op = Opcode::try_from(byte).map_err(|e| RunError::internal(format!("unimplemented: {e}")))?;
        let mut next = self.pc as usize + 1;
        let mut arg: u32 = 0;
        if op.has_arg() {
            let (a, n) = decode_arg(code, next).map_err(|e| RunError::internal(e.to_string()))?;
            arg = a;
            next = n;
        }
        self.pc = next as u32;

        match op {
            Opcode::Nop => {}

            // --- stack shuffling ---
            Opcode::Dup => {
                let v = *self.stack.last().expect("operand stack underflow");
                self.push(v);
            }
            Opcode::Dup2 => {
                let n = self.stack.len();
                let (a, b) = (self.stack[n - 2], self.stack[n - 1]);
                self.push(a);
                self.push(b);
            }
            Opcode::Pop => {
                self.pop();
            }
            Opcode::Exch => {
                let n = self.stack.len();
                self.stack.swap(n - 2, n - 1);
            }

            // --- comparisons ---
            Opcode::Eql | Opcode::Neq | Opcode::Gt | Opcode::Lt | Opcode::Le | Opcode::Ge => {
                let y = self.pop();
                let x = self.pop();
                let ok = ops::compare(&self.thread.heap, op, x, y)?;
                self.push(Value::Bool(ok));
            }

            // --- binary and unary operators ---
            Opcode::Plus
            | Opcode::Minus
            | Opcode::Star
            | Opcode::Slash
            | Opcode::Slashslash
            | Opcode::Percent
            | Opcode::Amp
            | Opcode::Pipe
            | Opcode::Circumflex
            | Opcode::Ltlt
            | Opcode::Gtgt
            | Opcode::In => {
                let y = self.pop();
                let x = self.pop();
                let z = ops::binary(&mut self.thread.heap, op, x, y)?;
                self.push(z);
            }
            Opcode::Uplus | Opcode::Uminus | Opcode::Tilde => {
                let x = self.pop();
                let y = ops::unary(&mut self.thread.heap, op, x)?;
                self.push(y);
            }
            Opcode::Not => {
                let x = self.pop();
                let t = x.truth(&self.thread.heap);
                self.push(Value::Bool(!t));
            }

            // --- fused in-place operators ---
            Opcode::InplaceAdd => {
                let y = self.pop();
                let x = self.pop();
                // A list extends in place when the right operand is
                // iterable; anything else falls back to PLUS.
                let extended = match x {
                    Value::Ref(id) if matches!(self.thread.heap.get(id), HeapData::List(_)) => {
                        match ops::iterable_elems(&self.thread.heap, y) {
                            Some(elems) => {
                                let HeapData::List(l) = self.thread.heap.get(id) else {
                                    unreachable!("checked above");
                                };
                                l.check_mutable("apply += to")?;
                                let HeapData::List(l) = self.thread.heap.get_mut(id) else {
                                    unreachable!("checked above");
                                };
                                l.elems.extend(elems);
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                };
                if extended {
                    self.push(x);
                } else {
                    let z = ops::binary(&mut self.thread.heap, Opcode::Plus, x, y)?;
                    self.push(z);
                }
            }
            Opcode::InplacePipe => {
                let y = self.pop();
                let x = self.pop();
                let both_dicts = matches!(
                    (self.thread.heap.data(x), self.thread.heap.data(y)),
                    (Some(HeapData::Dict(_)), Some(HeapData::Dict(_)))
                );
                if both_dicts {
                    let (Value::Ref(xid), Value::Ref(yid)) = (x, y) else {
                        unreachable!("dicts are heap values");
                    };
                    let HeapData::Dict(d) = self.thread.heap.get(xid) else {
                        unreachable!("checked above");
                    };
                    d.check_mutable("apply |= to")?;
                    ops::dict_update(&mut self.thread.heap, xid, yid)?;
                    self.push(x);
                } else {
                    let z = ops::binary(&mut self.thread.heap, Opcode::Pipe, x, y)?;
                    self.push(z);
                }
            }

            // --- constants ---
            Opcode::None => self.push(Value::None),
            Opcode::True => self.push(Value::Bool(true)),
            Opcode::False => self.push(Value::Bool(false)),
            Opcode::Mandatory => self.push(Value::Mandatory),
            Opcode::Constant => {
                let v = self.constant(arg)?;
                self.push(v);
            }

            // --- control flow ---
            Opcode::Jmp => self.transfer(fcode, arg),
            Opcode::Cjmp => {
                let cond = self.pop().truth(&self.thread.heap);
                if cond {
                    self.transfer(fcode, arg);
                } else {
                    self.run_defer = false;
                }
            }
            Opcode::Return => {
                let v = self.pop();
                if std::mem::take(&mut self.run_defer) {
                    if let Some(start) = next_deferred(&fcode.defers, i64::from(self.insn_pc), -1) {
                        self.actions.push(DeferredAction::Return(v));
                        self.pc = start;
                        return Ok(Flow::Next);
                    }
                }
                return Ok(Flow::Return(v));
            }

            // --- iteration ---
            Opcode::Iterpush => {
                let x = self.pop();
                let iterable = match x {
                    Value::Ref(id) => matches!(
                        self.thread.heap.get(id),
                        HeapData::List(_) | HeapData::Tuple(_) | HeapData::Dict(_) | HeapData::Set(_)
                    )
                    .then_some(id),
                    _ => None,
                };
                let Some(id) = iterable else {
                    return Err(RunError::type_error(format!(
                        "{} value is not iterable",
                        x.type_of(&self.thread.heap)
                    )));
                };
                self.thread.heap.begin_iteration(id);
                self.iters.push(ActiveIter { id, index: 0 });
            }
            Opcode::Iterjmp => {
                let heap = &self.thread.heap;
                let it = self.iters.last_mut().expect("ITERJMP with no open iterator");
                match it.next(heap) {
                    Some(v) => {
                        self.run_defer = false;
                        self.push(v);
                    }
                    None => self.transfer(fcode, arg),
                }
            }
            Opcode::Iterpop => {
                let it = self.iters.pop().expect("ITERPOP with no open iterator");
                it.done(self.thread.heap_mut());
            }

            // --- indexing and composites ---
            Opcode::Setindex => {
                let z = self.pop();
                let y = self.pop();
                let x = self.pop();
                ops::set_index(&mut self.thread.heap, x, y, z)?;
            }
            Opcode::Index => {
                let y = self.pop();
                let x = self.pop();
                let z = ops::get_index(&mut self.thread.heap, x, y)?;
                self.push(z);
            }
            Opcode::Setdict | Opcode::Setdictuniq => {
                let v = self.pop();
                let k = self.pop();
                let dict = self.pop();
                let Value::Ref(id) = dict else {
                    return Err(RunError::internal("SETDICT target is not a dict"));
                };
                let replaced = self.thread.heap.dict_set(id, k, v)?;
                if op == Opcode::Setdictuniq && replaced.is_some() {
                    return Err(RunError::value_error(format!(
                        "duplicate key: {}",
                        self.thread.heap.repr(k)
                    )));
                }
            }
            Opcode::Append => {
                let elem = self.pop();
                let list = self.pop();
                let Value::Ref(id) = list else {
                    return Err(RunError::internal("APPEND target is not a list"));
                };
                let HeapData::List(l) = self.thread.heap.get(id) else {
                    return Err(RunError::internal("APPEND target is not a list"));
                };
                l.check_mutable("append to")?;
                let HeapData::List(l) = self.thread.heap.get_mut(id) else {
                    unreachable!("checked above");
                };
                l.elems.push(elem);
            }
            Opcode::Slice => {
                let step = self.pop();
                let hi = self.pop();
                let lo = self.pop();
                let x = self.pop();
                let z = ops::slice(&mut self.thread.heap, x, lo, hi, step)?;
                self.push(z);
            }
            Opcode::Makedict => {
                let d = self.thread.heap.alloc(HeapData::Dict(crate::types::Dict::new()));
                self.push(Value::Ref(d));
            }
            Opcode::Maketuple => {
                let n = arg as usize;
                let elems = self.stack.split_off(self.stack.len() - n);
                let t = self.thread.heap.alloc_tuple(elems);
                self.push(t);
            }
            Opcode::Makelist => {
                let n = arg as usize;
                let elems = self.stack.split_off(self.stack.len() - n);
                let l = self.thread.heap.alloc_list(elems);
                self.push(l);
            }
            Opcode::Unpack => {
                let n = arg as usize;
                let iterable = self.pop();
                let Some(elems) = ops::iterable_elems(&self.thread.heap, iterable) else {
                    return Err(RunError::type_error(format!(
                        "got {} in sequence assignment",
                        iterable.type_of(&self.thread.heap)
                    )));
                };
                if elems.len() > n {
                    return Err(RunError::value_error(format!(
                        "too many values to unpack (got {}, want {n})",
                        elems.len()
                    )));
                }
                if elems.len() < n {
                    return Err(RunError::value_error(format!(
                        "too few values to unpack (got {}, want {n})",
                        elems.len()
                    )));
                }
                for &e in elems.iter().rev() {
                    self.push(e);
                }
            }

            // --- attributes ---
            Opcode::Attr => {
                let name = self.name(arg)?;
                let x = self.pop();
                let y = ops::get_attr(&self.thread.heap, x, &name)?;
                self.push(y);
            }
            Opcode::Setfield => {
                let name = self.name(arg)?;
                let y = self.pop();
                let x = self.pop();
                let _ = y;
                ops::set_field(&self.thread.heap, x, &name)?;
            }

            // --- name access ---
            Opcode::Setlocal => {
                let v = self.pop();
                self.locals[arg as usize] = Some(v);
            }
            Opcode::Local => {
                let v = self.locals[arg as usize].ok_or_else(|| {
                    RunError::name_error(format!(
                        "local variable {} referenced before assignment",
                        fcode.locals[arg as usize].name
                    ))
                })?;
                self.push(v);
            }
            Opcode::Setlocalcell => {
                let v = self.pop();
                let cell = self.locals[arg as usize].ok_or_else(|| RunError::internal("cell slot unset"))?;
                self.set_cell_value(cell, v)?;
            }
            Opcode::Localcell => {
                let cell = self.locals[arg as usize].ok_or_else(|| RunError::internal("cell slot unset"))?;
                let v = self.cell_value(cell)?.ok_or_else(|| {
                    RunError::name_error(format!(
                        "local variable {} referenced before assignment",
                        fcode.locals[arg as usize].name
                    ))
                })?;
                self.push(v);
            }
            Opcode::Free => {
                let v = self.freevar(arg)?;
                self.push(v);
            }
            Opcode::Freecell => {
                let cell = self.freevar(arg)?;
                let v = self.cell_value(cell)?.ok_or_else(|| {
                    RunError::name_error(format!(
                        "local variable {} referenced before assignment",
                        fcode.freevars[arg as usize].name
                    ))
                })?;
                self.push(v);
            }
            Opcode::Setglobal => {
                let v = self.pop();
                let HeapData::Module(m) = self.thread.heap.get_mut(self.module) else {
                    return Err(RunError::internal("module entry corrupted"));
                };
                m.globals[arg as usize] = Some(v);
            }
            Opcode::Global => {
                let HeapData::Module(m) = self.thread.heap.get(self.module) else {
                    return Err(RunError::internal("module entry corrupted"));
                };
                let v = m.globals[arg as usize].ok_or_else(|| {
                    RunError::name_error(format!(
                        "global variable {} referenced before assignment",
                        self.program.globals[arg as usize].name
                    ))
                })?;
                self.push(v);
            }
            Opcode::Predeclared => {
                let name = self.name(arg)?;
                let HeapData::Module(m) = self.thread.heap.get(self.module) else {
                    return Err(RunError::internal("module entry corrupted"));
                };
                let v = m.predeclared.get(name.as_str()).copied().ok_or_else(|| {
                    RunError::internal(format!("predeclared variable {name} is uninitialized"))
                })?;
                self.push(v);
            }
            Opcode::Universal => {
                let name = self.name(arg)?;
                let v = universal(&name)
                    .ok_or_else(|| RunError::internal(format!("universal variable {name} is uninitialized")))?;
                self.push(v);
            }

            // --- closures and calls ---
            Opcode::Makefunc => {
                let tuple = self.pop();
                let Some(HeapData::Tuple(elems)) = self.thread.heap.data(tuple) else {
                    return Err(RunError::internal("MAKEFUNC operand is not a tuple"));
                };
                let elems = elems.clone();
                let funcode = self
                    .program
                    .functions
                    .get(arg as usize)
                    .ok_or_else(|| RunError::internal(format!("function index {arg} out of range")))?;
                let nfree = funcode.freevars.len();
                let split = elems.len() - nfree;
                let f = Function {
                    program: self.program.clone(),
                    func: FuncId::Func(arg),
                    module: self.module,
                    defaults: elems[..split].to_vec(),
                    freevars: elems[split..].to_vec(),
                };
                let id = self.thread.heap.alloc(HeapData::Function(f));
                self.push(Value::Ref(id));
            }
            Opcode::Call | Opcode::CallVar | Opcode::CallKw | Opcode::CallVarKw => {
                let flow = self.do_call(op, arg)?;
                return Ok(flow);
            }

            // --- module loading ---
            Opcode::Load => {
                self.do_load(arg)?;
            }

            // --- deferred execution ---
            Opcode::Rundefer => {
                self.run_defer = true;
            }
            Opcode::Deferexit => {
                let Some(top) = self.actions.last() else {
                    return Err(RunError::internal("DEFEREXIT with empty deferred stack"));
                };
                let to = top.target();
                if let Some(start) = next_deferred(&fcode.defers, i64::from(self.insn_pc), to) {
                    self.pc = start;
                    return Ok(Flow::Next);
                }
                match self.actions.pop().expect("checked above") {
                    DeferredAction::Jump(addr) => self.pc = addr,
                    DeferredAction::Return(v) => return Ok(Flow::Return(v)),
                    DeferredAction::Throw { exc, pc } => {
                        // The defers between the throw site and here have
                        // run; resolve the handler against the original
                        // site.
                        match innermost_catch(&fcode.catches, i64::from(pc)) {
                            Some(c) => {
                                self.caught = Some(exc);
                                self.pc = c.start_pc;
                            }
                            None => return Err(RunError::Exc(exc)),
                        }
                    }
                }
            }
            Opcode::Catchjmp => {
                self.caught.take();
                let (action, to) = if arg == 0 {
                    (DeferredAction::Return(Value::None), -1)
                } else {
                    (DeferredAction::Jump(arg), i64::from(arg))
                };
                if let Some(start) = next_deferred(&fcode.defers, i64::from(self.insn_pc), to) {
                    self.actions.push(action);
                    self.pc = start;
                } else {
                    match action {
                        DeferredAction::Jump(addr) => self.pc = addr,
                        DeferredAction::Return(v) => return Ok(Flow::Return(v)),
                        DeferredAction::Throw { .. } => unreachable!("fallthrough is jump or return"),
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn name(&self, index: u32) -> RunResult<String> {
        self.program
            .names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| RunError::internal(format!("name index {index} out of range")))
    }

    /// The CALL family: unpacks the packed argument count, collects
    /// keyword pairs, *args and **kwargs, and dispatches.
    fn do_call(&mut self, op: Opcode, arg: u32) -> RunResult<Flow> {
        let kwargs = matches!(op, Opcode::CallKw | Opcode::CallVarKw)
            .then(|| self.pop());
        let varargs = matches!(op, Opcode::CallVar | Opcode::CallVarKw)
            .then(|| self.pop());

        let nkv = (arg & 0xff) as usize;
        let npos = (arg >> 8) as usize;

        let kvflat = self.stack.split_off(self.stack.len() - 2 * nkv);
        let mut named: Vec<(Value, Value)> = kvflat.chunks(2).map(|pair| (pair[0], pair[1])).collect();

        if let Some(kw) = kwargs {
            let Some(HeapData::Dict(d)) = self.thread.heap.data(kw) else {
                return Err(RunError::type_error(format!(
                    "argument after ** must be a mapping, not {}",
                    kw.type_of(&self.thread.heap)
                )));
            };
            let pairs: Vec<(Value, Value)> = d.entries().iter().map(|e| (e.key, e.value)).collect();
            for &(k, _) in &pairs {
                if self.thread.heap.str_value(k).is_none() {
                    return Err(RunError::type_error(format!(
                        "keywords must be strings, not {}",
                        k.type_of(&self.thread.heap)
                    )));
                }
            }
            named.extend(pairs);
        }

        let mut positional = self.stack.split_off(self.stack.len() - npos);
        if let Some(args) = varargs {
            let Some(elems) = ops::iterable_elems(&self.thread.heap, args) else {
                return Err(RunError::type_error(format!(
                    "argument after * must be iterable, not {}",
                    args.type_of(&self.thread.heap)
                )));
            };
            positional.extend(elems);
        }

        let callee = self.pop();
        let z = call(self.thread, callee, positional, named)?;
        self.push(z);
        Ok(Flow::Next)
    }

    /// The LOAD opcode: pops a module name and `n` load-names, replaces the
    /// names with the loaded values.
    fn do_load(&mut self, n: u32) -> RunResult<()> {
        let module_v = self.pop();
        let module = self
            .thread
            .heap
            .str_value(module_v)
            .ok_or_else(|| RunError::internal("LOAD module name is not a string"))?
            .to_owned();

        let Some(hook) = self.thread.load_hook() else {
            return Err(RunError::load_error("load not implemented by this application"));
        };
        let dict = hook(&mut *self.thread, &module)
            .map_err(|e| RunError::load_error(format!("cannot load {module}: {}", e.message())))?;

        let len = self.stack.len();
        for i in 0..n as usize {
            let slot = len - 1 - i;
            let name = self
                .thread
                .heap
                .str_value(self.stack[slot])
                .ok_or_else(|| RunError::internal("LOAD name is not a string"))?;
            let Some(&v) = dict.get(name) else {
                let mut msg = format!("load: name {name} not found in module {module}");
                if let Some(n) = crate::spell::nearest(name, dict.keys().map(String::as_str)) {
                    msg.push_str(&format!(" (did you mean {n}?)"));
                }
                return Err(RunError::load_error(msg));
            };
            self.stack[slot] = v;
        }
        Ok(())
    }
}

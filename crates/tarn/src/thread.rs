//! The execution context: call frames, step budget, cancellation, hooks.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{RunError, StackFrame};
use crate::heap::Heap;
use crate::module::StringDict;
use crate::program::{FuncId, Program};
use crate::value::Value;

/// A module-loading hook: returns the mapping of names exported by the
/// named module, or a load error (including load cycles).
pub type LoadFn = dyn Fn(&mut Thread, &str) -> Result<StringDict, RunError>;

/// Invoked when the step budget is exhausted; when absent the thread is
/// cancelled with reason "too many steps".
pub type MaxStepsFn = dyn Fn(&mut Thread);

/// One entry of the call stack.
pub(crate) struct Frame {
    pub name: String,
    /// The pc of the instruction this frame is currently executing.
    pub pc: u32,
    /// The funcode identity, for the recursion guard. Builtin frames carry
    /// none.
    pub func: Option<(Arc<Program>, FuncId)>,
}

/// An execution context.
///
/// One thread evaluates one call stack at a time; independent threads share
/// nothing but (immutable) programs. The thread owns the value arena, so
/// every value produced by execution lives exactly as long as the thread.
pub struct Thread {
    /// Abstract computation steps executed so far, incremented once per
    /// dispatched opcode.
    pub steps: u64,
    max_steps: u64,
    on_max_steps: Option<Rc<MaxStepsFn>>,
    load: Option<Rc<LoadFn>>,
    cancel: Arc<CancelState>,
    locals: StringDict,
    pub(crate) frames: Vec<Frame>,
    pub(crate) heap: Heap,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("steps", &self.steps)
            .field("frames", &self.frames.len())
            .field("cancelled", &self.cancelled())
            .finish_non_exhaustive()
    }
}

impl Thread {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: 0,
            max_steps: u64::MAX,
            on_max_steps: None,
            load: None,
            cancel: Arc::new(CancelState::default()),
            locals: StringDict::new(),
            frames: Vec::new(),
            heap: Heap::new(),
        }
    }

    /// Caps the number of opcodes this thread may execute.
    pub fn set_max_steps(&mut self, max_steps: u64) {
        self.max_steps = max_steps;
    }

    pub(crate) fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Installs the module-loading hook consulted by the LOAD opcode.
    pub fn set_load(&mut self, load: impl Fn(&mut Thread, &str) -> Result<StringDict, RunError> + 'static) {
        self.load = Some(Rc::new(load));
    }

    pub(crate) fn load_hook(&self) -> Option<Rc<LoadFn>> {
        self.load.clone()
    }

    /// Installs the budget-exhaustion hook.
    pub fn set_on_max_steps(&mut self, hook: impl Fn(&mut Thread) + 'static) {
        self.on_max_steps = Some(Rc::new(hook));
    }

    pub(crate) fn on_max_steps_hook(&self) -> Option<Rc<MaxStepsFn>> {
        self.on_max_steps.clone()
    }

    /// Cancels execution; the first reason wins. The interpreter observes
    /// the flag at the top of every dispatch iteration and raises an
    /// uncatchable error.
    pub fn cancel(&self, reason: &str) {
        self.cancel.cancel(reason);
    }

    /// A handle that can cancel this thread from elsewhere.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// The cancellation reason, when set.
    #[must_use]
    pub fn cancelled(&self) -> Option<String> {
        if !self.cancel.flag.load(Ordering::Acquire) {
            return None;
        }
        self.cancel.reason.lock().expect("cancel reason poisoned").clone()
    }

    /// Stores an application value on the thread.
    pub fn set_local(&mut self, name: impl Into<String>, v: Value) {
        self.locals.insert(name.into(), v);
    }

    /// Reads back an application value stored with [`Thread::set_local`].
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.get(name).copied()
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Snapshot of the call stack for error backtraces, innermost frame
    /// first.
    pub(crate) fn backtrace(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|f| StackFrame {
                name: f.name.clone(),
                pc: f.pc,
            })
            .collect()
    }
}

#[derive(Default)]
struct CancelState {
    flag: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancelState {
    fn cancel(&self, reason: &str) {
        let mut slot = self.reason.lock().expect("cancel reason poisoned");
        if self
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *slot = Some(reason.to_owned());
        }
    }
}

/// Cancels the associated thread; cloneable and sendable to other host
/// threads.
#[derive(Clone)]
pub struct CancelHandle(Arc<CancelState>);

impl CancelHandle {
    pub fn cancel(&self, reason: &str) {
        self.0.cancel(reason);
    }
}

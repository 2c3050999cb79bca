//! The tarn runtime core: a bytecode virtual machine for a small
//! dynamically typed scripting language, together with the textual
//! assembler/disassembler that is the VM's front door for testing and the
//! dynamic semantics of deferred-execution (`defer`/`catch`) blocks.
//!
//! The compiler, resolver and standard library live elsewhere; this crate
//! consumes a compiled [`Program`] and executes it on a [`Thread`]:
//!
//! ```
//! use std::sync::Arc;
//! use tarn::{assemble, Program, StringDict, Thread};
//!
//! let program = Arc::new(
//!     assemble(
//!         "
//!         program:
//!           function: Top 1 0 0
//!             code:
//!               NONE
//!               RETURN
//!         ",
//!     )
//!     .unwrap(),
//! );
//! let mut thread = Thread::new();
//! let globals = Program::init(&program, &mut thread, StringDict::new()).unwrap();
//! assert!(globals.is_empty());
//! ```

mod asm;
mod errors;
mod function;
mod heap;
mod module;
mod opcode;
mod program;
mod quote;
mod spell;
mod thread;
mod types;
mod value;
mod vm;

pub use crate::{
    asm::{assemble, disassemble, AsmError},
    errors::{ErrorKind, EvalException, RunError, RunResult, StackFrame},
    function::{universal, BuiltinDef, NativeFn},
    heap::{Heap, HeapId},
    module::StringDict,
    opcode::{decode_arg, encode_insn, InvalidArgError, InvalidOpcodeError, Opcode},
    program::{Binding, Constant, DeferBlock, FuncId, Funcode, Program},
    thread::{CancelHandle, LoadFn, MaxStepsFn, Thread},
    types::Type,
    value::{as_int32, Value},
};

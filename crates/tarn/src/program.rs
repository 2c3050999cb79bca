//! Compiled program model.
//!
//! A [`Program`] is pure data produced by an external compiler (or by the
//! assembler in `asm`): a shared pool of loads, names, globals and constants
//! plus one funcode per function, the first being the module's top-level
//! function. Programs are immutable at run time and safely shareable across
//! threads behind an `Arc`.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// A compiled module, ready for execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// When false, direct or indirect self-recursion of a function is
    /// detected at call time and fails.
    pub recursion: bool,
    /// Names of modules loaded by the LOAD opcode.
    pub loads: Vec<Binding>,
    /// Names referenced by ATTR, SETFIELD, PREDECLARED and UNIVERSAL.
    pub names: Vec<String>,
    /// Top-level module variables referenced by GLOBAL/SETGLOBAL index.
    pub globals: Vec<Binding>,
    /// Shared constant pool referenced by CONSTANT index.
    pub constants: Vec<Constant>,
    /// The module's top-level function.
    pub toplevel: Funcode,
    /// All remaining functions, referenced by MAKEFUNC index.
    pub functions: Vec<Funcode>,
}

impl Program {
    /// Resolves a function identifier to its funcode.
    #[must_use]
    pub fn funcode(&self, id: FuncId) -> &Funcode {
        match id {
            FuncId::Toplevel => &self.toplevel,
            FuncId::Func(i) => &self.functions[i as usize],
        }
    }
}

/// Identifies one funcode within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncId {
    Toplevel,
    Func(u32),
}

/// A named binding in the loads, globals, locals or freevars lists.
///
/// The compiler also records source positions here; the assembly format
/// carries none, so the name is the whole binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
}

impl Binding {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An entry in the shared constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// The compiled body of one function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Funcode {
    pub name: String,
    /// Maximum operand-stack depth during execution of this function.
    pub max_stack: u32,
    /// Number of named parameters, keyword-only parameters last.
    pub num_params: u32,
    /// Number of trailing keyword-only parameters among `num_params`.
    pub num_kwonly_params: u32,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    /// Named local slots; parameters first, then the varargs and kwargs
    /// slots when present, then plain locals.
    pub locals: Vec<Binding>,
    /// Indices into `locals` that are boxed into cells at call entry.
    pub cells: Vec<u32>,
    /// Names of variables captured from the enclosing scope.
    pub freevars: Vec<Binding>,
    /// Catch descriptors, consulted only on exception.
    pub catches: Vec<DeferBlock>,
    /// Defer descriptors, entered on every normal exit from their range.
    pub defers: Vec<DeferBlock>,
    /// Raw instruction stream.
    pub code: Vec<u8>,
}

/// A defer or catch descriptor: the half-open body entry `start_pc` guarding
/// the inclusive pc range [`pc0`, `pc1`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferBlock {
    pub pc0: u32,
    pub pc1: u32,
    pub start_pc: u32,
}

impl DeferBlock {
    /// Reports whether this descriptor covers `pc`.
    ///
    /// The pc is signed so that the conventional "nowhere" destination -1 is
    /// never covered.
    #[inline]
    #[must_use]
    pub fn covers(&self, pc: i64) -> bool {
        i64::from(self.pc0) <= pc && pc <= i64::from(self.pc1)
    }
}

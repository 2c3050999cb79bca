//! Runtime error surface.
//!
//! Errors are values, never unwinding: every opcode body that fails produces
//! a [`RunError`] which the dispatch loop routes through the catch table or
//! returns to the caller. Cancellation and internal invariant violations are
//! uncatchable.

use std::fmt;

use strum::Display;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// The kind of a runtime error, used for reporting and for catchability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    /// Operator applied to incompatible operands; value not iterable,
    /// hashable or callable.
    Type,
    /// Local/global/free variable referenced before assignment; load-name
    /// not found.
    Name,
    /// Unpack arity mismatch, duplicate dict key, out-of-range conversion.
    Value,
    /// Mutation of a frozen container or of a container under iteration.
    Mutation,
    /// Self-recursive call while recursion is disabled.
    Recursion,
    /// Step budget exhausted.
    Resource,
    /// Thread cancelled; never catchable.
    Cancelled,
    /// Load hook failure or unknown load name.
    Load,
    /// Corrupted program or unimplemented opcode; never catchable.
    Internal,
}

/// One entry of an error backtrace: the function name and the pc of the
/// instruction that was executing in that frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub name: String,
    pub pc: u32,
}

/// A runtime error with its kind, message and (once it escapes a call) the
/// frame backtrace captured at the failure point.
#[derive(Debug, Clone)]
pub struct EvalException {
    pub kind: ErrorKind,
    pub message: String,
    pub frames: Vec<StackFrame>,
}

impl EvalException {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Renders the backtrace, innermost frame first.
    #[must_use]
    pub fn backtrace(&self) -> String {
        let mut out = String::new();
        for fr in &self.frames {
            out.push_str(&format!("  in {} at pc {}\n", fr.name, fr.pc));
        }
        out.push_str(&format!("{}: {}", self.kind, self.message));
        out
    }
}

impl fmt::Display for EvalException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A runtime error as routed by the interpreter.
#[derive(Debug, Clone)]
pub enum RunError {
    /// An error the catch table may handle.
    Exc(Box<EvalException>),
    /// Cancellation and resource errors delivered through cancellation;
    /// the catch lookup skips these.
    Uncatchable(Box<EvalException>),
    /// A broken invariant inside the interpreter itself; fatal.
    Internal(String),
}

impl RunError {
    fn exc(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Exc(Box::new(EvalException::new(kind, message)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Type, message)
    }

    pub fn name_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Name, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Value, message)
    }

    pub fn mutation_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Mutation, message)
    }

    pub fn recursion_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Recursion, message)
    }

    pub fn load_error(message: impl Into<String>) -> Self {
        Self::exc(ErrorKind::Load, message)
    }

    pub fn cancelled(reason: &str) -> Self {
        Self::Uncatchable(Box::new(EvalException::new(
            ErrorKind::Cancelled,
            format!("evaluation cancelled: {reason}"),
        )))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The message as shown to the user, without backtrace.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Exc(e) | Self::Uncatchable(e) => &e.message,
            Self::Internal(m) => m,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Exc(e) | Self::Uncatchable(e) => e.kind,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Attaches a backtrace if the error does not already carry one.
    ///
    /// The innermost capture wins; outer frames re-wrapping the same error
    /// leave it untouched.
    #[must_use]
    pub fn with_frames(self, frames: impl FnOnce() -> Vec<StackFrame>) -> Self {
        match self {
            Self::Exc(mut e) => {
                if e.frames.is_empty() {
                    e.frames = frames();
                }
                Self::Exc(e)
            }
            Self::Uncatchable(mut e) => {
                if e.frames.is_empty() {
                    e.frames = frames();
                }
                Self::Uncatchable(e)
            }
            other => other,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RunError {}

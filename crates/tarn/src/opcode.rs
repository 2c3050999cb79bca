//! Opcode definitions for the bytecode VM.
//!
//! Bytecode is stored as raw `Vec<u8>`. The `Opcode` enum is a pure
//! discriminant with no data - the optional argument is fetched separately
//! from the byte stream.
//!
//! # Argument Encoding
//!
//! Opcodes with a discriminant at or above [`Opcode::ARG_MIN`] carry exactly
//! one unsigned argument, encoded as a little-endian base-128 varint: seven
//! payload bits per byte, high bit set on every byte except the last.

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Opcode discriminant - just identifies the instruction type.
///
/// The argument (if any) follows in the bytecode stream and is fetched
/// separately. With `#[repr(u8)]`, each opcode is exactly 1 byte. Uses
/// `strum::FromRepr` for efficient byte-to-opcode conversion and
/// `EnumString`/`IntoStaticStr` for the assembler's textual names.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Opcode {
    // === Stack operations (no argument) ===
    /// No operation.
    Nop,
    /// Duplicate top of stack.
    Dup,
    /// Duplicate top two: [a, b] -> [a, b, a, b].
    Dup2,
    /// Discard top of stack.
    Pop,
    /// Swap top two: [a, b] -> [b, a].
    Exch,

    // === Comparisons (pop two, push Bool) ===
    Eql,
    Neq,
    Gt,
    Lt,
    Le,
    Ge,

    // === Binary operations (pop two, push result) ===
    Plus,
    Minus,
    Star,
    Slash,
    Slashslash,
    Percent,
    Amp,
    Pipe,
    Circumflex,
    Ltlt,
    Gtgt,
    /// Membership: x in y.
    In,

    // === Unary operations (replace top of stack) ===
    Uplus,
    Uminus,
    Tilde,
    /// Logical negation of the truth value.
    Not,

    // === Fused in-place operations ===
    /// x += y; extends a list in place when y is iterable, else falls back
    /// to PLUS.
    InplaceAdd,
    /// x |= y; merges a dict in place when both are dicts, else falls back
    /// to PIPE.
    InplacePipe,

    // === Constants ===
    /// Push None.
    None,
    /// Push True.
    True,
    /// Push False.
    False,
    /// Push the sentinel marking a required keyword-only parameter.
    Mandatory,

    // === Iteration ===
    /// Pop an iterable and open an iterator over it.
    Iterpush,
    /// Close the innermost open iterator.
    Iterpop,

    /// Return the value on top of the stack from the current call.
    Return,

    // === Indexing ===
    /// x[y] = z: pop value, index, object.
    Setindex,
    /// x[y]: pop index and object, push element.
    Index,

    // === Composite builders (no argument) ===
    /// dict[k] = v: pop value, key, dict (dict is left in place below them).
    Setdict,
    /// Like SETDICT but fails on a duplicate key.
    Setdictuniq,
    /// Append the top of stack to the list beneath it.
    Append,
    /// x[lo:hi:step]: pop step, hi, lo, object; push slice.
    Slice,
    /// Push a fresh empty dict.
    Makedict,

    // === Deferred execution ===
    /// Mark the next control transfer as one that must first run deferred
    /// blocks.
    Rundefer,
    /// Exit of a defer body: chain into the next deferred block or perform
    /// the pending action.
    Deferexit,

    // === Opcodes from here on carry one varint argument ===
    /// Unconditional jump to the argument address.
    Jmp,
    /// Pop; jump to the argument address if truthy.
    Cjmp,
    /// If the innermost iterator is exhausted jump to the argument address,
    /// else push the next value.
    Iterjmp,
    /// Push constant by pool index.
    Constant,
    /// Pop n values, push a tuple of them.
    Maketuple,
    /// Pop n values, push a list of them.
    Makelist,
    /// Pop a tuple of defaults+freevar cells, push a function closing over
    /// the funcode at the argument index.
    Makefunc,
    /// Pop a module name and n load-names, replace the names with the loaded
    /// values.
    Load,
    /// Pop into the local slot at the argument index.
    Setlocal,
    /// Pop into the cell held in the local slot at the argument index.
    Setlocalcell,
    /// Pop into the module global at the argument index.
    Setglobal,
    /// Push the local at the argument index.
    Local,
    /// Push the content of the cell held in the local at the argument index.
    Localcell,
    /// Push the free variable (always a cell) at the argument index.
    Free,
    /// Push the content of the free-variable cell at the argument index.
    Freecell,
    /// Push the module global at the argument index.
    Global,
    /// Push the predeclared name at the argument index into Names.
    Predeclared,
    /// Push the universal name at the argument index into Names.
    Universal,
    /// x.name: pop object, push attribute value; name indexed into Names.
    Attr,
    /// x.name = y: pop value and object; name indexed into Names.
    Setfield,
    /// Pop an iterable and push exactly n elements, first element on top.
    Unpack,
    /// Call with packed argument (npos<<8)|nkvpairs.
    Call,
    /// Like CALL with an *args sequence on top of the stack.
    CallVar,
    /// Like CALL with a **kwargs mapping on top of the stack.
    CallKw,
    /// Like CALL with *args then **kwargs on top of the stack.
    CallVarKw,
    /// Exit of a catch body: clear the caught error, then jump to the
    /// argument address (0 means return None from the function).
    Catchjmp,
}

impl Opcode {
    /// First opcode that carries a varint argument; every opcode at or above
    /// this discriminant has exactly one argument, every opcode below has
    /// none.
    pub const ARG_MIN: Opcode = Opcode::Jmp;

    /// Reports whether this opcode carries an argument.
    #[inline]
    #[must_use]
    pub fn has_arg(self) -> bool {
        self as u8 >= Self::ARG_MIN as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(InvalidOpcodeError(byte))
    }
}

/// Error returned when attempting to convert an invalid byte to an Opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcodeError(pub u8);

impl std::fmt::Display for InvalidOpcodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid opcode byte: {}", self.0)
    }
}

impl std::error::Error for InvalidOpcodeError {}

/// Appends one instruction to `code`.
///
/// The argument is ignored for opcodes below [`Opcode::ARG_MIN`].
pub fn encode_insn(code: &mut Vec<u8>, op: Opcode, arg: u32) {
    code.push(op as u8);
    if op.has_arg() {
        let mut v = arg;
        while v >= 0x80 {
            code.push((v as u8 & 0x7f) | 0x80);
            v >>= 7;
        }
        code.push(v as u8);
    }
}

/// Decodes the varint argument starting at `pc`, returning the argument and
/// the pc of the next instruction.
///
/// Fails when the encoding runs past the end of `code` or does not fit in 32
/// bits.
pub fn decode_arg(code: &[u8], mut pc: usize) -> Result<(u32, usize), InvalidArgError> {
    let mut arg: u32 = 0;
    let mut shift = 0u32;
    loop {
        if shift >= 32 {
            return Err(InvalidArgError);
        }
        let Some(&b) = code.get(pc) else {
            return Err(InvalidArgError);
        };
        pc += 1;
        arg |= u32::from(b & 0x7f) << shift;
        if b < 0x80 {
            return Ok((arg, pc));
        }
        shift += 7;
    }
}

/// Error returned when a varint argument is truncated or over-long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidArgError;

impl std::fmt::Display for InvalidArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid uvarint argument")
    }
}

impl std::error::Error for InvalidArgError {}

/// Returns the set of program counters that begin an instruction.
///
/// Fails on an invalid opcode byte or a malformed argument.
pub(crate) fn instruction_starts(code: &[u8]) -> Result<Vec<u32>, String> {
    let mut starts = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        starts.push(pc as u32);
        let op = Opcode::try_from(code[pc]).map_err(|e| e.to_string())?;
        pc += 1;
        if op.has_arg() {
            let (_, next) = decode_arg(code, pc).map_err(|e| e.to_string())?;
            pc = next;
        }
    }
    Ok(starts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_byte_roundtrip() {
        for byte in 0..=Opcode::Catchjmp as u8 {
            let opcode = Opcode::try_from(byte).unwrap();
            assert_eq!(opcode as u8, byte, "opcode {opcode:?} has wrong discriminant");
        }
    }

    #[test]
    fn invalid_opcode_byte() {
        assert!(Opcode::try_from(Opcode::Catchjmp as u8 + 1).is_err());
        assert!(Opcode::try_from(255u8).is_err());
    }

    #[test]
    fn opcode_is_one_byte() {
        assert_eq!(std::mem::size_of::<Opcode>(), 1);
    }

    #[test]
    fn arg_presence_split() {
        assert!(!Opcode::Nop.has_arg());
        assert!(!Opcode::Deferexit.has_arg());
        assert!(Opcode::Jmp.has_arg());
        assert!(Opcode::Catchjmp.has_arg());
    }

    #[test]
    fn textual_names() {
        assert_eq!(<&'static str>::from(Opcode::InplaceAdd), "INPLACE_ADD");
        assert_eq!(<&'static str>::from(Opcode::CallVarKw), "CALL_VAR_KW");
        assert_eq!(<&'static str>::from(Opcode::Slashslash), "SLASHSLASH");
        assert_eq!("iterjmp".parse::<Opcode>().unwrap(), Opcode::Iterjmp);
        assert_eq!("CATCHJMP".parse::<Opcode>().unwrap(), Opcode::Catchjmp);
        assert!("frobnicate".parse::<Opcode>().is_err());
    }

    #[test]
    fn varint_roundtrip() {
        for arg in [0u32, 1, 0x7f, 0x80, 0x3fff, 0x4000, u32::MAX] {
            let mut code = Vec::new();
            encode_insn(&mut code, Opcode::Jmp, arg);
            let (decoded, next) = decode_arg(&code, 1).unwrap();
            assert_eq!(decoded, arg);
            assert_eq!(next, code.len());
        }
    }

    #[test]
    fn varint_overlong_rejected() {
        // Six continuation bytes exceed the 32-bit argument space.
        let code = [Opcode::Jmp as u8, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert!(decode_arg(&code, 1).is_err());
    }

    #[test]
    fn starts_cover_arguments() {
        let mut code = Vec::new();
        encode_insn(&mut code, Opcode::Nop, 0);
        encode_insn(&mut code, Opcode::Jmp, 300); // two-byte argument
        encode_insn(&mut code, Opcode::Return, 0);
        assert_eq!(instruction_starts(&code).unwrap(), vec![0, 1, 4]);
    }
}

//! Textual assembly and disassembly of compiled programs.
//!
//! The format is line-oriented, whitespace-tolerant and comment-aware (`#`
//! to end of line); section order is fixed. It exists so the VM can be
//! exercised without a parser and resolver in front of it:
//!
//! ```text
//! program: +recursion            # flags may be set (+) or unset (-)
//!   loads:                       # optional, module names for LOAD
//!     math
//!   names:                       # optional, ATTR/PREDECLARED/UNIVERSAL names
//!     fail
//!   globals:                     # optional, module globals by index
//!     x  # 0
//!   constants:                   # optional, typed constant pool
//!     string "abc"
//!     int    1234
//!     float  1.34
//!     bigint 99999999999999999999
//!     bytes  "xyz"
//!
//!   function: Top 4 0 0 +varargs # name, max stack, params, kwonly params
//!     locals:                    # optional sections, in this order
//!       x
//!     cells:
//!       x
//!     freevars:
//!       y
//!     catches:                   # pc0 pc1 startpc
//!       10 20 5
//!     defers:
//!       10 20 5
//!     code:                      # required
//!       NOP
//!       JMP 3
//! ```
//!
//! The first `function:` is the program's top-level function. Disassembly is
//! the exact inverse: `assemble(disassemble(p))` reproduces `p`.

use std::fmt;

use num_bigint::BigInt;

use crate::opcode::{encode_insn, instruction_starts, Opcode};
use crate::program::{Binding, Constant, DeferBlock, Funcode, Program};
use crate::quote::{quote_bytes, quote_str, unquote};

/// An assembly or disassembly failure; the message names the offending
/// section or value.
#[derive(Debug)]
pub struct AsmError {
    message: String,
}

impl AsmError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AsmError {}

type AsmResult<T> = Result<T, AsmError>;

const SECTIONS: &[&str] = &[
    "program:",
    "loads:",
    "names:",
    "globals:",
    "constants:",
    "function:",
    "locals:",
    "cells:",
    "freevars:",
    "catches:",
    "defers:",
    "code:",
];

fn is_section(word: &str) -> bool {
    SECTIONS.iter().any(|s| word.eq_ignore_ascii_case(s))
}

/// Loads a compiled program from its assembler textual format.
///
/// No partial program is ever returned: any syntactic or semantic error
/// fails the whole assembly.
pub fn assemble(src: &str) -> Result<Program, AsmError> {
    let lines: Vec<Vec<&str>> = src
        .lines()
        .map(|line| {
            line.split_whitespace()
                .take_while(|field| !field.starts_with('#'))
                .collect::<Vec<&str>>()
        })
        .filter(|fields| !fields.is_empty())
        .collect();

    let mut asm = Assembler {
        lines,
        pos: 0,
        program: Program::default(),
        have_toplevel: false,
    };
    asm.program()?;
    asm.loads()?;
    asm.names()?;
    asm.globals()?;
    asm.constants()?;
    while asm.at_section("function:") {
        asm.function()?;
    }
    if let Some(fields) = asm.peek() {
        return Err(AsmError::new(format!("unexpected section: {}", fields[0])));
    }
    if !asm.have_toplevel {
        return Err(AsmError::new("missing top-level function"));
    }
    Ok(asm.program)
}

struct Assembler<'a> {
    lines: Vec<Vec<&'a str>>,
    pos: usize,
    program: Program,
    have_toplevel: bool,
}

impl<'a> Assembler<'a> {
    fn peek(&self) -> Option<&[&'a str]> {
        self.lines.get(self.pos).map(Vec::as_slice)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_section(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|fields| fields[0].eq_ignore_ascii_case(keyword))
    }

    /// Iterates the entry lines of the current section; the closure sees
    /// the fields of each non-section line.
    fn section_entries(&mut self, mut f: impl FnMut(&[&'a str], &mut Program) -> AsmResult<()>) -> AsmResult<()> {
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            let fields: Vec<&str> = fields.to_vec();
            f(&fields, &mut self.program)?;
            self.advance();
        }
        Ok(())
    }

    fn program(&mut self) -> AsmResult<()> {
        let Some(fields) = self.peek() else {
            return Err(AsmError::new("expected program section"));
        };
        if !fields[0].eq_ignore_ascii_case("program:") {
            return Err(AsmError::new(format!(
                "expected program section, found {}",
                fields[0]
            )));
        }
        self.program.recursion = option(&fields[1..], "recursion");
        self.advance();
        Ok(())
    }

    fn loads(&mut self) -> AsmResult<()> {
        if !self.at_section("loads:") {
            return Ok(());
        }
        self.section_entries(|fields, p| {
            p.loads.push(Binding::new(fields[0]));
            Ok(())
        })
    }

    fn names(&mut self) -> AsmResult<()> {
        if !self.at_section("names:") {
            return Ok(());
        }
        self.section_entries(|fields, p| {
            p.names.push(fields[0].to_owned());
            Ok(())
        })
    }

    fn globals(&mut self) -> AsmResult<()> {
        if !self.at_section("globals:") {
            return Ok(());
        }
        self.section_entries(|fields, p| {
            p.globals.push(Binding::new(fields[0]));
            Ok(())
        })
    }

    fn constants(&mut self) -> AsmResult<()> {
        if !self.at_section("constants:") {
            return Ok(());
        }
        self.section_entries(|fields, p| {
            if fields.len() != 2 {
                return Err(AsmError::new(format!(
                    "invalid constant: expected type and value, got {} fields",
                    fields.len()
                )));
            }
            let c = match fields[0] {
                "int" => Constant::Int(parse_i64(fields[1])?),
                "float" => Constant::Float(
                    fields[1]
                        .parse::<f64>()
                        .map_err(|e| AsmError::new(format!("invalid float: {}: {e}", fields[1])))?,
                ),
                "bigint" => Constant::BigInt(
                    BigInt::parse_bytes(fields[1].as_bytes(), 10)
                        .ok_or_else(|| AsmError::new(format!("invalid bigint: {}", fields[1])))?,
                ),
                "string" => {
                    let bytes = unquote(fields[1])
                        .map_err(|e| AsmError::new(format!("invalid string: {}: {e}", fields[1])))?;
                    Constant::Str(String::from_utf8(bytes).map_err(|_| {
                        AsmError::new(format!("invalid string: {}: not valid UTF-8", fields[1]))
                    })?)
                }
                "bytes" => Constant::Bytes(
                    unquote(fields[1])
                        .map_err(|e| AsmError::new(format!("invalid bytes: {}: {e}", fields[1])))?,
                ),
                other => return Err(AsmError::new(format!("invalid constant type: {other}"))),
            };
            p.constants.push(c);
            Ok(())
        })
    }

    fn function(&mut self) -> AsmResult<()> {
        let fields: Vec<&str> = self.peek().expect("checked by caller").to_vec();
        if fields.len() < 5 {
            return Err(AsmError::new(format!(
                "invalid function: want at least 5 fields: \
                 'function: NAME <stack> <params> <kwparams> [+varargs +kwargs]', got {} fields ({})",
                fields.len(),
                fields.join(" ")
            )));
        }
        let mut fc = Funcode {
            name: fields[1].to_owned(),
            max_stack: parse_i64(fields[2])? as u32,
            num_params: parse_i64(fields[3])? as u32,
            num_kwonly_params: parse_i64(fields[4])? as u32,
            has_varargs: option(&fields[5..], "varargs"),
            has_kwargs: option(&fields[5..], "kwargs"),
            ..Funcode::default()
        };
        self.advance();

        self.fn_locals(&mut fc)?;
        self.fn_cells(&mut fc)?;
        self.fn_freevars(&mut fc)?;
        self.fn_blocks(&mut fc, "catches:")?;
        self.fn_blocks(&mut fc, "defers:")?;
        self.fn_code(&mut fc)?;
        validate_funcode(&fc)?;

        if self.have_toplevel {
            self.program.functions.push(fc);
        } else {
            self.program.toplevel = fc;
            self.have_toplevel = true;
        }
        Ok(())
    }

    fn fn_locals(&mut self, fc: &mut Funcode) -> AsmResult<()> {
        if !self.at_section("locals:") {
            return Ok(());
        }
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            fc.locals.push(Binding::new(fields[0]));
            self.advance();
        }
        Ok(())
    }

    fn fn_cells(&mut self, fc: &mut Funcode) -> AsmResult<()> {
        if !self.at_section("cells:") {
            return Ok(());
        }
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            let name = fields[0];
            match fc.locals.iter().position(|b| b.name == name) {
                Some(i) => fc.cells.push(i as u32),
                None => {
                    return Err(AsmError::new(format!(
                        "invalid cell: {name:?} is not an existing local"
                    )));
                }
            }
            self.advance();
        }
        Ok(())
    }

    fn fn_freevars(&mut self, fc: &mut Funcode) -> AsmResult<()> {
        if !self.at_section("freevars:") {
            return Ok(());
        }
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            fc.freevars.push(Binding::new(fields[0]));
            self.advance();
        }
        Ok(())
    }

    fn fn_blocks(&mut self, fc: &mut Funcode, keyword: &str) -> AsmResult<()> {
        if !self.at_section(keyword) {
            return Ok(());
        }
        let what = keyword.trim_end_matches("es:").trim_end_matches("s:");
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            if fields.len() != 3 {
                return Err(AsmError::new(format!(
                    "invalid {what}: expected pc0, pc1 and startpc, got {} fields",
                    fields.len()
                )));
            }
            let block = DeferBlock {
                pc0: parse_u32(fields[0])?,
                pc1: parse_u32(fields[1])?,
                start_pc: parse_u32(fields[2])?,
            };
            if keyword == "catches:" {
                fc.catches.push(block);
            } else {
                fc.defers.push(block);
            }
            self.advance();
        }
        Ok(())
    }

    fn fn_code(&mut self, fc: &mut Funcode) -> AsmResult<()> {
        if !self.at_section("code:") {
            let found = self
                .peek()
                .map(|fields| format!(", found {}", fields[0]))
                .unwrap_or_default();
            return Err(AsmError::new(format!("expected code section{found}")));
        }
        self.advance();
        while let Some(fields) = self.peek() {
            if is_section(fields[0]) {
                break;
            }
            let op: Opcode = fields[0]
                .parse()
                .map_err(|_| AsmError::new(format!("invalid opcode: {}", fields[0])))?;
            let mut arg = 0u32;
            if op.has_arg() {
                if fields.len() != 2 {
                    return Err(AsmError::new(format!(
                        "expected an argument for opcode {}, got {} fields",
                        fields[0],
                        fields.len()
                    )));
                }
                arg = parse_u32(fields[1])?;
            } else if fields.len() != 1 {
                return Err(AsmError::new(format!(
                    "expected no argument for opcode {}, got {} fields",
                    fields[0],
                    fields.len()
                )));
            }
            encode_insn(&mut fc.code, op, arg);
            self.advance();
        }
        Ok(())
    }
}

/// Scans option fields for `+name` (set) or `-name` (explicitly unset).
fn option(fields: &[&str], name: &str) -> bool {
    for field in fields {
        if field.strip_prefix('+') == Some(name) {
            return true;
        }
        if field.strip_prefix('-') == Some(name) {
            break;
        }
    }
    false
}

fn parse_i64(s: &str) -> AsmResult<i64> {
    s.parse::<i64>()
        .map_err(|e| AsmError::new(format!("invalid integer: {s}: {e}")))
}

fn parse_u32(s: &str) -> AsmResult<u32> {
    s.parse::<u32>()
        .map_err(|e| AsmError::new(format!("invalid unsigned integer: {s}: {e}")))
}

/// Validates jump targets and defer/catch descriptors against instruction
/// boundaries.
fn validate_funcode(fc: &Funcode) -> AsmResult<()> {
    let starts = instruction_starts(&fc.code).map_err(AsmError::new)?;
    let is_start = |pc: u32| starts.binary_search(&pc).is_ok();

    let mut pc = 0usize;
    while pc < fc.code.len() {
        let op = Opcode::try_from(fc.code[pc]).expect("validated by instruction_starts");
        pc += 1;
        if op.has_arg() {
            let (arg, next) = crate::opcode::decode_arg(&fc.code, pc).expect("validated by instruction_starts");
            pc = next;
            let is_jump = matches!(op, Opcode::Jmp | Opcode::Cjmp | Opcode::Iterjmp | Opcode::Catchjmp);
            if is_jump && !is_start(arg) && !(op == Opcode::Catchjmp && arg == 0) {
                return Err(AsmError::new(format!("invalid jump index {arg}")));
            }
        }
    }

    for (what, blocks) in [("catch", &fc.catches), ("defer", &fc.defers)] {
        for b in blocks {
            if !is_start(b.pc0) {
                return Err(AsmError::new(format!("invalid PC0 index {}", b.pc0)));
            }
            if !is_start(b.pc1) {
                return Err(AsmError::new(format!("invalid PC1 index {}", b.pc1)));
            }
            if b.pc0 >= b.pc1 {
                return Err(AsmError::new(format!(
                    "invalid {what}: PC0 {} not below PC1 {}",
                    b.pc0, b.pc1
                )));
            }
            if !is_start(b.start_pc) {
                return Err(AsmError::new(format!("invalid StartPC index {}", b.start_pc)));
            }
            if b.covers(i64::from(b.start_pc)) {
                return Err(AsmError::new(format!(
                    "invalid StartPC index {}: inside covered range",
                    b.start_pc
                )));
            }
        }
    }
    Ok(())
}

/// Writes a compiled program to its assembler textual format.
pub fn disassemble(program: &Program) -> Result<String, AsmError> {
    let mut out = String::new();
    out.push_str("program:");
    if program.recursion {
        out.push_str(" +recursion");
    }
    out.push('\n');

    write_name_section(&mut out, "loads:", program.loads.iter().map(|b| b.name.as_str()));
    write_name_section(&mut out, "names:", program.names.iter().map(String::as_str));
    write_name_section(&mut out, "globals:", program.globals.iter().map(|b| b.name.as_str()));
    if !program.constants.is_empty() {
        out.push_str("  constants:\n");
        for c in &program.constants {
            let line = match c {
                Constant::Int(i) => format!("int {i}"),
                Constant::BigInt(b) => format!("bigint {b}"),
                Constant::Float(f) => format!("float {f}"),
                Constant::Str(s) => format!("string {}", quote_str(s)),
                Constant::Bytes(b) => format!("bytes {}", quote_bytes(b)),
            };
            out.push_str(&format!("    {line}\n"));
        }
    }

    write_funcode(&mut out, &program.toplevel)?;
    for fc in &program.functions {
        write_funcode(&mut out, fc)?;
    }
    Ok(out)
}

fn write_name_section<'a>(out: &mut String, keyword: &str, names: impl Iterator<Item = &'a str>) {
    let mut wrote_header = false;
    for name in names {
        if !wrote_header {
            out.push_str(&format!("  {keyword}\n"));
            wrote_header = true;
        }
        out.push_str(&format!("    {name}\n"));
    }
}

fn write_funcode(out: &mut String, fc: &Funcode) -> AsmResult<()> {
    let starts = instruction_starts(&fc.code).map_err(AsmError::new)?;
    let is_start = |pc: u32| starts.binary_search(&pc).is_ok();

    for (what, blocks) in [("catch", &fc.catches), ("defer", &fc.defers)] {
        for b in blocks {
            if !is_start(b.pc0) {
                return Err(AsmError::new(format!("invalid {what}.pc0 address {}", b.pc0)));
            }
            if !is_start(b.pc1) {
                return Err(AsmError::new(format!("invalid {what}.pc1 address {}", b.pc1)));
            }
            if !is_start(b.start_pc) {
                return Err(AsmError::new(format!(
                    "invalid {what}.startpc address {}",
                    b.start_pc
                )));
            }
        }
    }

    out.push('\n');
    out.push_str(&format!(
        "  function: {} {} {} {}",
        fc.name, fc.max_stack, fc.num_params, fc.num_kwonly_params
    ));
    if fc.has_varargs {
        out.push_str(" +varargs");
    }
    if fc.has_kwargs {
        out.push_str(" +kwargs");
    }
    out.push('\n');

    write_name_section(out, "locals:", fc.locals.iter().map(|b| b.name.as_str()));
    if !fc.cells.is_empty() {
        out.push_str("    cells:\n");
        for &i in &fc.cells {
            let name = fc
                .locals
                .get(i as usize)
                .map(|b| b.name.as_str())
                .ok_or_else(|| AsmError::new(format!("invalid cell index {i}")))?;
            out.push_str(&format!("      {name}\n"));
        }
    }
    write_name_section(out, "freevars:", fc.freevars.iter().map(|b| b.name.as_str()));
    for (keyword, blocks) in [("catches:", &fc.catches), ("defers:", &fc.defers)] {
        if !blocks.is_empty() {
            out.push_str(&format!("    {keyword}\n"));
            for b in blocks {
                out.push_str(&format!("      {} {} {}\n", b.pc0, b.pc1, b.start_pc));
            }
        }
    }

    out.push_str("    code:\n");
    let mut pc = 0usize;
    while pc < fc.code.len() {
        let op = Opcode::try_from(fc.code[pc]).map_err(|e| AsmError::new(e.to_string()))?;
        pc += 1;
        let name: &'static str = op.into();
        if op.has_arg() {
            let (arg, next) = crate::opcode::decode_arg(&fc.code, pc).map_err(|e| AsmError::new(e.to_string()))?;
            pc = next;
            let is_jump = matches!(op, Opcode::Jmp | Opcode::Cjmp | Opcode::Iterjmp | Opcode::Catchjmp);
            if is_jump && !is_start(arg) && !(op == Opcode::Catchjmp && arg == 0) {
                return Err(AsmError::new(format!("invalid jump address {arg}")));
            }
            out.push_str(&format!("      {name} {arg}\n"));
        } else {
            out.push_str(&format!("      {name}\n"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The assembler's error table; each case is (description, input,
    /// expected error substring), empty substring meaning success.
    #[test]
    fn assemble_error_table() {
        let cases: &[(&str, &str, &str)] = &[
            ("empty", "", "expected program section"),
            ("not program", "function:", "expected program section"),
            ("program only", "program: foo bar +baz", "missing top-level function"),
            (
                "invalid function",
                "
program:
  function: MissingNumArgs
    code:
",
                "invalid function: want at least 5 fields",
            ),
            (
                "minimally valid",
                "
program:
  function: Top 0 0 0
    code:
",
                "",
            ),
            (
                "missing code",
                "
program:
  function: Top 0 0 0
",
                "expected code section",
            ),
            (
                "missing code followed by function",
                "
program:
  function: Top 0 0 0
  function: Top 0 0 0
    code:
",
                "expected code section",
            ),
            (
                "extra unknown section",
                "
program:
  function: Top 0 0 0
    code:
locals:
",
                "unexpected section: locals:",
            ),
            (
                "invalid opcode",
                "
program:
  function: Top 0 0 0
    code:
      foobar
",
                "invalid opcode: foobar",
            ),
            (
                "missing opcode arg",
                "
program:
  function: Top 0 0 0
    code:
      JMP
",
                "expected an argument for opcode JMP",
            ),
            (
                "extra opcode arg",
                "
program:
  function: Top 0 0 0
    code:
      JMP 1 2
",
                "expected an argument for opcode JMP, got 3 fields",
            ),
            (
                "unexpected opcode arg",
                "
program:
  function: Top 0 0 0
    code:
      NOP 1
",
                "expected no argument for opcode NOP",
            ),
            (
                "invalid jump address",
                "
program:
  function: Top 0 0 0
    code:
      NOP
      JMP 2
",
                "invalid jump index 2",
            ),
            (
                "invalid catch number of fields",
                "
program:
  function: Top 0 0 0
    catches:
      1
    code:
      NOP
",
                "invalid catch",
            ),
            (
                "invalid catch not an integer",
                "
program:
  function: Top 0 0 0
    catches:
      a b c
    code:
      NOP
",
                "invalid unsigned integer",
            ),
            (
                "invalid catch address pc0",
                "
program:
  function: Top 0 0 0
    catches:
      1 2 3
    code:
      NOP
",
                "invalid PC0 index 1",
            ),
            (
                "invalid catch address pc1",
                "
program:
  function: Top 0 0 0
    catches:
      0 2 3
    code:
      NOP
",
                "invalid PC1 index 2",
            ),
            (
                "invalid catch address startpc",
                "
program:
  function: Top 0 0 0
    catches:
      0 2 3
    code:
      NOP
      NOP
      NOP
",
                "invalid StartPC index 3",
            ),
            (
                "invalid cell",
                "
program:
  function: Top 0 0 0
    locals:
      x
      y
    cells:
      z
",
                "invalid cell",
            ),
            (
                "invalid constant number of fields",
                "
program:
  constants:
    123
",
                "invalid constant: expected type and value",
            ),
            (
                "invalid constant type",
                "
program:
  constants:
    foo 123
",
                "invalid constant type",
            ),
            (
                "invalid integer constant",
                "
program:
  constants:
    int abc
",
                "invalid integer",
            ),
            (
                "invalid float constant",
                "
program:
  constants:
    float abc
",
                "invalid float",
            ),
            (
                "invalid bigint constant",
                "
program:
  constants:
    bigint abc
",
                "invalid bigint",
            ),
            (
                "invalid string constant",
                "
program:
  constants:
    string \"a'
",
                "invalid string",
            ),
            (
                "invalid bytes constant",
                "
program:
  constants:
    bytes \"\\x0\"
",
                "invalid bytes",
            ),
            (
                "maximally valid",
                r#"
program: +recursion
  loads:
    math
    json
  names:
    name
    age
  globals:
    env
  constants:
    string "abc"
    int 1234
    float 3.1415
    bigint 98765432109876543210
    bytes "xyz"

  function: Top 1 0 0 +varargs
    locals:
      z
    cells:
      z
    code:
      NOP

  function: Nested 2 1 1 +kwargs
    locals:
      x
      y
    cells:
      x
    freevars:
      z
    catches:
      2 3 1
    code:
      TRUE
      DUP
      FALSE
      NOP
      JMP 1

  function: Defer 2 1 1 +varargs
    locals:
      x
    defers:
      2 3 1
    code:
      TRUE
      DUP
      FALSE
      NOP
      JMP 1
"#,
                "",
            ),
        ];

        for &(desc, input, want_err) in cases {
            let result = assemble(input);
            if want_err.is_empty() {
                assert!(result.is_ok(), "{desc}: unexpected error: {}", result.unwrap_err());
            } else {
                let err = result.expect_err(desc).to_string();
                assert!(
                    err.contains(want_err),
                    "{desc}: error {err:?} does not contain {want_err:?}"
                );
            }
        }
    }

    #[test]
    fn disassemble_error_table() {
        // Over-long varint argument.
        let p = Program {
            toplevel: Funcode {
                code: vec![Opcode::Jmp as u8, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00],
                ..Funcode::default()
            },
            ..Program::default()
        };
        let err = disassemble(&p).unwrap_err().to_string();
        assert!(err.contains("invalid uvarint argument"), "got {err:?}");

        // Catch pc0 pointing past the end of the code.
        let p = Program {
            toplevel: Funcode {
                code: vec![Opcode::Nop as u8, Opcode::Nop as u8],
                catches: vec![DeferBlock { pc0: 2, pc1: 3, start_pc: 0 }],
                ..Funcode::default()
            },
            ..Program::default()
        };
        let err = disassemble(&p).unwrap_err().to_string();
        assert!(err.contains("invalid catch.pc0 address"), "got {err:?}");

        // Catch pc1 inside an instruction argument.
        let p = Program {
            toplevel: Funcode {
                code: vec![Opcode::Jmp as u8, 0x03, Opcode::Nop as u8, Opcode::Nop as u8],
                catches: vec![DeferBlock { pc0: 0, pc1: 1, start_pc: 3 }],
                ..Funcode::default()
            },
            ..Program::default()
        };
        let err = disassemble(&p).unwrap_err().to_string();
        assert!(err.contains("invalid catch.pc1 address"), "got {err:?}");

        // Catch startpc inside an instruction argument.
        let p = Program {
            toplevel: Funcode {
                code: vec![Opcode::Jmp as u8, 0x03, Opcode::Nop as u8, Opcode::Nop as u8],
                catches: vec![DeferBlock { pc0: 0, pc1: 3, start_pc: 1 }],
                ..Funcode::default()
            },
            ..Program::default()
        };
        let err = disassemble(&p).unwrap_err().to_string();
        assert!(err.contains("invalid catch.startpc address"), "got {err:?}");

        // Jump into the middle of an instruction.
        let p = Program {
            toplevel: Funcode {
                code: vec![Opcode::Jmp as u8, 0x01, Opcode::Nop as u8],
                ..Funcode::default()
            },
            ..Program::default()
        };
        let err = disassemble(&p).unwrap_err().to_string();
        assert!(err.contains("invalid jump address"), "got {err:?}");

        // Valid code with a catch descriptor round-trips.
        let p = Program {
            toplevel: Funcode {
                code: vec![
                    Opcode::Nop as u8,
                    Opcode::Jmp as u8,
                    0x03,
                    Opcode::Nop as u8,
                ],
                catches: vec![DeferBlock { pc0: 1, pc1: 3, start_pc: 0 }],
                ..Funcode::default()
            },
            ..Program::default()
        };
        assert!(disassemble(&p).is_ok());
    }

    #[test]
    fn roundtrip_maximal_program() {
        let src = r#"
program: +recursion
  loads:
    math
  names:
    fail
  globals:
    x
    y
  constants:
    string "a b" # unreachable via fields, but quoted forms without spaces work
    int -5
    float 2.5
    bigint 98765432109876543210
    bytes "\x00\xff"

  function: Top 3 0 0
    locals:
      i
    code:
      NONE
      RETURN

  function: helper 2 2 1 +varargs +kwargs
    locals:
      a
      opt
      args
      kwargs
    cells:
      a
    freevars:
      outer
    catches:
      0 1 3
    defers:
      0 1 3
    code:
      TRUE
      CJMP 3
      NONE
      RETURN
"#;
        // "a b" splits on whitespace, so swap it for a space-free literal.
        let src = src.replace("\"a b\"", "\"a_b\"");
        let p = assemble(&src).unwrap();
        assert!(p.recursion);
        assert_eq!(p.functions.len(), 1);

        let text = disassemble(&p).unwrap();
        let p2 = assemble(&text).unwrap();
        assert_eq!(p, p2, "disassembly did not round-trip:\n{text}");
    }

    #[test]
    fn roundtrip_starts_from_disassembly() {
        let p = Program {
            recursion: false,
            toplevel: Funcode {
                name: "Top".to_owned(),
                max_stack: 1,
                code: {
                    let mut code = Vec::new();
                    encode_insn(&mut code, Opcode::None, 0);
                    encode_insn(&mut code, Opcode::Return, 0);
                    code
                },
                ..Funcode::default()
            },
            ..Program::default()
        };
        let text = disassemble(&p).unwrap();
        let p2 = assemble(&text).unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn case_insensitive_sections_and_opcodes() {
        let src = "
PROGRAM:
  FUNCTION: Top 0 0 0
    CODE:
      nop
";
        assert!(assemble(src).is_ok());
    }

    #[test]
    fn comments_are_stripped() {
        let src = "
# leading comment
program:    # trailing comment
  globals:
    x # 0
  function: Top 1 0 0
    code:
      NONE  # push None
      RETURN
";
        let p = assemble(src).unwrap();
        assert_eq!(p.globals.len(), 1);
        assert_eq!(p.globals[0].name, "x");
    }
}

//! End-to-end tests: assemble literal programs and execute them.

use std::sync::Arc;

use tarn::{as_int32, assemble, BuiltinDef, Program, RunError, RunResult, StringDict, Thread, Value};

fn exec(src: &str) -> Result<(StringDict, Thread), RunError> {
    exec_with(src, StringDict::new(), |_| {})
}

fn exec_with(
    src: &str,
    predeclared: StringDict,
    configure: impl FnOnce(&mut Thread),
) -> Result<(StringDict, Thread), RunError> {
    let program = Arc::new(assemble(src).expect("assembly failed"));
    let mut thread = Thread::new();
    configure(&mut thread);
    match Program::init(&program, &mut thread, predeclared) {
        Ok(globals) => Ok((globals, thread)),
        Err(e) => Err(e),
    }
}

fn int_global(globals: &StringDict, thread: &Thread, name: &str) -> i64 {
    let v = *globals.get(name).unwrap_or_else(|| panic!("global {name} not set"));
    i64::from(as_int32(v, thread.heap()).expect("int global"))
}

#[test]
fn minimal_toplevel_returns_none() {
    // An empty top-level body runs to completion with no error.
    let (globals, _) = exec(
        "
program:
  function: Top 0 0 0
    code:
",
    )
    .unwrap();
    assert!(globals.is_empty());
}

#[test]
fn arithmetic_to_global() {
    let (globals, thread) = exec(
        "
program:
  globals:
    result
  constants:
    int 40
    int 2
  function: Top 2 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      PLUS
      SETGLOBAL 0
      NONE
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "result"), 42);
}

#[test]
fn bigint_constant_arithmetic() {
    let (globals, thread) = exec(
        "
program:
  globals:
    result
  constants:
    bigint 18446744073709551616
    int 1
  function: Top 2 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      PLUS
      SETGLOBAL 0
      NONE
      RETURN
",
    )
    .unwrap();
    let v = *globals.get("result").unwrap();
    assert_eq!(thread.heap().repr(v), "18446744073709551617");
}

#[test]
fn catch_recovers_error() {
    // Top-level calls fn() which evaluates 1 + "a"; the catch block sets
    // result = 2 and returns None.
    let (globals, thread) = exec(
        "
program:
  globals:
    result
  constants:
    int 1
    string \"a\"
    int 2
  function: Top 2 0 0
    catches:
      4 6 9
    code:
      MAKETUPLE 0    # 0
      MAKEFUNC 0     # 2
      CALL 0         # 4
      POP            # 6
      NONE           # 7
      RETURN         # 8
      CONSTANT 2     # 9: catch body
      SETGLOBAL 0    # 11
      CATCHJMP 0     # 13
  function: fn 2 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      PLUS
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "result"), 2);
}

#[test]
fn uncaught_error_after_catch_returns() {
    // The first failure is caught; the catch jumps to code past the covered
    // range which fails again, this time uncaught.
    let err = exec(
        "
program:
  globals:
    result
  constants:
    int 1
    string \"a\"
    int 2
  function: Top 2 0 0
    catches:
      0 4 7
    code:
      CONSTANT 0     # 0
      CONSTANT 1     # 2
      PLUS           # 4: caught
      NONE           # 5
      RETURN         # 6
      CONSTANT 2     # 7: catch body
      SETGLOBAL 0    # 9
      CATCHJMP 13    # 11
      CONSTANT 0     # 13
      CONSTANT 1     # 15
      PLUS           # 17: uncaught
      NONE           # 18
      RETURN         # 19
",
    )
    .unwrap_err();
    assert!(
        err.message().contains("unknown binary op: int + string"),
        "got {:?}",
        err.message()
    );
}

#[test]
fn recursion_disabled_fails() {
    let src = "
program:
  globals:
    f
  function: Top 2 0 0
    code:
      MAKETUPLE 0
      MAKEFUNC 0
      SETGLOBAL 0
      GLOBAL 0
      CALL 0
      POP
      NONE
      RETURN
  function: f 2 0 0
    code:
      GLOBAL 0
      CALL 0
      RETURN
";
    let err = exec(src).unwrap_err();
    assert!(err.message().contains("called recursively"), "got {:?}", err.message());
}

#[test]
fn recursion_enabled_runs_to_budget() {
    let src = "
program: +recursion
  globals:
    f
  function: Top 2 0 0
    code:
      MAKETUPLE 0
      MAKEFUNC 0
      SETGLOBAL 0
      GLOBAL 0
      CALL 0
      POP
      NONE
      RETURN
  function: f 2 0 0
    code:
      GLOBAL 0
      CALL 0
      RETURN
";
    let err = exec_with(src, StringDict::new(), |t| t.set_max_steps(300)).unwrap_err();
    assert!(matches!(err, RunError::Uncatchable(_)));
    assert!(err.message().contains("too many steps"), "got {:?}", err.message());
}

fn freeze_builtin(thread: &mut Thread, args: &[Value], _kwargs: &[(Value, Value)]) -> RunResult<Value> {
    thread.heap_mut().freeze(args[0]);
    Ok(Value::None)
}

static FREEZE: BuiltinDef = BuiltinDef {
    name: "freeze",
    func: freeze_builtin,
};

#[test]
fn frozen_list_rejects_append() {
    let mut predeclared = StringDict::new();
    predeclared.insert("freeze".to_owned(), Value::Builtin(&FREEZE));
    let err = exec_with(
        "
program:
  globals:
    l
  names:
    freeze
  constants:
    int 1
  function: Top 2 0 0
    code:
      MAKELIST 0
      SETGLOBAL 0
      PREDECLARED 0
      GLOBAL 0
      CALL 256
      POP
      GLOBAL 0
      CONSTANT 0
      APPEND
      NONE
      RETURN
",
        predeclared,
        |_| {},
    )
    .unwrap_err();
    assert!(err.message().contains("frozen"), "got {:?}", err.message());
}

#[test]
fn frozen_list_rejects_setindex() {
    let mut predeclared = StringDict::new();
    predeclared.insert("freeze".to_owned(), Value::Builtin(&FREEZE));
    let err = exec_with(
        "
program:
  globals:
    l
  names:
    freeze
  constants:
    int 1
    int 0
  function: Top 3 0 0
    code:
      CONSTANT 0
      MAKELIST 1
      SETGLOBAL 0
      PREDECLARED 0
      GLOBAL 0
      CALL 256
      POP
      GLOBAL 0
      CONSTANT 1
      CONSTANT 0
      SETINDEX
      NONE
      RETURN
",
        predeclared,
        |_| {},
    )
    .unwrap_err();
    assert!(err.message().contains("frozen"), "got {:?}", err.message());
}

#[test]
fn iteration_sums_list() {
    let (globals, thread) = exec(
        "
program:
  globals:
    total
  constants:
    int 0
    int 1
    int 2
    int 3
  function: Top 4 0 0
    code:
      CONSTANT 0     # 0
      SETGLOBAL 0    # 2
      CONSTANT 1     # 4
      CONSTANT 2     # 6
      CONSTANT 3     # 8
      MAKELIST 3     # 10
      ITERPUSH       # 12
      ITERJMP 22     # 13
      GLOBAL 0       # 15
      PLUS           # 17
      SETGLOBAL 0    # 18
      JMP 13         # 20
      ITERPOP        # 22
      NONE           # 23
      RETURN         # 24
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "total"), 6);
}

#[test]
fn mutation_during_iteration_fails() {
    let err = exec(
        "
program:
  globals:
    l
  constants:
    int 1
  function: Top 3 0 0
    code:
      CONSTANT 0     # 0
      MAKELIST 1     # 2
      DUP            # 4
      SETGLOBAL 0    # 5
      ITERPUSH       # 7
      ITERJMP 18     # 8
      POP            # 10
      GLOBAL 0       # 11
      CONSTANT 0     # 13
      APPEND         # 15
      JMP 8          # 16
      ITERPOP        # 18
      NONE           # 19
      RETURN         # 20
",
    )
    .unwrap_err();
    assert!(
        err.message().contains("during iteration"),
        "got {:?}",
        err.message()
    );
}

#[test]
fn closure_shares_cell_with_enclosing_scope() {
    let (globals, thread) = exec(
        "
program:
  globals:
    r1
    r2
  constants:
    int 10
    int 1
    int 20
  function: Top 3 0 0
    locals:
      x
    cells:
      x
    code:
      CONSTANT 0       # 0
      SETLOCALCELL 0   # 2
      LOCAL 0          # 4: the cell itself
      MAKETUPLE 1      # 6
      MAKEFUNC 0       # 8
      DUP              # 10
      CALL 0           # 11
      SETGLOBAL 0      # 13
      CONSTANT 2       # 15
      SETLOCALCELL 0   # 17
      CALL 0           # 19
      SETGLOBAL 1      # 21
      NONE             # 23
      RETURN           # 24
  function: inc 2 0 0
    freevars:
      x
    code:
      FREECELL 0
      CONSTANT 1
      PLUS
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "r1"), 11);
    assert_eq!(int_global(&globals, &thread, "r2"), 21);
}

#[test]
fn defaults_and_keyword_arguments() {
    // f(a, b=5) with b keyword-only: f(1) == 6, f(2, b=10) == 12.
    let (globals, thread) = exec(
        "
program:
  globals:
    r1
    r2
  constants:
    int 5
    int 1
    int 2
    int 10
    string \"b\"
  function: Top 4 0 0
    code:
      CONSTANT 0       # 0
      MAKETUPLE 1      # 2
      MAKEFUNC 0       # 4
      DUP              # 6
      CONSTANT 1       # 7
      CALL 256         # 9
      SETGLOBAL 0      # 12
      CONSTANT 2       # 14
      CONSTANT 4       # 16
      CONSTANT 3       # 18
      CALL 257         # 20
      SETGLOBAL 1      # 23
      NONE             # 25
      RETURN           # 26
  function: f 2 2 1
    locals:
      a
      b
    code:
      LOCAL 0
      LOCAL 1
      PLUS
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "r1"), 6);
    assert_eq!(int_global(&globals, &thread, "r2"), 12);
}

#[test]
fn unpack_assigns_in_order() {
    let (globals, thread) = exec(
        "
program:
  globals:
    a
    b
  constants:
    int 1
    int 2
  function: Top 2 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      MAKELIST 2
      UNPACK 2
      SETGLOBAL 0
      SETGLOBAL 1
      NONE
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "a"), 1);
    assert_eq!(int_global(&globals, &thread, "b"), 2);
}

#[test]
fn unpack_arity_errors() {
    let err = exec(
        "
program:
  constants:
    int 1
    int 2
  function: Top 3 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      MAKELIST 2
      UNPACK 3
      POP
      POP
      POP
      NONE
      RETURN
",
    )
    .unwrap_err();
    assert!(
        err.message().contains("too few values to unpack (got 2, want 3)"),
        "got {:?}",
        err.message()
    );
}

#[test]
fn dict_literal_duplicate_key_fails() {
    let err = exec(
        "
program:
  constants:
    string \"k\"
    int 1
    int 2
  function: Top 4 0 0
    code:
      MAKEDICT
      DUP
      CONSTANT 0
      CONSTANT 1
      SETDICTUNIQ
      DUP
      CONSTANT 0
      CONSTANT 2
      SETDICTUNIQ
      POP
      NONE
      RETURN
",
    )
    .unwrap_err();
    assert!(err.message().contains("duplicate key"), "got {:?}", err.message());
}

#[test]
fn dict_index_reads_back() {
    let (globals, thread) = exec(
        "
program:
  globals:
    r
  constants:
    string \"k\"
    int 7
  function: Top 4 0 0
    code:
      MAKEDICT
      DUP
      CONSTANT 0
      CONSTANT 1
      SETDICT
      CONSTANT 0
      INDEX
      SETGLOBAL 0
      NONE
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "r"), 7);
}

#[test]
fn load_hook_resolves_names() {
    let (globals, thread) = exec_with(
        "
program:
  loads:
    m
  globals:
    r
  constants:
    string \"m\"
    string \"answer\"
  function: Top 2 0 0
    code:
      CONSTANT 1
      CONSTANT 0
      LOAD 1
      SETGLOBAL 0
      NONE
      RETURN
",
        StringDict::new(),
        |t| {
            t.set_load(|_, module| {
                assert_eq!(module, "m");
                let mut out = StringDict::new();
                out.insert("answer".to_owned(), Value::Int(42));
                Ok(out)
            });
        },
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "r"), 42);
}

#[test]
fn load_unknown_name_suggests_nearest() {
    let err = exec_with(
        "
program:
  loads:
    m
  globals:
    r
  constants:
    string \"m\"
    string \"anwser\"
  function: Top 2 0 0
    code:
      CONSTANT 1
      CONSTANT 0
      LOAD 1
      SETGLOBAL 0
      NONE
      RETURN
",
        StringDict::new(),
        |t| {
            t.set_load(|_, _| {
                let mut out = StringDict::new();
                out.insert("answer".to_owned(), Value::Int(42));
                Ok(out)
            });
        },
    )
    .unwrap_err();
    assert!(
        err.message().contains("name anwser not found in module m"),
        "got {:?}",
        err.message()
    );
    assert!(err.message().contains("did you mean answer?"), "got {:?}", err.message());
}

#[test]
fn load_without_hook_fails() {
    let err = exec(
        "
program:
  constants:
    string \"m\"
    string \"x\"
  function: Top 2 0 0
    code:
      CONSTANT 1
      CONSTANT 0
      LOAD 1
      POP
      NONE
      RETURN
",
    )
    .unwrap_err();
    assert!(
        err.message().contains("load not implemented by this application"),
        "got {:?}",
        err.message()
    );
}

#[test]
fn step_budget_cancels_thread() {
    let err = exec_with(
        "
program:
  function: Top 0 0 0
    code:
      JMP 0
",
        StringDict::new(),
        |t| t.set_max_steps(100),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Uncatchable(_)));
    assert!(err.message().contains("too many steps"), "got {:?}", err.message());
}

#[test]
fn max_steps_hook_overrides_cancel() {
    let err = exec_with(
        "
program:
  function: Top 0 0 0
    code:
      JMP 0
",
        StringDict::new(),
        |t| {
            t.set_max_steps(100);
            t.set_on_max_steps(|t| t.cancel("budget spent"));
        },
    )
    .unwrap_err();
    assert!(err.message().contains("budget spent"), "got {:?}", err.message());
}

#[test]
fn cancellation_skips_catch_blocks() {
    // The catch covers the looping pc, but cancellation is uncatchable.
    let err = exec_with(
        "
program:
  function: Top 0 0 0
    catches:
      0 1 3
    code:
      NOP           # 0
      JMP 1         # 1
      CATCHJMP 0    # 3
",
        StringDict::new(),
        |t| t.set_max_steps(50),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Uncatchable(_)));
}

#[test]
fn universal_builtin_len() {
    let (globals, thread) = exec(
        "
program:
  globals:
    n
  names:
    len
  constants:
    int 1
    int 2
  function: Top 3 0 0
    code:
      UNIVERSAL 0
      CONSTANT 0
      CONSTANT 1
      MAKELIST 2
      CALL 256
      SETGLOBAL 0
      NONE
      RETURN
",
    )
    .unwrap();
    assert_eq!(int_global(&globals, &thread, "n"), 2);
}

#[test]
fn uncaught_error_carries_backtrace() {
    let err = exec(
        "
program:
  constants:
    int 1
    string \"a\"
  function: Top 2 0 0
    code:
      MAKETUPLE 0
      MAKEFUNC 0
      CALL 0
      POP
      NONE
      RETURN
  function: boom 2 0 0
    code:
      CONSTANT 0
      CONSTANT 1
      PLUS
      RETURN
",
    )
    .unwrap_err();
    let RunError::Exc(exc) = err else { panic!("expected catchable error") };
    let names: Vec<&str> = exc.frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["boom", "Top"]);
    assert!(exc.backtrace().contains("type: unknown binary op: int + string"));
}

//! End-to-end scenarios: a handful of complete programs, each run both
//! through the tree-walking interpreter and through the full
//! compile-and-link-and-execute pipeline, checked for agreement.
//!
//! Programs used for the compiled/interpreted agreement checks stick to
//! a single implicit trailing print (no explicit `print_int`/
//! `print_bool` calls inside the program body): the interpreter prints
//! its side effects straight to this test process's real stdout, which
//! isn't capturable in-process, so comparing `interpret`'s *return
//! value* against the compiled binary's captured stdout is the part
//! that's actually checked here.

use std::io::Write;
use std::process::{Command, Stdio};
use velac::interpreter::Value;
use velac::{CompileError, VelaConfig};

fn compile_and_run(source: &str, stdin: Option<&str>) -> String {
    let dir = tempfile::tempdir().unwrap();
    let exe_path = dir.path().join("out");
    let config = VelaConfig::new().with_output(&exe_path);
    velac::compile_to_executable(source, "test.vl", &config).expect("compilation should succeed");

    let mut child = Command::new(&exe_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("compiled binary should run");
    if let Some(input) = stdin {
        child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "compiled binary exited with {}", output.status);
    String::from_utf8(output.stdout).unwrap()
}

/// What the compiled binary's implicit trailing print would write for
/// this value, matching `velac`'s own `print_final_value`.
fn expected_stdout(value: &Value) -> String {
    match value {
        Value::Int(v) => format!("{v}\n"),
        Value::Bool(v) => format!("{v}\n"),
        Value::Unit | Value::Pointer(_) => String::new(),
    }
}

fn assert_interpret_and_compile_agree(source: &str) {
    let value = velac::interpret(source, "test.vl").expect("interpretation should succeed");
    let compiled_stdout = compile_and_run(source, None);
    assert_eq!(compiled_stdout, expected_stdout(&value));
}

#[test]
fn arithmetic_with_operator_precedence() {
    assert_interpret_and_compile_agree("2 + 3 * 4 - 1");
}

#[test]
fn comparison_and_boolean_operators() {
    assert_interpret_and_compile_agree("(1 < 2) and (3 >= 3)");
}

#[test]
fn recursive_function() {
    assert_interpret_and_compile_agree(
        "fun fact(n: Int): Int { if n == 0 then 1 else n * fact(n - 1) }\nfact(6)",
    );
}

#[test]
fn mutual_recursion() {
    assert_interpret_and_compile_agree(
        "fun is_even(n: Int): Bool { if n == 0 then true else is_odd(n - 1) }\n\
         fun is_odd(n: Int): Bool { if n == 0 then false else is_even(n - 1) }\n\
         is_even(17)",
    );
}

#[test]
fn while_loop_with_break_and_continue() {
    assert_interpret_and_compile_agree(
        r#"
        var sum: Int = 0;
        var i: Int = 0;
        while i < 10 do {
            i = i + 1;
            if i == 7 then { break };
            if i % 2 == 0 then { continue };
            sum = sum + i
        };
        sum
        "#,
    );
}

#[test]
fn pointer_write_is_visible_through_an_alias() {
    assert_interpret_and_compile_agree("var x: Int = 1; var p: Int* = &x; *p = 41; x + 1");
}

#[test]
fn read_int_is_wired_to_stdin_in_the_compiled_binary() {
    let stdout = compile_and_run("print_int(read_int() + 1)", Some("41\n"));
    assert_eq!(stdout, "42\n");
}

#[test]
fn a_lexical_error_is_rejected_before_parsing() {
    let err = velac::interpret("1 + @", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Lexical { .. }));
}

#[test]
fn a_syntax_error_is_rejected_before_typechecking() {
    let err = velac::interpret("1 +", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
}

#[test]
fn a_type_mismatch_is_rejected_before_running() {
    let err = velac::interpret("1 + true", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}

#[test]
fn break_outside_any_loop_is_rejected_at_runtime() {
    let err = velac::interpret("break", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}

#[test]
fn dividing_by_zero_is_rejected_at_runtime_rather_than_trapping() {
    let err = velac::interpret("1 / 0", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}

#[test]
fn wrong_arity_call_is_rejected_before_running() {
    let err = velac::interpret("fun add(a: Int, b: Int): Int { a + b }\nadd(1)", "test.vl").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}

//! Runtime support for compiled Vela executables.
//!
//! The compiler never calls into this crate directly. It emits `callq`
//! instructions targeting the three symbols below and leaves it to the
//! system linker to resolve them against this staticlib. Keeping the
//! runtime this small means the ABI contract in the compiler's assembly
//! generator (see `vela_compiler::codegen::intrinsics`) has exactly three
//! external dependencies to stay honest about.

use std::io::{self, Read, Write};

/// `print_int(i64)`: writes the decimal value followed by a newline.
///
/// # Safety
/// Called only from compiler-generated code with an `i64` in `%rdi`,
/// matching the System V calling convention this function is declared
/// `extern "C"` under.
#[unsafe(no_mangle)]
pub extern "C" fn print_int(value: i64) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{value}");
}

/// `print_bool(i64)`: non-zero prints `true`, zero prints `false`.
#[unsafe(no_mangle)]
pub extern "C" fn print_bool(value: i64) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", value != 0);
}

/// `read_int() -> i64`: reads one line from stdin and parses a decimal integer.
///
/// Panics (aborting the process) if stdin is closed or the line is not a
/// valid integer; the source language has no way to recover from this at
/// the call site, so there is nothing useful to return instead.
#[unsafe(no_mangle)]
pub extern "C" fn read_int() -> i64 {
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .expect("read_int: failed to read from stdin");
    line.trim().parse::<i64>().unwrap_or_else(|e| {
        panic!("read_int: {:?} is not a valid integer: {e}", line.trim())
    })
}

/// Drains and discards the rest of stdin. Not part of the language ABI;
/// exists so integration tests can feed multiple `read_int` calls from a
/// single buffer without worrying about trailing bytes.
#[doc(hidden)]
pub fn drain_stdin_for_tests() {
    let mut sink = Vec::new();
    let _ = io::stdin().read_to_end(&mut sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_bool_formats_nonzero_as_true() {
        // Smoke test only: the real contract is stdout content, which
        // integration tests in the compiler crate verify end to end by
        // linking and running compiled programs.
        print_bool(1);
        print_bool(0);
        print_int(42);
    }
}

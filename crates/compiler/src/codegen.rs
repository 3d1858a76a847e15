//! Lowers three-address IR to x86-64 AT&T assembly under the System V
//! AMD64 calling convention.
//!
//! Every IR variable gets its own stack slot — there is no register
//! allocation, deliberately: the instruction selection below moves
//! everything through `%rax`/`%rcx` and writes straight back to memory,
//! which keeps each instruction's emission rule a fixed, local template
//! at the cost of speed nobody asked this compiler to have.

use crate::builtins;
use crate::error::CompileResult;
use crate::ir::{FunctionIr, Instruction, Variable};
use std::collections::HashSet;
use std::fmt::Write as _;

const PARAM_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

pub fn generate_assembly(functions: &FunctionIr) -> CompileResult<String> {
    let mut out = String::new();
    writeln!(out, ".extern print_int").ok();
    writeln!(out, ".extern print_bool").ok();
    writeln!(out, ".extern read_int").ok();
    for (name, _) in functions {
        writeln!(out, ".global {name}").ok();
        writeln!(out, ".type {name}, @function").ok();
    }
    writeln!(out, "\n.text\n").ok();

    for (name, instructions) in functions {
        out.push_str(&generate_function(name, instructions)?);
        out.push('\n');
    }
    Ok(out)
}

/// Assigns each non-global IR variable its own `-8k(%rbp)` slot, in
/// first-seen order.
struct Locals {
    slots: std::collections::HashMap<String, i64>,
    frame_size: i64,
}

impl Locals {
    fn new(vars: &[Variable]) -> Self {
        let mut slots = std::collections::HashMap::new();
        let mut offset = -8i64;
        for v in vars {
            slots.entry(v.0.clone()).or_insert_with(|| {
                let this = offset;
                offset -= 8;
                this
            });
        }
        let frame_size = -offset - 8;
        Locals { slots, frame_size }
    }

    fn slot(&self, v: &Variable) -> String {
        let offset = self.slots.get(&v.0).unwrap_or_else(|| {
            panic!("variable '{}' was never collected into the locals table", v.0)
        });
        format!("{offset}(%rbp)")
    }
}

fn collect_locals(instructions: &[Instruction]) -> Vec<Variable> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for instr in instructions {
        for v in instr.referenced_vars() {
            if builtins::is_global(&v.0) {
                continue;
            }
            if seen.insert(v.0.clone()) {
                order.push(v.clone());
            }
        }
    }
    order
}

fn generate_function(name: &str, instructions: &[Instruction]) -> String {
    let locals_vars = collect_locals(instructions);
    let locals = Locals::new(&locals_vars);

    let mut lines = Vec::new();
    lines.push(format!("{name}:"));
    lines.push("    pushq %rbp".to_string());
    lines.push("    movq %rsp, %rbp".to_string());
    if locals.frame_size > 0 {
        lines.push(format!("    subq ${}, %rsp", locals.frame_size));
    }

    let mut param_index = 0usize;
    for instr in instructions {
        emit_instruction(name, instr, &locals, &mut lines, &mut param_index);
    }

    lines.push(String::new());
    lines.join("\n")
}

fn qualify_label(func: &str, label: &str) -> String {
    format!(".L{func}_{label}")
}

fn emit_instruction(
    func: &str,
    instr: &Instruction,
    locals: &Locals,
    lines: &mut Vec<String>,
    param_index: &mut usize,
) {
    match instr {
        Instruction::Label { name, .. } => lines.push(format!("{}:", qualify_label(func, name))),
        Instruction::LoadBoolConst { value, dest, .. } => {
            lines.push(format!("    movq ${}, {}", if *value { 1 } else { 0 }, locals.slot(dest)));
        }
        Instruction::LoadIntConst { value, dest, .. } => {
            if (i32::MIN as i64..=i32::MAX as i64).contains(value) {
                lines.push(format!("    movq ${value}, {}", locals.slot(dest)));
            } else {
                lines.push(format!("    movabsq ${value}, %rax"));
                lines.push(format!("    movq %rax, {}", locals.slot(dest)));
            }
        }
        Instruction::Copy { source, dest, .. } => {
            lines.push(format!("    movq {}, %rax", locals.slot(source)));
            lines.push(format!("    movq %rax, {}", locals.slot(dest)));
        }
        Instruction::CopyPointer { source, dest, .. } => {
            lines.push(format!("    movq {}, %rax", locals.slot(source)));
            lines.push(format!("    movq {}, %rbx", locals.slot(dest)));
            lines.push("    movq %rax, (%rbx)".to_string());
        }
        Instruction::Jump { label, .. } => lines.push(format!("    jmp {}", qualify_label(func, label))),
        Instruction::CondJump {
            cond,
            then_label,
            else_label,
            ..
        } => {
            lines.push(format!("    cmpq $0, {}", locals.slot(cond)));
            lines.push(format!("    jne {}", qualify_label(func, then_label)));
            lines.push(format!("    jmp {}", qualify_label(func, else_label)));
        }
        Instruction::LoadIntParam { dest, .. }
        | Instruction::LoadBoolParam { dest, .. }
        | Instruction::LoadPointerParam { dest, .. } => {
            emit_param_load(*param_index, dest, locals, lines);
            *param_index += 1;
        }
        Instruction::Call { fun, args, dest, .. } => emit_call(fun, args, dest, locals, lines),
        Instruction::ReturnValue { var, .. } => {
            if func == "main" {
                lines.push("    movq $0, %rax".to_string());
            } else {
                lines.push(format!("    movq {}, %rax", locals.slot(var)));
            }
            lines.push("    movq %rbp, %rsp".to_string());
            lines.push("    popq %rbp".to_string());
            lines.push("    ret".to_string());
        }
    }
}

fn emit_param_load(index: usize, dest: &Variable, locals: &Locals, lines: &mut Vec<String>) {
    if index < PARAM_REGS.len() {
        lines.push(format!("    movq {}, {}", PARAM_REGS[index], locals.slot(dest)));
    } else {
        let offset = 16 + 8 * (index - PARAM_REGS.len());
        lines.push(format!("    movq {offset}(%rbp), %rax"));
        lines.push(format!("    movq %rax, {}", locals.slot(dest)));
    }
}

fn emit_call(fun: &Variable, args: &[Variable], dest: &Variable, locals: &Locals, lines: &mut Vec<String>) {
    match fun.0.as_str() {
        "+" => binary_arith(locals, args, "addq", lines),
        "-" => binary_arith(locals, args, "subq", lines),
        "*" => binary_arith(locals, args, "imulq", lines),
        "/" => div_mod(locals, args, true, lines),
        "%" => div_mod(locals, args, false, lines),
        "<" => compare(locals, args, "setl", lines),
        "<=" => compare(locals, args, "setle", lines),
        ">" => compare(locals, args, "setg", lines),
        ">=" => compare(locals, args, "setge", lines),
        "==" => compare(locals, args, "sete", lines),
        "!=" => compare(locals, args, "setne", lines),
        "unary_-" => {
            lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
            lines.push("    negq %rax".to_string());
        }
        "unary_not" => {
            lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
            lines.push("    xorq $1, %rax".to_string());
        }
        "unary_&" => lines.push(format!("    leaq {}, %rax", locals.slot(&args[0]))),
        "unary_*" => {
            lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
            lines.push("    movq (%rax), %rax".to_string());
        }
        "print_int" | "print_bool" => {
            lines.push(format!("    movq {}, %rdi", locals.slot(&args[0])));
            lines.push(format!("    callq {}", fun.0));
        }
        "read_int" => lines.push("    callq read_int".to_string()),
        _ => emit_user_call(fun, args, locals, lines),
    }
    lines.push(format!("    movq %rax, {}", locals.slot(dest)));
}

fn binary_arith(locals: &Locals, args: &[Variable], op: &str, lines: &mut Vec<String>) {
    lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
    lines.push(format!("    movq {}, %rcx", locals.slot(&args[1])));
    lines.push(format!("    {op} %rcx, %rax"));
}

fn div_mod(locals: &Locals, args: &[Variable], want_quotient: bool, lines: &mut Vec<String>) {
    lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
    lines.push("    cqto".to_string());
    lines.push(format!("    movq {}, %rcx", locals.slot(&args[1])));
    lines.push("    idivq %rcx".to_string());
    if !want_quotient {
        lines.push("    movq %rdx, %rax".to_string());
    }
}

fn compare(locals: &Locals, args: &[Variable], setcc: &str, lines: &mut Vec<String>) {
    lines.push(format!("    movq {}, %rax", locals.slot(&args[0])));
    lines.push(format!("    movq {}, %rcx", locals.slot(&args[1])));
    lines.push("    cmpq %rcx, %rax".to_string());
    lines.push(format!("    {setcc} %al"));
    lines.push("    movzbq %al, %rax".to_string());
}

fn emit_user_call(fun: &Variable, args: &[Variable], locals: &Locals, lines: &mut Vec<String>) {
    let split = args.len().min(PARAM_REGS.len());
    let (register_args, stack_args) = args.split_at(split);

    for arg in stack_args.iter().rev() {
        lines.push(format!("    movq {}, %rax", locals.slot(arg)));
        lines.push("    pushq %rax".to_string());
    }
    for (reg, arg) in PARAM_REGS.iter().zip(register_args.iter()) {
        lines.push(format!("    movq {}, {}", locals.slot(arg), reg));
    }
    lines.push(format!("    callq {}", fun.0));
    if !stack_args.is_empty() {
        lines.push(format!("    addq ${}, %rsp", 8 * stack_args.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::generate;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::typechecker::typecheck_module;

    fn assemble(source: &str) -> String {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        let ir = generate(&module).unwrap();
        generate_assembly(&ir).unwrap()
    }

    #[test]
    fn main_prologue_and_epilogue_are_present() {
        let asm = assemble("1 + 2");
        assert!(asm.contains("main:"));
        assert!(asm.contains("pushq %rbp"));
        assert!(asm.contains("popq %rbp"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn main_always_returns_zero_regardless_of_the_final_expression() {
        let asm = assemble("1 + 2");
        let main_body = asm.split("main:").nth(1).unwrap();
        assert!(main_body.contains("movq $0, %rax"));
    }

    #[test]
    fn large_int_constants_use_movabsq() {
        let asm = assemble("5000000000");
        assert!(asm.contains("movabsq"));
    }

    #[test]
    fn user_defined_functions_get_their_own_label_and_epilogue() {
        let asm = assemble("fun sq(x: Int): Int { x * x } sq(5)");
        assert!(asm.contains("sq:"));
    }

    #[test]
    fn calls_with_more_than_six_arguments_pass_the_rest_on_the_stack() {
        let asm = assemble(
            "fun sum7(a: Int, b: Int, c: Int, d: Int, e: Int, f: Int, g: Int): Int { a + b }\n\
             sum7(1, 2, 3, 4, 5, 6, 7)",
        );
        assert!(asm.contains("pushq %rax"));
        assert!(asm.contains("addq $8, %rsp"));
    }
}

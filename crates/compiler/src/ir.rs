//! Lowers a typechecked [`Module`] into three-address IR.
//!
//! One instruction list per function, always including `"main"`. Every
//! temporary is a fresh `x<N>` name; `x`, `if`, `while`, `and`, `or`
//! counters are global across the whole module (not reset per function),
//! which is what keeps generated label names unique everywhere a later
//! pass treats them as a single flat namespace — see [`crate::cfg`].
//!
//! `FuncDef` bodies are lowered lazily: encountering one in `main`'s
//! statement list just binds its name and queues the definition, so a
//! function can call another defined later in the same module.

use crate::ast::{
    Argument, BinaryOperator, Expr, LiteralValue, LoopControl, Module, UnaryOperator,
};
use crate::builtins;
use crate::error::{CompileError, CompileResult};
use crate::location::SourceLocation;
use crate::symbol_table::SymbolTable;
use crate::types::Type;
use std::fmt;

/// An IR-level name: either a generated temporary (`x3`), a source-level
/// binding (a parameter or `var` name), or a global (`+`, `print_int`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable(pub String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    /// The distinguished value every `Unit`-typed expression lowers to.
    pub fn unit() -> Self {
        Variable("unit".to_string())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LoadIntConst {
        value: i64,
        dest: Variable,
        location: SourceLocation,
    },
    LoadBoolConst {
        value: bool,
        dest: Variable,
        location: SourceLocation,
    },
    LoadIntParam {
        symbol: Variable,
        dest: Variable,
        location: SourceLocation,
    },
    LoadBoolParam {
        symbol: Variable,
        dest: Variable,
        location: SourceLocation,
    },
    LoadPointerParam {
        symbol: Variable,
        dest: Variable,
        location: SourceLocation,
    },
    Copy {
        source: Variable,
        dest: Variable,
        location: SourceLocation,
    },
    /// Stores `source` through the pointer held in `dest`, i.e. `*dest = source`.
    CopyPointer {
        source: Variable,
        dest: Variable,
        location: SourceLocation,
    },
    Call {
        fun: Variable,
        args: Vec<Variable>,
        dest: Variable,
        location: SourceLocation,
    },
    Jump {
        label: String,
        location: SourceLocation,
    },
    CondJump {
        cond: Variable,
        then_label: String,
        else_label: String,
        location: SourceLocation,
    },
    Label {
        name: String,
        location: SourceLocation,
    },
    ReturnValue {
        var: Variable,
        location: SourceLocation,
    },
}

impl Instruction {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Instruction::LoadIntConst { location, .. }
            | Instruction::LoadBoolConst { location, .. }
            | Instruction::LoadIntParam { location, .. }
            | Instruction::LoadBoolParam { location, .. }
            | Instruction::LoadPointerParam { location, .. }
            | Instruction::Copy { location, .. }
            | Instruction::CopyPointer { location, .. }
            | Instruction::Call { location, .. }
            | Instruction::Jump { location, .. }
            | Instruction::CondJump { location, .. }
            | Instruction::Label { location, .. }
            | Instruction::ReturnValue { location, .. } => location,
        }
    }

    /// The variable this instruction gives a fresh reaching definition
    /// to. `CopyPointer` is deliberately excluded: it writes through the
    /// pointer held in `dest` rather than redefining `dest` itself.
    pub fn defines(&self) -> Option<&Variable> {
        match self {
            Instruction::LoadIntConst { dest, .. }
            | Instruction::LoadBoolConst { dest, .. }
            | Instruction::LoadIntParam { dest, .. }
            | Instruction::LoadBoolParam { dest, .. }
            | Instruction::LoadPointerParam { dest, .. }
            | Instruction::Copy { dest, .. }
            | Instruction::Call { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Every variable this instruction mentions, in field order. Used by
    /// the assembly generator's stack-slot allocator and the dataflow
    /// analysis' variable universe.
    pub fn referenced_vars(&self) -> Vec<&Variable> {
        match self {
            Instruction::LoadIntConst { dest, .. } | Instruction::LoadBoolConst { dest, .. } => {
                vec![dest]
            }
            Instruction::LoadIntParam { symbol, dest, .. }
            | Instruction::LoadBoolParam { symbol, dest, .. }
            | Instruction::LoadPointerParam { symbol, dest, .. } => vec![symbol, dest],
            Instruction::Copy { source, dest, .. } | Instruction::CopyPointer { source, dest, .. } => {
                vec![source, dest]
            }
            Instruction::Call {
                fun, args, dest, ..
            } => {
                let mut vars = vec![fun];
                vars.extend(args.iter());
                vars.push(dest);
                vars
            }
            Instruction::CondJump { cond, .. } => vec![cond],
            Instruction::ReturnValue { var, .. } => vec![var],
            Instruction::Jump { .. } | Instruction::Label { .. } => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadIntConst { value, dest, .. } => {
                write!(f, "{dest} = LoadIntConst({value})")
            }
            Instruction::LoadBoolConst { value, dest, .. } => {
                write!(f, "{dest} = LoadBoolConst({value})")
            }
            Instruction::LoadIntParam { symbol, dest, .. } => {
                write!(f, "{dest} = LoadIntParam({symbol})")
            }
            Instruction::LoadBoolParam { symbol, dest, .. } => {
                write!(f, "{dest} = LoadBoolParam({symbol})")
            }
            Instruction::LoadPointerParam { symbol, dest, .. } => {
                write!(f, "{dest} = LoadPointerParam({symbol})")
            }
            Instruction::Copy { source, dest, .. } => write!(f, "{dest} = Copy({source})"),
            Instruction::CopyPointer { source, dest, .. } => {
                write!(f, "*{dest} = CopyPointer({source})")
            }
            Instruction::Call {
                fun, args, dest, ..
            } => {
                let arg_list = args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{dest} = Call({fun}, [{arg_list}])")
            }
            Instruction::Jump { label, .. } => write!(f, "Jump({label})"),
            Instruction::CondJump {
                cond,
                then_label,
                else_label,
                ..
            } => write!(f, "CondJump({cond}, {then_label}, {else_label})"),
            Instruction::Label { name, .. } => write!(f, "Label({name})"),
            Instruction::ReturnValue { var, .. } => write!(f, "ReturnValue({var})"),
        }
    }
}

/// One entry per function, in generation order (`"main"` first).
pub type FunctionIr = Vec<(String, Vec<Instruction>)>;

pub fn generate(module: &Module) -> CompileResult<FunctionIr> {
    IrGenerator::new().run(module)
}

struct IrGenerator<'a> {
    instructions: Vec<Instruction>,
    symbol_table: SymbolTable<Variable>,
    var_counter: usize,
    if_counter: usize,
    while_counter: usize,
    and_counter: usize,
    or_counter: usize,
    loop_stack: Vec<(String, String)>,
    pending_functions: Vec<&'a Expr>,
}

impl<'a> IrGenerator<'a> {
    fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for name in builtins::GLOBAL_NAMES {
            symbol_table.add_local(name, Variable::new(name));
        }
        IrGenerator {
            instructions: Vec::new(),
            symbol_table,
            var_counter: 0,
            if_counter: 0,
            while_counter: 0,
            and_counter: 0,
            or_counter: 0,
            loop_stack: Vec::new(),
            pending_functions: Vec::new(),
        }
    }

    fn fresh_var(&mut self) -> Variable {
        self.var_counter += 1;
        Variable::new(format!("x{}", self.var_counter))
    }

    fn emit(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    fn lookup(&mut self, name: &str, location: &SourceLocation) -> CompileResult<Variable> {
        self.symbol_table
            .require(name, None)
            .map_err(|e| CompileError::internal(format!("{e} at {location}")))
    }

    fn run(mut self, module: &'a Module) -> CompileResult<FunctionIr> {
        let mut result = Vec::new();

        let start_loc = module
            .expressions
            .first()
            .map(|e| e.location().clone())
            .unwrap_or_else(SourceLocation::sentinel);
        self.emit(Instruction::Label {
            name: "Start_main".to_string(),
            location: start_loc.clone(),
        });

        let (last, init) = module
            .expressions
            .split_last()
            .ok_or_else(|| CompileError::internal("module body is unexpectedly empty"))?;
        for expr in init {
            self.visit(expr)?;
        }
        let final_var = self.visit(last)?;
        match last.ty() {
            Type::Int => {
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun: Variable::new("print_int"),
                    args: vec![final_var],
                    dest,
                    location: last.location().clone(),
                });
            }
            Type::Bool => {
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun: Variable::new("print_bool"),
                    args: vec![final_var],
                    dest,
                    location: last.location().clone(),
                });
            }
            _ => {}
        }
        self.emit(Instruction::ReturnValue {
            var: Variable::new("-1"),
            location: start_loc,
        });
        result.push(("main".to_string(), std::mem::take(&mut self.instructions)));

        for func_expr in std::mem::take(&mut self.pending_functions) {
            let Expr::FuncDef {
                name,
                args,
                body,
                location,
                ..
            } = func_expr
            else {
                return Err(CompileError::internal("queued a non-FuncDef expression"));
            };
            self.instructions.clear();
            self.emit(Instruction::Label {
                name: format!("Start_{name}"),
                location: location.clone(),
            });
            self.symbol_table.push_scope();
            for arg in args {
                self.load_param(arg)?;
            }
            let ret_var = self.visit(body)?;
            self.symbol_table.pop_scope();
            self.emit(Instruction::ReturnValue {
                var: ret_var,
                location: location.clone(),
            });
            result.push((name.clone(), std::mem::take(&mut self.instructions)));
        }

        Ok(result)
    }

    fn load_param(&mut self, arg: &Argument) -> CompileResult<()> {
        let dest = self.fresh_var();
        let symbol = Variable::new(arg.name.clone());
        let instr = match &arg.declared_type {
            Type::Int => Instruction::LoadIntParam {
                symbol: symbol.clone(),
                dest: dest.clone(),
                location: arg.location.clone(),
            },
            Type::Bool => Instruction::LoadBoolParam {
                symbol: symbol.clone(),
                dest: dest.clone(),
                location: arg.location.clone(),
            },
            _ => Instruction::LoadPointerParam {
                symbol: symbol.clone(),
                dest: dest.clone(),
                location: arg.location.clone(),
            },
        };
        self.emit(instr);
        self.symbol_table.add_local(arg.name.clone(), dest);
        Ok(())
    }

    fn visit(&mut self, expr: &'a Expr) -> CompileResult<Variable> {
        match expr {
            Expr::Literal { value, location, .. } => match value {
                LiteralValue::Int(v) => {
                    let dest = self.fresh_var();
                    self.emit(Instruction::LoadIntConst {
                        value: *v,
                        dest: dest.clone(),
                        location: location.clone(),
                    });
                    Ok(dest)
                }
                LiteralValue::Bool(b) => {
                    let dest = self.fresh_var();
                    self.emit(Instruction::LoadBoolConst {
                        value: *b,
                        dest: dest.clone(),
                        location: location.clone(),
                    });
                    Ok(dest)
                }
                LiteralValue::Unit => Ok(Variable::unit()),
            },
            Expr::Identifier { name, location, .. } => self.lookup(name, location),
            Expr::BreakContinue { kind, location, .. } => {
                let (start, end) = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| CompileError::semantic("break/continue outside a loop", location.clone()))?;
                let target = match kind {
                    LoopControl::Break => end,
                    LoopControl::Continue => start,
                };
                self.emit(Instruction::Jump {
                    label: target,
                    location: location.clone(),
                });
                Ok(Variable::unit())
            }
            Expr::FuncDef { name, location: _, .. } => {
                self.symbol_table.add_local(name.clone(), Variable::new(name.clone()));
                self.pending_functions.push(expr);
                Ok(Variable::unit())
            }
            Expr::FuncCall {
                name, args, location, ..
            } => {
                let mut arg_vars = Vec::with_capacity(args.len());
                for a in args {
                    arg_vars.push(self.visit(a)?);
                }
                let fun = self.lookup(name, location)?;
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun,
                    args: arg_vars,
                    dest: dest.clone(),
                    location: location.clone(),
                });
                Ok(dest)
            }
            Expr::UnaryOp { op, right, location, .. } => {
                let arg = self.visit(right)?;
                let fun = self.lookup(op.builtin_name(), location)?;
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun,
                    args: vec![arg],
                    dest: dest.clone(),
                    location: location.clone(),
                });
                Ok(dest)
            }
            Expr::BinaryOp {
                left, op, right, location, ..
            } => self.visit_binary(*op, left, right, location),
            Expr::IfThenElse {
                cond,
                then_branch,
                else_branch,
                location,
                ..
            } => self.visit_if(cond, then_branch, else_branch.as_deref(), location),
            Expr::While { cond, body, location, .. } => self.visit_while(cond, body, location),
            Expr::Var {
                name,
                initialization,
                location,
                ..
            } => {
                let init = self.visit(initialization)?;
                let dest = self.fresh_var();
                self.emit(Instruction::Copy {
                    source: init,
                    dest: dest.clone(),
                    location: location.clone(),
                });
                self.symbol_table.add_local(name.clone(), dest.clone());
                Ok(dest)
            }
            Expr::Block { statements, .. } => {
                self.symbol_table.push_scope();
                let mut last = Variable::unit();
                for stmt in statements {
                    last = self.visit(stmt)?;
                }
                self.symbol_table.pop_scope();
                Ok(last)
            }
        }
    }

    fn visit_binary(
        &mut self,
        op: BinaryOperator,
        left: &'a Expr,
        right: &'a Expr,
        location: &SourceLocation,
    ) -> CompileResult<Variable> {
        match op {
            BinaryOperator::Assign => {
                let right_var = self.visit(right)?;
                match left {
                    Expr::Identifier { name, location: id_loc, .. } => {
                        let dest = self.lookup(name, id_loc)?;
                        self.emit(Instruction::Copy {
                            source: right_var,
                            dest,
                            location: location.clone(),
                        });
                    }
                    Expr::UnaryOp {
                        op: UnaryOperator::Deref,
                        right: target_expr,
                        ..
                    } => {
                        let target = self.visit(target_expr)?;
                        self.emit(Instruction::CopyPointer {
                            source: right_var,
                            dest: target,
                            location: location.clone(),
                        });
                    }
                    _ => {
                        return Err(CompileError::internal(
                            "assignment target should have been rejected by the typechecker",
                        ))
                    }
                }
                Ok(Variable::unit())
            }
            BinaryOperator::And | BinaryOperator::Or => self.visit_short_circuit(op, left, right, location),
            BinaryOperator::Eq | BinaryOperator::Neq => {
                let left_var = self.visit(left)?;
                let right_var = self.visit(right)?;
                let name = if matches!(op, BinaryOperator::Eq) { "==" } else { "!=" };
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun: Variable::new(name),
                    args: vec![left_var, right_var],
                    dest: dest.clone(),
                    location: location.clone(),
                });
                Ok(dest)
            }
            _ => {
                let left_var = self.visit(left)?;
                let right_var = self.visit(right)?;
                let name = op
                    .builtin_name()
                    .expect("Assign/Eq/Neq are handled above; every other operator has a builtin name");
                let fun = self.lookup(name, location)?;
                let dest = self.fresh_var();
                self.emit(Instruction::Call {
                    fun,
                    args: vec![left_var, right_var],
                    dest: dest.clone(),
                    location: location.clone(),
                });
                Ok(dest)
            }
        }
    }

    fn visit_short_circuit(
        &mut self,
        op: BinaryOperator,
        left: &'a Expr,
        right: &'a Expr,
        location: &SourceLocation,
    ) -> CompileResult<Variable> {
        let is_and = matches!(op, BinaryOperator::And);
        let n = if is_and {
            self.and_counter += 1;
            self.and_counter
        } else {
            self.or_counter += 1;
            self.or_counter
        };
        let prefix = if is_and { "and" } else { "or" };
        let right_label = format!("{prefix}_right{n}");
        let skip_label = format!("{prefix}_skip{n}");
        let end_label = format!("{prefix}_end{n}");

        let left_var = self.visit(left)?;
        let (then_label, else_label) = if is_and {
            (right_label.clone(), skip_label.clone())
        } else {
            (skip_label.clone(), right_label.clone())
        };
        self.emit(Instruction::CondJump {
            cond: left_var,
            then_label,
            else_label,
            location: location.clone(),
        });

        self.emit(Instruction::Label {
            name: right_label,
            location: location.clone(),
        });
        let right_var = self.visit(right)?;
        let result = self.fresh_var();
        self.emit(Instruction::Copy {
            source: right_var,
            dest: result.clone(),
            location: location.clone(),
        });
        self.emit(Instruction::Jump {
            label: end_label.clone(),
            location: location.clone(),
        });

        self.emit(Instruction::Label {
            name: skip_label,
            location: location.clone(),
        });
        self.emit(Instruction::LoadBoolConst {
            value: !is_and,
            dest: result.clone(),
            location: location.clone(),
        });
        self.emit(Instruction::Jump {
            label: end_label.clone(),
            location: location.clone(),
        });

        self.emit(Instruction::Label {
            name: end_label,
            location: location.clone(),
        });
        Ok(result)
    }

    fn visit_if(
        &mut self,
        cond: &'a Expr,
        then_branch: &'a Expr,
        else_branch: Option<&'a Expr>,
        location: &SourceLocation,
    ) -> CompileResult<Variable> {
        self.if_counter += 1;
        let n = self.if_counter;
        let then_label = format!("then{n}");
        let end_label = format!("if_end{n}");

        match else_branch {
            None => {
                let cond_var = self.visit(cond)?;
                self.emit(Instruction::CondJump {
                    cond: cond_var,
                    then_label: then_label.clone(),
                    else_label: end_label.clone(),
                    location: location.clone(),
                });
                self.emit(Instruction::Label {
                    name: then_label,
                    location: location.clone(),
                });
                self.visit(then_branch)?;
                self.emit(Instruction::Label {
                    name: end_label,
                    location: location.clone(),
                });
                Ok(Variable::unit())
            }
            Some(else_branch) => {
                let else_label = format!("else{n}");
                let cond_var = self.visit(cond)?;
                self.emit(Instruction::CondJump {
                    cond: cond_var,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                    location: location.clone(),
                });
                self.emit(Instruction::Label {
                    name: then_label,
                    location: location.clone(),
                });
                let result = self.fresh_var();
                let then_var = self.visit(then_branch)?;
                self.emit(Instruction::Copy {
                    source: then_var,
                    dest: result.clone(),
                    location: location.clone(),
                });
                self.emit(Instruction::Jump {
                    label: end_label.clone(),
                    location: location.clone(),
                });
                self.emit(Instruction::Label {
                    name: else_label,
                    location: location.clone(),
                });
                let else_var = self.visit(else_branch)?;
                self.emit(Instruction::Copy {
                    source: else_var,
                    dest: result.clone(),
                    location: location.clone(),
                });
                self.emit(Instruction::Label {
                    name: end_label,
                    location: location.clone(),
                });
                Ok(result)
            }
        }
    }

    fn visit_while(
        &mut self,
        cond: &'a Expr,
        body: &'a Expr,
        location: &SourceLocation,
    ) -> CompileResult<Variable> {
        self.while_counter += 1;
        let n = self.while_counter;
        let start_label = format!("while_start{n}");
        let body_label = format!("while_body{n}");
        let end_label = format!("while_end{n}");

        self.emit(Instruction::Label {
            name: start_label.clone(),
            location: location.clone(),
        });
        let cond_var = self.visit(cond)?;
        self.emit(Instruction::CondJump {
            cond: cond_var,
            then_label: body_label.clone(),
            else_label: end_label.clone(),
            location: location.clone(),
        });
        self.emit(Instruction::Label {
            name: body_label,
            location: location.clone(),
        });
        self.loop_stack.push((start_label.clone(), end_label.clone()));
        let body_result = self.visit(body);
        self.loop_stack.pop();
        body_result?;
        self.emit(Instruction::Jump {
            label: start_label,
            location: location.clone(),
        });
        self.emit(Instruction::Label {
            name: end_label,
            location: location.clone(),
        });
        Ok(Variable::unit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::typechecker::typecheck_module;

    fn lower(source: &str) -> FunctionIr {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        generate(&module).unwrap()
    }

    #[test]
    fn arithmetic_lowers_to_a_single_call_and_an_implicit_print() {
        let ir = lower("1 + 2");
        let main = &ir[0].1;
        assert!(main.iter().any(|i| matches!(i, Instruction::Call{fun, ..} if fun.0 == "+")));
        assert!(main
            .iter()
            .any(|i| matches!(i, Instruction::Call{fun, ..} if fun.0 == "print_int")));
        assert!(matches!(main.last(), Some(Instruction::ReturnValue { .. })));
    }

    #[test]
    fn main_is_always_present_and_first() {
        let ir = lower("42");
        assert_eq!(ir[0].0, "main");
    }

    #[test]
    fn function_definitions_are_deferred_after_main() {
        let ir = lower("fun sq(x: Int): Int { x * x } sq(5)");
        let names: Vec<&str> = ir.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names[0], "main");
        assert!(names.contains(&"sq"));
    }

    #[test]
    fn break_outside_a_loop_is_a_semantic_error() {
        let tokens = tokenize("break", "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        let err = generate(&module).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn and_lowers_with_a_skip_path_that_does_not_evaluate_the_right_side() {
        let ir = lower("true and false");
        let main = &ir[0].1;
        assert!(main.iter().any(|i| matches!(i, Instruction::Label { name, .. } if name == "and_skip1")));
        assert!(main.iter().any(|i| matches!(i, Instruction::Label { name, .. } if name == "and_right1")));
    }

    #[test]
    fn pointer_assignment_lowers_to_copy_pointer() {
        let ir = lower("var x: Int = 1; var p: Int* = &x; *p = 2; x");
        let main = &ir[0].1;
        assert!(main.iter().any(|i| matches!(i, Instruction::CopyPointer { .. })));
    }
}

//! A tree-walking evaluator for the same AST the typed pipeline lowers
//! to assembly.
//!
//! This exists for two reasons: the `interpret` CLI subcommand runs a
//! program without assembling or linking anything, and the integration
//! tests use it as a cross-check oracle — a program is expected to
//! print the same thing whether it's interpreted or compiled and run.
//!
//! Unlike the typechecker and IR generator, this module does not reuse
//! [`builtins::builtin_signature`] as a lookup table of closures; the
//! operators and intrinsics are small enough to match directly, and a
//! closure table would need `Box<dyn Fn>` for little benefit.

use crate::ast::{Argument, BinaryOperator, Expr, LiteralValue, LoopControl, Module, UnaryOperator};
use crate::error::{CompileError, CompileResult};
use crate::location::SourceLocation;
use crate::symbol_table::SymbolTable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// A runtime value. There is no function-value variant: functions are
/// resolved by name through [`Interpreter::functions`], not carried
/// around as closures, matching how the typed pipeline treats them as
/// call targets rather than first-class values.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Unit,
    /// `&x` clones this `Rc`, giving the language's pointers real
    /// aliasing: two pointers to the same variable see each other's
    /// writes through the shared cell.
    Pointer(Rc<RefCell<Value>>),
}

impl Value {
    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn as_pointer(&self) -> Option<&Rc<RefCell<Value>>> {
        match self {
            Value::Pointer(cell) => Some(cell),
            _ => None,
        }
    }

    /// Pointer equality compares cell identity, not pointee value — two
    /// distinct variables that happen to hold equal ints are not the
    /// same pointer.
    fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            (Value::Pointer(a), Value::Pointer(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Unit => write!(f, "()"),
            Value::Pointer(_) => write!(f, "<pointer>"),
        }
    }
}

/// What evaluating one AST node actually produced: a value, or an
/// unwinding `break`/`continue` headed for the nearest enclosing
/// `While`. Threading this through every `eval` call (via the `value!`
/// helper below) is what lets `break`/`continue` appear anywhere in an
/// expression position and still unwind correctly.
enum Signal {
    Value(Value),
    Break,
    Continue,
}

/// Pulls a plain [`Value`] out of evaluating `$expr`, propagating a
/// `Break`/`Continue` signal straight out of the enclosing function
/// instead. Every composite node (blocks, calls, binary ops, ...) needs
/// this so `break` nested arbitrarily deep still reaches its `While`.
macro_rules! value {
    ($self:ident, $expr:expr) => {
        match $self.eval($expr)? {
            Signal::Value(v) => v,
            other => return Ok(other),
        }
    };
}

#[derive(Clone, Copy)]
struct FunctionEntry<'a> {
    args: &'a [Argument],
    body: &'a Expr,
}

pub struct Interpreter<'a> {
    table: SymbolTable<Rc<RefCell<Value>>>,
    functions: HashMap<String, FunctionEntry<'a>>,
    /// Depth of enclosing `While` loops in the *current* call frame.
    /// Reset to zero for the duration of a function call so a `break`
    /// can never unwind past the call that invoked it.
    loop_depth: usize,
}

/// Runs a whole module and returns the value of its last top-level
/// expression, the same value the compiled binary's implicit trailing
/// `print_int`/`print_bool` would print.
pub fn interpret_module(module: &Module) -> CompileResult<Value> {
    let mut interpreter = Interpreter {
        table: SymbolTable::new(),
        functions: HashMap::new(),
        loop_depth: 0,
    };
    interpreter.run(module)
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, module: &'a Module) -> CompileResult<Value> {
        // Pre-register every top-level function before evaluating
        // anything, mirroring the typechecker's two-phase `run`: this is
        // what lets two functions call each other regardless of which
        // one is declared first.
        for expr in &module.expressions {
            if let Expr::FuncDef { name, args, body, .. } = expr {
                self.functions.insert(name.clone(), FunctionEntry { args, body });
            }
        }

        let (last, init) = module
            .expressions
            .split_last()
            .ok_or_else(|| CompileError::internal("module body is unexpectedly empty"))?;
        for expr in init {
            self.require_value(expr)?;
        }
        self.require_value(last)
    }

    /// Evaluates a top-level statement, rejecting a stray `Break`/
    /// `Continue` that reached all the way out here (the `BreakContinue`
    /// arm below already rejects these the moment `loop_depth` is zero,
    /// so this is a defensive backstop, not the primary check).
    fn require_value(&mut self, expr: &'a Expr) -> CompileResult<Value> {
        match self.eval(expr)? {
            Signal::Value(v) => Ok(v),
            Signal::Break | Signal::Continue => {
                Err(CompileError::semantic("break/continue outside a loop", expr.location().clone()))
            }
        }
    }

    fn eval(&mut self, expr: &'a Expr) -> CompileResult<Signal> {
        match expr {
            Expr::Literal { value, .. } => Ok(Signal::Value(match value {
                LiteralValue::Int(v) => Value::Int(*v),
                LiteralValue::Bool(v) => Value::Bool(*v),
                LiteralValue::Unit => Value::Unit,
            })),

            Expr::Identifier { name, location, .. } => {
                let cell = self.lookup_cell(name, location)?;
                Ok(Signal::Value(cell.borrow().clone()))
            }

            Expr::BreakContinue { kind, location, .. } => {
                if self.loop_depth == 0 {
                    return Err(CompileError::semantic("break/continue outside a loop", location.clone()));
                }
                Ok(match kind {
                    LoopControl::Break => Signal::Break,
                    LoopControl::Continue => Signal::Continue,
                })
            }

            Expr::UnaryOp { op, right, location, .. } => self.eval_unary(*op, right, location),

            Expr::BinaryOp { left, op, right, location, .. } => self.eval_binary(*op, left, right, location),

            Expr::IfThenElse {
                cond, then_branch, else_branch, ..
            } => {
                let c = value!(self, cond);
                let cond = c
                    .as_bool()
                    .ok_or_else(|| CompileError::internal("if condition was not a Bool at runtime"))?;
                if cond {
                    self.eval(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch)
                } else {
                    Ok(Signal::Value(Value::Unit))
                }
            }

            Expr::While { cond, body, .. } => self.eval_while(cond, body),

            Expr::Var { name, initialization, .. } => {
                let v = value!(self, initialization);
                let cell = Rc::new(RefCell::new(v.clone()));
                self.table.add_local(name.clone(), cell);
                Ok(Signal::Value(v))
            }

            Expr::Block { statements, .. } => {
                self.table.push_scope();
                let result = self.eval_block_body(statements);
                self.table.pop_scope();
                result
            }

            Expr::FuncCall { name, args, location, .. } => self.eval_call(name, args, location),

            Expr::FuncDef { name, args, body, .. } => {
                // Already pre-registered in `run`; a nested `fun` (one
                // written inside a block rather than at module level)
                // still gets registered here, on first visit.
                self.functions.entry(name.clone()).or_insert(FunctionEntry { args, body });
                Ok(Signal::Value(Value::Unit))
            }
        }
    }

    fn eval_block_body(&mut self, statements: &'a [Expr]) -> CompileResult<Signal> {
        let Some((last, init)) = statements.split_last() else {
            return Ok(Signal::Value(Value::Unit));
        };
        for stmt in init {
            match self.eval(stmt)? {
                Signal::Value(_) => {}
                signal => return Ok(signal),
            }
        }
        self.eval(last)
    }

    /// `While` evaluates to `Unit`, not the value of its last body
    /// execution. The original language this is modeled after returns
    /// the last body value instead, but the typechecker here already
    /// settled on `Unit` for consistency (a loop that might run zero
    /// times has nothing sensible to return), so the interpreter makes
    /// the same choice.
    fn eval_while(&mut self, cond: &'a Expr, body: &'a Expr) -> CompileResult<Signal> {
        self.loop_depth += 1;
        let result = self.run_while_body(cond, body);
        self.loop_depth -= 1;
        result
    }

    fn run_while_body(&mut self, cond: &'a Expr, body: &'a Expr) -> CompileResult<Signal> {
        loop {
            let c = value!(self, cond);
            let cond = c
                .as_bool()
                .ok_or_else(|| CompileError::internal("while condition was not a Bool at runtime"))?;
            if !cond {
                return Ok(Signal::Value(Value::Unit));
            }
            match self.eval(body)? {
                Signal::Value(_) | Signal::Continue => continue,
                Signal::Break => return Ok(Signal::Value(Value::Unit)),
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOperator, right: &'a Expr, location: &SourceLocation) -> CompileResult<Signal> {
        match op {
            UnaryOperator::AddressOf => {
                let Expr::Identifier { name, .. } = right else {
                    return Err(CompileError::internal("'&' applied to a non-identifier at runtime"));
                };
                let cell = self.lookup_cell(name, location)?;
                Ok(Signal::Value(Value::Pointer(cell)))
            }
            UnaryOperator::Deref => {
                let v = value!(self, right);
                let cell = v
                    .as_pointer()
                    .ok_or_else(|| CompileError::internal("dereferenced a non-pointer value"))?;
                Ok(Signal::Value(cell.borrow().clone()))
            }
            UnaryOperator::Neg => {
                let v = value!(self, right);
                let i = v.as_int().ok_or_else(|| CompileError::internal("unary '-' applied to a non-Int"))?;
                Ok(Signal::Value(Value::Int(-i)))
            }
            UnaryOperator::Not => {
                let v = value!(self, right);
                let b = v.as_bool().ok_or_else(|| CompileError::internal("'not' applied to a non-Bool"))?;
                Ok(Signal::Value(Value::Bool(!b)))
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOperator,
        left: &'a Expr,
        right: &'a Expr,
        location: &SourceLocation,
    ) -> CompileResult<Signal> {
        match op {
            BinaryOperator::Assign => self.eval_assign(left, right, location),
            BinaryOperator::And => {
                let l = value!(self, left);
                let lb = l.as_bool().ok_or_else(|| CompileError::internal("'and' applied to a non-Bool"))?;
                if !lb {
                    return Ok(Signal::Value(Value::Bool(false)));
                }
                let r = value!(self, right);
                let rb = r.as_bool().ok_or_else(|| CompileError::internal("'and' applied to a non-Bool"))?;
                Ok(Signal::Value(Value::Bool(rb)))
            }
            BinaryOperator::Or => {
                let l = value!(self, left);
                let lb = l.as_bool().ok_or_else(|| CompileError::internal("'or' applied to a non-Bool"))?;
                if lb {
                    return Ok(Signal::Value(Value::Bool(true)));
                }
                let r = value!(self, right);
                let rb = r.as_bool().ok_or_else(|| CompileError::internal("'or' applied to a non-Bool"))?;
                Ok(Signal::Value(Value::Bool(rb)))
            }
            BinaryOperator::Eq => {
                let l = value!(self, left);
                let r = value!(self, right);
                Ok(Signal::Value(Value::Bool(l.values_equal(&r))))
            }
            BinaryOperator::Neq => {
                let l = value!(self, left);
                let r = value!(self, right);
                Ok(Signal::Value(Value::Bool(!l.values_equal(&r))))
            }
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div
            | BinaryOperator::Mod
            | BinaryOperator::Lt
            | BinaryOperator::Lte
            | BinaryOperator::Gt
            | BinaryOperator::Gte => {
                let l = value!(self, left);
                let r = value!(self, right);
                let a = l.as_int().ok_or_else(|| CompileError::internal("arithmetic on a non-Int"))?;
                let b = r.as_int().ok_or_else(|| CompileError::internal("arithmetic on a non-Int"))?;
                Ok(Signal::Value(self.eval_int_op(op, a, b, location)?))
            }
        }
    }

    fn eval_int_op(&self, op: BinaryOperator, a: i64, b: i64, location: &SourceLocation) -> CompileResult<Value> {
        use BinaryOperator::*;
        Ok(match op {
            Add => Value::Int(a + b),
            Sub => Value::Int(a - b),
            Mul => Value::Int(a * b),
            Div => {
                if b == 0 {
                    return Err(CompileError::semantic("division by zero", location.clone()));
                }
                Value::Int(a / b)
            }
            Mod => {
                if b == 0 {
                    return Err(CompileError::semantic("division by zero", location.clone()));
                }
                Value::Int(a % b)
            }
            Lt => Value::Bool(a < b),
            Lte => Value::Bool(a <= b),
            Gt => Value::Bool(a > b),
            Gte => Value::Bool(a >= b),
            _ => unreachable!("eval_int_op only called for arithmetic/comparison operators"),
        })
    }

    fn eval_assign(&mut self, left: &'a Expr, right: &'a Expr, location: &SourceLocation) -> CompileResult<Signal> {
        let rv = value!(self, right);
        match left {
            Expr::Identifier { name, .. } => {
                let cell = self.lookup_cell(name, location)?;
                *cell.borrow_mut() = rv.clone();
            }
            Expr::UnaryOp {
                op: UnaryOperator::Deref,
                right: target,
                ..
            } => {
                let t = value!(self, target);
                let cell = t
                    .as_pointer()
                    .ok_or_else(|| CompileError::internal("assigned through a non-pointer dereference"))?;
                *cell.borrow_mut() = rv.clone();
            }
            _ => return Err(CompileError::internal("assignment target should have been rejected earlier")),
        }
        Ok(Signal::Value(rv))
    }

    fn lookup_cell(&self, name: &str, location: &SourceLocation) -> CompileResult<Rc<RefCell<Value>>> {
        self.table
            .lookup(name)
            .cloned()
            .ok_or_else(|| CompileError::semantic(format!("unknown identifier '{name}'"), location.clone()))
    }

    fn eval_call(&mut self, name: &str, args: &'a [Expr], location: &SourceLocation) -> CompileResult<Signal> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(value!(self, arg));
        }

        match name {
            "print_int" => {
                let v = values[0]
                    .as_int()
                    .ok_or_else(|| CompileError::internal("print_int called with a non-Int"))?;
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{v}");
                return Ok(Signal::Value(Value::Unit));
            }
            "print_bool" => {
                let v = values[0]
                    .as_bool()
                    .ok_or_else(|| CompileError::internal("print_bool called with a non-Bool"))?;
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{v}");
                return Ok(Signal::Value(Value::Unit));
            }
            "read_int" => {
                let mut line = String::new();
                io::stdin()
                    .read_line(&mut line)
                    .map_err(|e| CompileError::semantic(format!("read_int: failed to read stdin: {e}"), location.clone()))?;
                let v = line
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| CompileError::semantic(format!("read_int: {:?} is not a valid integer: {e}", line.trim()), location.clone()))?;
                return Ok(Signal::Value(Value::Int(v)));
            }
            _ => {}
        }

        let entry = *self
            .functions
            .get(name)
            .ok_or_else(|| CompileError::semantic(format!("call to unknown function '{name}'"), location.clone()))?;

        let mut call_table = self.table.root_snapshot();
        for (param, value) in entry.args.iter().zip(values) {
            call_table.add_local(param.name.clone(), Rc::new(RefCell::new(value)));
        }

        let saved_table = std::mem::replace(&mut self.table, call_table);
        let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
        let outcome = self.eval(entry.body);
        self.table = saved_table;
        self.loop_depth = saved_depth;

        match outcome? {
            Signal::Value(v) => Ok(Signal::Value(v)),
            Signal::Break | Signal::Continue => Err(CompileError::internal("break/continue escaped a function body")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::typechecker::typecheck_module;

    fn run(source: &str) -> Value {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        interpret_module(&module).unwrap()
    }

    fn run_err(source: &str) -> CompileError {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module).unwrap();
        interpret_module(&module).unwrap_err()
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert!(matches!(run("2 + 3 * 4"), Value::Int(14)));
        assert!(matches!(run("1 < 2"), Value::Bool(true)));
    }

    #[test]
    fn and_short_circuits_without_evaluating_the_right_side() {
        // if the right side were evaluated, this would hit the
        // division-by-zero error instead of short-circuiting to false.
        let v = run("false and (1 / 0 == 0)");
        assert!(matches!(v, Value::Bool(false)));
    }

    #[test]
    fn or_short_circuits_without_evaluating_the_right_side() {
        let v = run("true or (1 / 0 == 0)");
        assert!(matches!(v, Value::Bool(true)));
    }

    #[test]
    fn while_evaluates_to_unit_not_the_last_body_value() {
        let v = run("var x: Int = 0; while x < 3 do { x = x + 1 }; x");
        assert!(matches!(v, Value::Int(3)));
        let v = run("while false do { 1 }");
        assert!(matches!(v, Value::Unit));
    }

    #[test]
    fn break_stops_the_nearest_enclosing_loop() {
        let v = run("var x: Int = 0; while true do { x = x + 1; if x == 3 then { break }; unit }; x");
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn continue_skips_straight_to_the_condition() {
        let v = run(
            "var sum: Int = 0; var i: Int = 0; \
             while i < 5 do { i = i + 1; if i == 3 then { continue }; sum = sum + i }; sum",
        );
        // 1 + 2 + 4 + 5, skipping 3
        assert!(matches!(v, Value::Int(12)));
    }

    #[test]
    fn break_outside_a_loop_is_a_semantic_error() {
        let err = run_err("break");
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn pointer_aliasing_lets_a_write_through_one_pointer_be_seen_through_another() {
        let v = run("var x: Int = 1; var p: Int* = &x; var q: Int* = &x; *p = 9; *q");
        assert!(matches!(v, Value::Int(9)));
    }

    #[test]
    fn mutual_recursion_between_two_functions_defined_in_either_order() {
        let v = run(
            "fun is_even(n: Int): Bool { if n == 0 then true else is_odd(n - 1) }\n\
             fun is_odd(n: Int): Bool { if n == 0 then false else is_even(n - 1) }\n\
             is_even(10)",
        );
        assert!(matches!(v, Value::Bool(true)));
    }

    #[test]
    fn division_by_zero_is_a_semantic_error_not_a_panic() {
        let err = run_err("1 / 0");
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}

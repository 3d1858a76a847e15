//! Hindley-style typechecking over the AST, in two passes.
//!
//! Pass one pre-registers every top-level `FuncDef`'s signature in the
//! root scope so that mutually recursive functions can call each other
//! regardless of definition order. Pass two walks the module
//! sequentially, decorating every node's `ty` field in place and
//! mutating the root scope as `var` declarations are encountered (so a
//! later top-level statement sees earlier top-level bindings).
//!
//! Operators are modelled as ordinary entries in the same symbol table
//! user functions live in — `check_call` is the single path every
//! `BinaryOp` (other than `=`, `==`, `!=`) and every `UnaryOp` funnels
//! through. `unary_*`/`unary_&` carry [`Type::Generic`] placeholders in
//! their builtin signature; `check_call` special-cases those two names
//! to resolve the placeholder against the actual argument type.

use crate::ast::{Argument, BinaryOperator, Expr, LiteralValue, Module, UnaryOperator};
use crate::builtins;
use crate::error::{CompileError, CompileResult};
use crate::location::SourceLocation;
use crate::symbol_table::SymbolTable;
use crate::types::Type;

pub fn typecheck_module(module: &mut Module) -> CompileResult<()> {
    Typechecker::new().run(module)
}

struct Typechecker {
    table: SymbolTable<Type>,
}

impl Typechecker {
    fn new() -> Self {
        let mut table = SymbolTable::new();
        for name in builtins::GLOBAL_NAMES {
            let sig = builtins::builtin_signature(name)
                .unwrap_or_else(|| panic!("builtin '{name}' is missing a signature"));
            table.add_local(name, sig);
        }
        Typechecker { table }
    }

    fn run(&mut self, module: &mut Module) -> CompileResult<()> {
        for expr in module.expressions.iter() {
            if let Expr::FuncDef {
                name,
                args,
                declared_type,
                ..
            } = expr
            {
                let arg_types = args.iter().map(|a| a.declared_type.clone()).collect();
                let ret = declared_type.clone().unwrap_or(Type::Unit);
                self.table.add_local(name.clone(), Type::function(arg_types, ret));
            }
        }

        for expr in module.expressions.iter_mut() {
            self.check(expr)?;
        }
        Ok(())
    }

    fn check(&mut self, expr: &mut Expr) -> CompileResult<Type> {
        let ty = match expr {
            Expr::Literal { value, .. } => match value {
                LiteralValue::Int(_) => Type::Int,
                LiteralValue::Bool(_) => Type::Bool,
                LiteralValue::Unit => Type::Unit,
            },
            Expr::Identifier { name, location, .. } => self
                .table
                .lookup(name)
                .cloned()
                .ok_or_else(|| CompileError::semantic(format!("unknown identifier '{name}'"), location.clone()))?,
            Expr::BreakContinue { .. } => Type::Unit,
            Expr::UnaryOp { op, right, location, .. } => self.check_unary(*op, right, location)?,
            Expr::BinaryOp {
                left, op, right, location, ..
            } => self.check_binary(*op, left, right, location)?,
            Expr::IfThenElse {
                cond,
                then_branch,
                else_branch,
                location,
                ..
            } => {
                let cond_ty = self.check(cond)?;
                if cond_ty != Type::Bool {
                    return Err(CompileError::semantic(
                        format!("if condition must be Bool, found {cond_ty}"),
                        location.clone(),
                    ));
                }
                let then_ty = self.check(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let else_ty = self.check(else_branch)?;
                        if then_ty != else_ty {
                            return Err(CompileError::semantic(
                                format!("if branches have mismatched types: {then_ty} vs {else_ty}"),
                                location.clone(),
                            ));
                        }
                        then_ty
                    }
                    // A one-armed `if` is always Unit: there is no value
                    // to produce on the path where the condition is false.
                    None => Type::Unit,
                }
            }
            Expr::While { cond, body, location, .. } => {
                let cond_ty = self.check(cond)?;
                if cond_ty != Type::Bool {
                    return Err(CompileError::semantic(
                        format!("while condition must be Bool, found {cond_ty}"),
                        location.clone(),
                    ));
                }
                self.check(body)?;
                // A loop body's value is discarded on every iteration, so
                // the whole construct is Unit regardless of body type.
                Type::Unit
            }
            Expr::Var {
                name,
                declared_type,
                initialization,
                location,
                ..
            } => {
                let init_ty = self.check(initialization)?;
                if let Some(declared) = declared_type {
                    if *declared != init_ty {
                        return Err(CompileError::semantic(
                            format!("'{name}' declared as {declared} but initialized with {init_ty}"),
                            location.clone(),
                        ));
                    }
                }
                self.table.add_local(name.clone(), init_ty.clone());
                init_ty
            }
            Expr::Block { statements, .. } => {
                self.table.push_scope();
                let mut result = Type::Unit;
                for stmt in statements.iter_mut() {
                    result = self.check(stmt)?;
                }
                self.table.pop_scope();
                result
            }
            Expr::FuncCall { name, args, location, .. } => {
                let sig = self
                    .table
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| CompileError::semantic(format!("unknown function '{name}'"), location.clone()))?;
                let mut arg_types = Vec::with_capacity(args.len());
                for a in args.iter_mut() {
                    arg_types.push(self.check(a)?);
                }
                self.check_call(name, &sig, &arg_types, location)?
            }
            Expr::FuncDef {
                name,
                args,
                declared_type,
                body,
                location,
                ..
            } => {
                self.table.push_scope();
                for a in args.iter() {
                    self.table.add_local(a.name.clone(), a.declared_type.clone());
                }
                let body_ty = self.check(body)?;
                self.table.pop_scope();
                let expected = declared_type.clone().unwrap_or(Type::Unit);
                if body_ty != expected {
                    return Err(CompileError::semantic(
                        format!("function '{name}' declared to return {expected} but body has type {body_ty}"),
                        location.clone(),
                    ));
                }
                self.table
                    .lookup(name)
                    .cloned()
                    .unwrap_or_else(|| Type::function(args.iter().map(arg_type).collect(), expected))
            }
        };
        expr.set_ty(ty.clone());
        Ok(ty)
    }

    fn check_unary(&mut self, op: UnaryOperator, right: &mut Expr, location: &SourceLocation) -> CompileResult<Type> {
        let arg_ty = self.check(right)?;
        let name = op.builtin_name();
        let sig = self
            .table
            .lookup(name)
            .cloned()
            .unwrap_or_else(|| panic!("unary builtin '{name}' is missing a signature"));
        self.check_call(name, &sig, &[arg_ty], location)
    }

    fn check_binary(
        &mut self,
        op: BinaryOperator,
        left: &mut Expr,
        right: &mut Expr,
        location: &SourceLocation,
    ) -> CompileResult<Type> {
        match op {
            BinaryOperator::Assign => {
                check_assignment_target(left)?;
                let left_ty = self.check(left)?;
                let right_ty = self.check(right)?;
                if left_ty != right_ty {
                    return Err(CompileError::semantic(
                        format!("cannot assign {right_ty} to {left_ty}"),
                        location.clone(),
                    ));
                }
                Ok(right_ty)
            }
            BinaryOperator::Eq | BinaryOperator::Neq => {
                let left_ty = self.check(left)?;
                let right_ty = self.check(right)?;
                if left_ty != right_ty {
                    return Err(CompileError::semantic(
                        format!("cannot compare {left_ty} with {right_ty}"),
                        location.clone(),
                    ));
                }
                Ok(Type::Bool)
            }
            _ => {
                let name = op
                    .builtin_name()
                    .expect("Assign/Eq/Neq are handled above; every other operator has a builtin name");
                let sig = self
                    .table
                    .lookup(name)
                    .cloned()
                    .unwrap_or_else(|| panic!("binary builtin '{name}' is missing a signature"));
                let left_ty = self.check(left)?;
                let right_ty = self.check(right)?;
                self.check_call(name, &sig, &[left_ty, right_ty], location)
            }
        }
    }

    fn check_call(&self, name: &str, sig: &Type, arg_types: &[Type], location: &SourceLocation) -> CompileResult<Type> {
        let (params, return_type) = match sig {
            Type::FunctionSignature { args, return_type } => (args, (**return_type).clone()),
            other => {
                return Err(CompileError::semantic(
                    format!("'{name}' is not callable (has type {other})"),
                    location.clone(),
                ))
            }
        };
        if params.len() != arg_types.len() {
            return Err(CompileError::semantic(
                format!(
                    "'{name}' expects {} argument(s), found {}",
                    params.len(),
                    arg_types.len()
                ),
                location.clone(),
            ));
        }
        for (param, arg) in params.iter().zip(arg_types.iter()) {
            if !args_match(param, arg) {
                return Err(CompileError::semantic(
                    format!("'{name}' argument type mismatch: expected {param}, found {arg}"),
                    location.clone(),
                ));
            }
        }
        match name {
            "unary_*" => match &arg_types[0] {
                Type::Pointer(target) => Ok((**target).clone()),
                other => Err(CompileError::semantic(
                    format!("cannot dereference non-pointer type {other}"),
                    location.clone(),
                )),
            },
            "unary_&" => Ok(Type::pointer(arg_types[0].clone())),
            _ => Ok(return_type),
        }
    }
}

fn arg_type(a: &Argument) -> Type {
    a.declared_type.clone()
}

/// `Type::Generic` in a builtin signature means "any primitive or
/// pointer"; `Pointer(Generic)` means "any pointer". Everything else
/// must match exactly.
fn args_match(param: &Type, arg: &Type) -> bool {
    match param {
        Type::Generic => matches!(arg, Type::Int | Type::Bool | Type::Pointer(_)),
        Type::Pointer(target) if matches!(**target, Type::Generic) => matches!(arg, Type::Pointer(_)),
        other => other == arg,
    }
}

fn check_assignment_target(expr: &Expr) -> CompileResult<()> {
    match expr {
        Expr::Identifier { .. } => Ok(()),
        Expr::UnaryOp {
            op: UnaryOperator::Deref,
            ..
        } => Ok(()),
        other => Err(CompileError::semantic(
            "assignment target must be an identifier or a dereference (`*p = ...`)",
            other.location().clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn check(source: &str) -> CompileResult<Module> {
        let tokens = tokenize(source, "test.vl").unwrap();
        let mut module = parse(tokens).unwrap();
        typecheck_module(&mut module)?;
        Ok(module)
    }

    #[test]
    fn arithmetic_expression_types_as_int() {
        let module = check("1 + 2").unwrap();
        assert_eq!(*module.expressions[0].ty(), Type::Int);
    }

    #[test]
    fn mismatched_var_declaration_is_rejected() {
        let err = check("var x: Int = true").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn if_condition_must_be_bool() {
        let err = check("if 1 then { 2 }").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn one_armed_if_is_unit() {
        let module = check("var x: Int = 0; if true then { x = 1 }").unwrap();
        assert_eq!(*module.expressions[1].ty(), Type::Unit);
    }

    #[test]
    fn while_is_always_unit() {
        let module = check("while false do { 1 }").unwrap();
        assert_eq!(*module.expressions[0].ty(), Type::Unit);
    }

    #[test]
    fn mutually_recursive_functions_typecheck() {
        check(
            "fun is_even(n: Int): Bool { if n == 0 then true else is_odd(n - 1) }\n\
             fun is_odd(n: Int): Bool { if n == 0 then false else is_even(n - 1) }\n\
             is_even(10)",
        )
        .unwrap();
    }

    #[test]
    fn assigning_through_a_non_pointer_dereference_is_rejected() {
        let err = check("var x: Int = 1; *x = 2").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn assigning_to_an_arbitrary_expression_is_rejected() {
        let err = check("1 + 1 = 2").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn pointer_round_trip_types_correctly() {
        let module = check("var x: Int = 1; var p: Int* = &x; *p").unwrap();
        assert_eq!(*module.expressions[2].ty(), Type::Int);
    }

    #[test]
    fn wrong_arity_call_is_rejected() {
        let err = check("fun add(a: Int, b: Int): Int { a + b } add(1)").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn equality_requires_matching_operand_types() {
        let err = check("1 == true").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}

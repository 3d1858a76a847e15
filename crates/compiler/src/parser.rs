//! Recursive-descent parser with precedence climbing.
//!
//! Binary operators bind left-to-right in six tiers, loosest to
//! tightest: `or`, `and`, `==`/`!=`, comparisons, `+`/`-`, `*`/`/`/`%`.
//! Assignment sits above all of them and is right-associative. Unary
//! `-`, `not`, `*`, `&` bind tighter than any binary operator.
//!
//! A block is `{ stmt (';' stmt)* ';'? }`. A `;` is required between two
//! statements *unless* the first one's last token was itself a `}` —
//! `if`, `while`, `var ... = { ... }`, nested blocks and function
//! definitions all end that way, and requiring a semicolon after them
//! reads badly. [`Parser::last_token_closed_brace`] is the whole of that
//! rule: it only looks at the raw token stream, never the AST shape, so
//! it doesn't need to know which constructs end in a block.

use crate::ast::{Argument, BinaryOperator, Expr, LiteralValue, LoopControl, Module, UnaryOperator};
use crate::error::{CompileError, CompileResult};
use crate::location::SourceLocation;
use crate::token::{Token, TokenKind};
use crate::types::{type_from_name, Type};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(tokens: Vec<Token>) -> CompileResult<Module> {
    let mut parser = Parser { tokens, pos: 0 };
    let block = parser.parse_block()?;
    parser.expect_end()?;
    let statements = match block {
        Expr::Block { statements, .. } => statements,
        _ => unreachable!("parse_block always returns Expr::Block"),
    };
    Ok(Module {
        namespace: "main".to_string(),
        expressions: statements,
    })
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is never empty"))
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if tok.kind != TokenKind::End {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    fn check_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> CompileResult<Token> {
        if self.check(text) {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(
                format!("expected '{text}', found '{}'", self.peek().text),
                self.peek().location.clone(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> CompileResult<Token> {
        if self.check_kind(TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(
                format!("expected identifier, found '{}'", self.peek().text),
                self.peek().location.clone(),
            ))
        }
    }

    fn expect_end(&mut self) -> CompileResult<()> {
        if self.check_kind(TokenKind::End) {
            Ok(())
        } else {
            Err(CompileError::syntax(
                format!("unexpected trailing token '{}'", self.peek().text),
                self.peek().location.clone(),
            ))
        }
    }

    fn last_token_closed_brace(&self) -> bool {
        self.previous().is("}")
    }

    // ---- blocks -----------------------------------------------------

    fn parse_block(&mut self) -> CompileResult<Expr> {
        let start_loc = self.expect("{")?.location;
        let mut statements = Vec::new();
        let mut trailing_semicolon = false;

        loop {
            if self.check("}") {
                break;
            }

            let stmt = self.parse_expression()?;
            let stmt_closed_with_brace = self.last_token_closed_brace();
            statements.push(stmt);

            if self.check("}") {
                trailing_semicolon = false;
                break;
            } else if self.check(";") {
                self.advance();
                trailing_semicolon = true;
                continue;
            } else if stmt_closed_with_brace {
                trailing_semicolon = false;
                continue;
            } else {
                return Err(CompileError::syntax(
                    format!(
                        "expected ';' or '}}' between statements, found '{}'",
                        self.peek().text
                    ),
                    self.peek().location.clone(),
                ));
            }
        }

        let end_loc = self.expect("}")?.location;

        if trailing_semicolon || statements.is_empty() {
            statements.push(Expr::unit(end_loc.clone()));
        }

        Ok(Expr::Block {
            statements,
            ty: Type::Unknown,
            location: start_loc,
        })
    }

    // ---- statements / expressions ------------------------------------

    fn parse_expression(&mut self) -> CompileResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> CompileResult<Expr> {
        let left = self.parse_or()?;
        if self.check("=") {
            let loc = self.advance().location;
            let right = self.parse_assignment()?;
            return Ok(Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Assign,
                right: Box::new(right),
                ty: Type::Unknown,
                location: loc,
            });
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["or"], Self::parse_and)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["and"], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["==", "!="], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["<", "<=", ">", ">="], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        self.parse_left_assoc_binary(&["*", "/", "%"], Self::parse_unary)
    }

    fn parse_left_assoc_binary(
        &mut self,
        ops: &[&str],
        mut next: impl FnMut(&mut Self) -> CompileResult<Expr>,
    ) -> CompileResult<Expr> {
        let mut left = next(self)?;
        loop {
            if self.check_kind(TokenKind::Operator) && ops.contains(&self.peek().text.as_str()) {
                let tok = self.advance();
                let op = BinaryOperator::from_text(&tok.text)
                    .expect("operator text was matched against `ops`");
                let right = next(self)?;
                left = Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                    ty: Type::Unknown,
                    location: tok.location,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = if self.check("-") {
            Some(UnaryOperator::Neg)
        } else if self.check("not") {
            Some(UnaryOperator::Not)
        } else if self.check("*") {
            Some(UnaryOperator::Deref)
        } else if self.check("&") {
            Some(UnaryOperator::AddressOf)
        } else {
            None
        };

        if let Some(op) = op {
            let loc = self.advance().location;
            let right = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op,
                right: Box::new(right),
                ty: Type::Unknown,
                location: loc,
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let tok = self.peek().clone();

        if tok.kind == TokenKind::IntLiteral {
            self.advance();
            let value = tok.text.parse::<i64>().map_err(|_| {
                CompileError::syntax(format!("invalid integer literal '{}'", tok.text), tok.location.clone())
            })?;
            return Ok(Expr::Literal {
                value: LiteralValue::Int(value),
                ty: Type::Unknown,
                location: tok.location,
            });
        }

        if tok.kind == TokenKind::BoolLiteral {
            self.advance();
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(tok.text == "true"),
                ty: Type::Unknown,
                location: tok.location,
            });
        }

        if tok.is("(") {
            self.advance();
            let inner = self.parse_expression()?;
            self.expect(")")?;
            return Ok(inner);
        }

        if tok.is("{") {
            return self.parse_block();
        }

        if tok.is("if") {
            return self.parse_if();
        }

        if tok.is("while") {
            return self.parse_while();
        }

        if tok.is("var") {
            return self.parse_var();
        }

        if tok.is("fun") {
            return self.parse_fun();
        }

        if tok.is("break") {
            self.advance();
            return Ok(Expr::BreakContinue {
                kind: LoopControl::Break,
                ty: Type::Unknown,
                location: tok.location,
            });
        }

        if tok.is("continue") {
            self.advance();
            return Ok(Expr::BreakContinue {
                kind: LoopControl::Continue,
                ty: Type::Unknown,
                location: tok.location,
            });
        }

        if tok.kind == TokenKind::Identifier {
            self.advance();
            if tok.text == "unit" {
                return Ok(Expr::literal(LiteralValue::Unit, tok.location));
            }
            if self.check("(") {
                return self.parse_call_args(tok.text, tok.location);
            }
            return Ok(Expr::Identifier {
                name: tok.text,
                ty: Type::Unknown,
                location: tok.location,
            });
        }

        Err(CompileError::syntax(
            format!("unexpected token '{}'", tok.text),
            tok.location,
        ))
    }

    fn parse_call_args(&mut self, name: String, location: SourceLocation) -> CompileResult<Expr> {
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.check(")") {
            loop {
                args.push(self.parse_expression()?);
                if self.matches(",") {
                    continue;
                }
                break;
            }
        }
        self.expect(")")?;
        Ok(Expr::FuncCall {
            name,
            args,
            ty: Type::Unknown,
            location,
        })
    }

    fn parse_if(&mut self) -> CompileResult<Expr> {
        let loc = self.expect("if")?.location;
        let cond = self.parse_expression()?;
        self.expect("then")?;
        let then_branch = self.parse_expression()?;
        let else_branch = if self.matches("else") {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::IfThenElse {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
            ty: Type::Unknown,
            location: loc,
        })
    }

    fn parse_while(&mut self) -> CompileResult<Expr> {
        let loc = self.expect("while")?.location;
        let cond = self.parse_expression()?;
        self.expect("do")?;
        let body = self.parse_expression()?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body: Box::new(body),
            ty: Type::Unknown,
            location: loc,
        })
    }

    fn parse_var(&mut self) -> CompileResult<Expr> {
        let loc = self.expect("var")?.location;
        let name = self.expect_identifier()?.text;
        let declared_type = if self.matches(":") {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        self.expect("=")?;
        let initialization = self.parse_expression()?;
        Ok(Expr::Var {
            name,
            declared_type,
            initialization: Box::new(initialization),
            ty: Type::Unknown,
            location: loc,
        })
    }

    fn parse_fun(&mut self) -> CompileResult<Expr> {
        let loc = self.expect("fun")?.location;
        let name = self.expect_identifier()?.text;
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.check(")") {
            loop {
                let arg_loc = self.peek().location.clone();
                let arg_name = self.expect_identifier()?.text;
                self.expect(":")?;
                let declared_type = self.parse_type_annotation()?;
                args.push(Argument {
                    name: arg_name,
                    declared_type,
                    location: arg_loc,
                });
                if self.matches(",") {
                    continue;
                }
                break;
            }
        }
        self.expect(")")?;
        let declared_type = if self.matches(":") {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Expr::FuncDef {
            name,
            args,
            declared_type,
            body: Box::new(body),
            ty: Type::Unknown,
            location: loc,
        })
    }

    fn parse_type_annotation(&mut self) -> CompileResult<Type> {
        let tok = self.expect_identifier()?;
        let mut depth = 0;
        while self.check("*") {
            self.advance();
            depth += 1;
        }
        Ok(type_from_name(&tok.text, depth).unwrap_or(Type::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> CompileResult<Module> {
        let tokens = tokenize(source, "test.vl")?;
        parse(tokens)
    }

    #[test]
    fn parses_simple_arithmetic() {
        let module = parse_source("1 + 2 * 3;").unwrap();
        assert_eq!(module.expressions.len(), 1);
        assert!(matches!(module.expressions[0], Expr::BinaryOp { op: BinaryOperator::Add, .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let module = parse_source("1 + 2 * 3;").unwrap();
        if let Expr::BinaryOp { op, right, .. } = &module.expressions[0] {
            assert_eq!(*op, BinaryOperator::Add);
            assert!(matches!(**right, Expr::BinaryOp { op: BinaryOperator::Mul, .. }));
        } else {
            panic!("expected BinaryOp");
        }
    }

    #[test]
    fn block_terminated_statement_needs_no_semicolon() {
        let module = parse_source("if true then { 1 } var x = 2;").unwrap();
        assert_eq!(module.expressions.len(), 2);
    }

    #[test]
    fn missing_separator_between_plain_statements_is_an_error() {
        let err = parse_source("1 2").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn trailing_semicolon_adds_implicit_unit() {
        let module = parse_source("1;").unwrap();
        assert_eq!(module.expressions.len(), 2);
        assert!(matches!(
            module.expressions[1],
            Expr::Literal { value: LiteralValue::Unit, .. }
        ));
    }

    #[test]
    fn empty_block_is_unit() {
        let block = {
            let tokens = tokenize("{}", "test.vl").unwrap();
            let mut parser = Parser { tokens, pos: 0 };
            parser.parse_block().unwrap()
        };
        match block {
            Expr::Block { statements, .. } => {
                assert_eq!(statements.len(), 1);
                assert!(matches!(statements[0], Expr::Literal { value: LiteralValue::Unit, .. }));
            }
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn parses_function_definition_with_typed_params_and_pointer_return() {
        let module = parse_source("fun make(x: Int): Int* { &x };").unwrap();
        match &module.expressions[0] {
            Expr::FuncDef { name, args, declared_type, .. } => {
                assert_eq!(name, "make");
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].declared_type, Type::Int);
                assert_eq!(declared_type.clone().unwrap(), Type::pointer(Type::Int));
            }
            _ => panic!("expected FuncDef"),
        }
    }

    #[test]
    fn unrecognized_type_name_parses_as_unknown_rather_than_erroring() {
        let module = parse_source("fun f(x: Frobnicate): Int { 1 };").unwrap();
        match &module.expressions[0] {
            Expr::FuncDef { args, .. } => assert_eq!(args[0].declared_type, Type::Unknown),
            _ => panic!("expected FuncDef"),
        }
    }

    #[test]
    fn parses_call_with_multiple_arguments() {
        let module = parse_source("f(1, 2, 3);").unwrap();
        match &module.expressions[0] {
            Expr::FuncCall { name, args, .. } => {
                assert_eq!(name, "f");
                assert_eq!(args.len(), 3);
            }
            _ => panic!("expected FuncCall"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let module = parse_source("x = y = 1;").unwrap();
        match &module.expressions[0] {
            Expr::BinaryOp { op: BinaryOperator::Assign, right, .. } => {
                assert!(matches!(**right, Expr::BinaryOp { op: BinaryOperator::Assign, .. }));
            }
            _ => panic!("expected nested assignment"),
        }
    }

    #[test]
    fn unit_keyword_parses_as_a_unit_literal() {
        let module = parse_source("unit;").unwrap();
        assert!(matches!(
            module.expressions[0],
            Expr::Literal { value: LiteralValue::Unit, .. }
        ));
    }

    #[test]
    fn unterminated_call_is_a_syntax_error() {
        let err = parse_source("f(x;").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }
}

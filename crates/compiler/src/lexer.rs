//! Turns source text into a flat token stream.
//!
//! Comments (`//...` and `#...`) are stripped per line before scanning.
//! The whole stream is wrapped in a synthetic `{`/`}` pair tagged
//! [`TokenKind::Module`], which lets the parser treat "parse a program"
//! and "parse a block" as the same production.

use crate::error::{caret, CompileError, CompileResult};
use crate::location::SourceLocation;
use crate::token::{Token, TokenKind};

const TWO_CHAR_OPERATORS: [&str; 4] = ["==", "!=", "<=", ">="];
const ONE_CHAR_OPERATORS: &str = "+-*/%<>=&";
const PUNCTUATION: &str = "(){},;:";

pub fn tokenize(source: &str, file: &str) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();
    tokens.push(Token::new(
        "{",
        TokenKind::Module,
        SourceLocation::new(file, 0, 0),
    ));

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = strip_comment(raw_line);
        let chars: Vec<char> = line.chars().collect();
        let mut col = 0usize;

        while col < chars.len() {
            let c = chars[col];

            if c.is_whitespace() {
                col += 1;
                continue;
            }

            let loc = SourceLocation::new(file, line_no, col);

            if c.is_ascii_digit() {
                let start = col;
                while col < chars.len() && chars[col].is_ascii_digit() {
                    col += 1;
                }
                let text: String = chars[start..col].iter().collect();
                tokens.push(Token::new(text, TokenKind::IntLiteral, loc));
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' {
                let start = col;
                while col < chars.len() && (chars[col].is_ascii_alphanumeric() || chars[col] == '_')
                {
                    col += 1;
                }
                let text: String = chars[start..col].iter().collect();
                let kind = match text.as_str() {
                    "true" | "false" => TokenKind::BoolLiteral,
                    "and" | "or" => TokenKind::Operator,
                    _ => TokenKind::Identifier,
                };
                tokens.push(Token::new(text, kind, loc));
                continue;
            }

            if col + 1 < chars.len() {
                let two: String = chars[col..col + 2].iter().collect();
                if TWO_CHAR_OPERATORS.contains(&two.as_str()) {
                    tokens.push(Token::new(two, TokenKind::Operator, loc));
                    col += 2;
                    continue;
                }
            }

            if ONE_CHAR_OPERATORS.contains(c) {
                tokens.push(Token::new(c.to_string(), TokenKind::Operator, loc));
                col += 1;
                continue;
            }

            if PUNCTUATION.contains(c) {
                tokens.push(Token::new(c.to_string(), TokenKind::Punctuation, loc));
                col += 1;
                continue;
            }

            return Err(CompileError::lexical(
                format!("unrecognised character '{c}'\n{}", caret(raw_line, col)),
                loc,
            ));
        }
    }

    let end_loc = tokens
        .last()
        .map(|t| SourceLocation::new(file, t.location.line, t.location.column + 1))
        .unwrap_or_else(|| SourceLocation::new(file, 0, 0));
    tokens.push(Token::new("}", TokenKind::Module, end_loc.clone()));
    tokens.push(Token::new("", TokenKind::End, end_loc));

    Ok(tokens)
}

fn strip_comment(line: &str) -> &str {
    let slash = line.find("//");
    let hash = line.find('#');
    match [slash, hash].into_iter().flatten().min() {
        Some(i) => &line[..i],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        tokenize(source, "test.vl")
            .unwrap()
            .into_iter()
            .filter(|t| t.kind != TokenKind::End)
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn wraps_stream_in_synthetic_braces() {
        let toks = tokenize("1 + 2", "test.vl").unwrap();
        assert_eq!(toks.first().unwrap().kind, TokenKind::Module);
        assert_eq!(toks.last().unwrap().kind, TokenKind::End);
        assert!(toks.first().unwrap().is("{"));
        assert!(toks[toks.len() - 2].is("}"));
    }

    #[test]
    fn scans_arithmetic_expression() {
        assert_eq!(texts("1 + 2 * 3"), vec!["{", "1", "+", "2", "*", "3", "}"]);
    }

    #[test]
    fn strips_line_comments() {
        assert_eq!(
            texts("1 + 2 // trailing\n# whole line\n3"),
            vec!["{", "1", "+", "2", "3", "}"]
        );
    }

    #[test]
    fn recognises_two_char_operators_before_one_char() {
        assert_eq!(texts("a == b"), vec!["{", "a", "==", "b", "}"]);
        assert_eq!(texts("a != b"), vec!["{", "a", "!=", "b", "}"]);
        assert_eq!(texts("a >= b <= c"), vec!["{", "a", ">=", "b", "<=", "c", "}"]);
    }

    #[test]
    fn classifies_bool_literals_and_logical_operators() {
        let toks = tokenize("true and false", "test.vl").unwrap();
        assert_eq!(toks[1].kind, TokenKind::BoolLiteral);
        assert_eq!(toks[2].kind, TokenKind::Operator);
        assert_eq!(toks[3].kind, TokenKind::BoolLiteral);
    }

    #[test]
    fn rejects_unrecognised_character() {
        let err = tokenize("1 @ 2", "test.vl").unwrap_err();
        assert!(matches!(err, CompileError::Lexical { .. }));
    }

    #[test]
    fn pointer_punctuation_is_operator_not_punctuation() {
        // `*` and `&` are ambiguous between unary/binary use; the lexer
        // always classifies them as Operator and leaves disambiguation
        // to the parser.
        let toks = tokenize("*p", "test.vl").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Operator);
    }
}

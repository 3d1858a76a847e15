//! The compiler-wide error type.
//!
//! Every stage is fatal-on-first-error: there is no batching of
//! diagnostics or partial recovery. A [`CompileError`] carries enough of
//! a [`SourceLocation`] to print one locatable line; `Internal` is the
//! odd one out, reserved for shapes a correct earlier pass should never
//! have produced.

use crate::location::SourceLocation;
use std::fmt;

#[derive(Debug, Clone)]
pub enum CompileError {
    /// An unrecognised character, or an unterminated token, during lexing.
    Lexical {
        message: String,
        location: SourceLocation,
    },
    /// Unexpected token, missing separator, unterminated construct.
    Syntax {
        message: String,
        location: SourceLocation,
    },
    /// Unknown identifier, type mismatch, arity mismatch, a `break` or
    /// `continue` outside a loop, assignment to a non-assignable
    /// expression, and similar.
    Semantic {
        message: String,
        location: SourceLocation,
    },
    /// A later pass was handed a shape an earlier pass should have
    /// rejected or normalized away. Always a compiler bug, never a
    /// reflection of bad input.
    Internal { message: String },
}

impl CompileError {
    pub fn lexical(message: impl Into<String>, location: SourceLocation) -> Self {
        CompileError::Lexical {
            message: message.into(),
            location,
        }
    }

    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        CompileError::Syntax {
            message: message.into(),
            location,
        }
    }

    pub fn semantic(message: impl Into<String>, location: SourceLocation) -> Self {
        CompileError::Semantic {
            message: message.into(),
            location,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CompileError::Lexical { location, .. }
            | CompileError::Syntax { location, .. }
            | CompileError::Semantic { location, .. } => Some(location),
            CompileError::Internal { .. } => None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lexical { message, location } => {
                write!(f, "{location}: lexical error: {message}")
            }
            CompileError::Syntax { message, location } => {
                write!(f, "{location}: syntax error: {message}")
            }
            CompileError::Semantic { message, location } => {
                write!(f, "{location}: semantic error: {message}")
            }
            CompileError::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Renders the offending line with a caret under the bad column, for
/// lexical and syntax diagnostics that point at a single character.
pub fn caret(line: &str, column: usize) -> String {
    format!("{line}\n{}^", " ".repeat(column))
}

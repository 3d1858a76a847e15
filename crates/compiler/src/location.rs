//! Source locations for diagnostics.
//!
//! Every token and every AST node carries one of these. Line and column
//! are stored 0-indexed (convenient while scanning) and rendered
//! 1-indexed (friendlier for a human staring at an editor).

use std::fmt;

#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// The location fixture tests reach for when they want to compare AST
    /// or token structure without pinning down exact source positions.
    pub fn sentinel() -> Self {
        SourceLocation {
            file: String::new(),
            line: 0,
            column: 0,
        }
    }

    fn is_sentinel(&self) -> bool {
        self.file.is_empty() && self.line == 0 && self.column == 0
    }
}

/// Tolerant of the sentinel location on either side, so tests can build
/// expected ASTs without threading real positions through every node.
impl PartialEq for SourceLocation {
    fn eq(&self, other: &Self) -> bool {
        if self.is_sentinel() || other.is_sentinel() {
            return true;
        }
        self.file == other.file && self.line == other.line && self.column == other.column
    }
}

impl Eq for SourceLocation {}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line + 1, self.column + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_equals_any_real_location() {
        let real = SourceLocation::new("main.vl", 4, 10);
        assert_eq!(real, SourceLocation::sentinel());
        assert_eq!(SourceLocation::sentinel(), real);
    }

    #[test]
    fn two_real_locations_compare_structurally() {
        let a = SourceLocation::new("main.vl", 1, 2);
        let b = SourceLocation::new("main.vl", 1, 2);
        let c = SourceLocation::new("main.vl", 1, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_is_one_indexed() {
        let loc = SourceLocation::new("main.vl", 0, 0);
        assert_eq!(loc.to_string(), "main.vl:1:1");
    }
}

//! The type algebra.
//!
//! `PartialEq` is derived rather than hand-rolled: `Pointer` and
//! `FunctionSignature` wrap their payload in `Box`/`Vec`, so the derived
//! impl already walks the structure recursively. That sidesteps the
//! identity-comparison trap the language this compiler is modeled after
//! fell into, where two structurally identical pointer types compared
//! unequal because they were different objects.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Unit,
    /// Not yet inferred. Never appears in a fully typechecked program;
    /// surviving to codegen is an internal error.
    Unknown,
    /// Internal sentinel used only in builtin operator signatures
    /// (`unary_*`, `unary_&`) where the argument and/or result type
    /// depends on the call site and can't be written down as a single
    /// concrete type.
    Generic,
    Pointer(Box<Type>),
    FunctionSignature {
        args: Vec<Type>,
        return_type: Box<Type>,
    },
}

impl Type {
    pub fn pointer(target: Type) -> Type {
        Type::Pointer(Box::new(target))
    }

    pub fn function(args: Vec<Type>, return_type: Type) -> Type {
        Type::FunctionSignature {
            args,
            return_type: Box::new(return_type),
        }
    }

    pub fn pointer_target(&self) -> Option<&Type> {
        match self {
            Type::Pointer(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::Unit => write!(f, "Unit"),
            Type::Unknown => write!(f, "Unknown"),
            Type::Generic => write!(f, "<generic>"),
            Type::Pointer(target) => write!(f, "{target}*"),
            Type::FunctionSignature { args, return_type } => {
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ") => {return_type}")
            }
        }
    }
}

/// Parses a type annotation's surface syntax: a base name followed by
/// zero or more `*` pointer markers (`Int`, `Int*`, `Int**`, ...).
pub fn type_from_name(name: &str, pointer_depth: usize) -> Option<Type> {
    let base = match name {
        "Int" => Type::Int,
        "Bool" => Type::Bool,
        "Unit" => Type::Unit,
        _ => return None,
    };
    Some((0..pointer_depth).fold(base, |acc, _| Type::pointer(acc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_types_compare_structurally() {
        let a = Type::pointer(Type::Int);
        let b = Type::pointer(Type::Int);
        assert_eq!(a, b);
        assert_ne!(a, Type::pointer(Type::Bool));
    }

    #[test]
    fn nested_pointer_depth_matters() {
        let one = Type::pointer(Type::Int);
        let two = Type::pointer(Type::pointer(Type::Int));
        assert_ne!(one, two);
    }

    #[test]
    fn function_signatures_compare_by_args_and_return() {
        let a = Type::function(vec![Type::Int, Type::Bool], Type::Int);
        let b = Type::function(vec![Type::Int, Type::Bool], Type::Int);
        let c = Type::function(vec![Type::Int], Type::Int);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn type_from_name_applies_pointer_depth() {
        assert_eq!(type_from_name("Int", 0), Some(Type::Int));
        assert_eq!(type_from_name("Int", 2), Some(Type::pointer(Type::pointer(Type::Int))));
        assert_eq!(type_from_name("Nonsense", 0), None);
    }
}

//! Signatures for the operators and intrinsic functions the typechecker
//! treats as pre-declared, as if every program began with their
//! declarations already in scope.
//!
//! `unary_*` and `unary_&` use [`Type::Generic`] as a placeholder: their
//! real argument/result types depend on the call site (dereferencing a
//! `T*` yields a `T`; taking the address of a `T` yields a `T*`), so the
//! typechecker special-cases them instead of trusting this table's
//! return type verbatim. The table still encodes their arity.

use crate::types::Type;

pub fn builtin_signature(name: &str) -> Option<Type> {
    use Type::*;
    Some(match name {
        "+" | "-" | "*" | "/" | "%" => Type::function(vec![Int, Int], Int),
        "<" | "<=" | ">" | ">=" => Type::function(vec![Int, Int], Bool),
        "and" | "or" => Type::function(vec![Bool, Bool], Bool),
        "unary_-" => Type::function(vec![Int], Int),
        "unary_not" => Type::function(vec![Bool], Bool),
        "unary_*" => Type::function(vec![Type::pointer(Generic)], Generic),
        "unary_&" => Type::function(vec![Generic], Type::pointer(Generic)),
        "print_int" => Type::function(vec![Int], Unit),
        "print_bool" => Type::function(vec![Bool], Unit),
        "read_int" => Type::function(vec![], Int),
        _ => return None,
    })
}

/// Names usable as intrinsic function calls (as opposed to operators,
/// which the parser never lexes as a call target).
pub const INTRINSIC_FUNCTIONS: [&str; 3] = ["print_int", "print_bool", "read_int"];

/// Every name the root scope is pre-populated with before a module is
/// checked or lowered. `==`/`!=` are deliberately absent: they're
/// polymorphic, so the typechecker and IR generator special-case them
/// instead of resolving them through this table.
pub const GLOBAL_NAMES: [&str; 18] = [
    "+", "-", "*", "/", "%", "<", "<=", ">", ">=", "and", "or", "unary_-", "unary_not", "unary_*",
    "unary_&", "print_int", "print_bool", "read_int",
];

/// True for any name that resolves to a builtin operator or intrinsic
/// rather than a user-defined local — used to keep these names out of
/// the assembly generator's stack-slot allocation.
pub fn is_global(name: &str) -> bool {
    GLOBAL_NAMES.contains(&name) || name == "==" || name == "!="
}

#[cfg(test)]
mod global_name_tests {
    use super::*;

    #[test]
    fn every_global_name_has_a_signature_except_equality() {
        for name in GLOBAL_NAMES {
            assert!(builtin_signature(name).is_some(), "missing signature for {name}");
        }
    }

    #[test]
    fn is_global_covers_polymorphic_equality_too() {
        assert!(is_global("=="));
        assert!(is_global("!="));
        assert!(is_global("read_int"));
        assert!(!is_global("x1"));
        assert!(!is_global("unit"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_operators_are_int_to_int() {
        assert_eq!(
            builtin_signature("+"),
            Some(Type::function(vec![Type::Int, Type::Int], Type::Int))
        );
    }

    #[test]
    fn comparisons_return_bool() {
        assert_eq!(
            builtin_signature("<"),
            Some(Type::function(vec![Type::Int, Type::Int], Type::Bool))
        );
    }

    #[test]
    fn equality_operators_are_not_in_the_table() {
        assert_eq!(builtin_signature("=="), None);
        assert_eq!(builtin_signature("!="), None);
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(builtin_signature("frobnicate"), None);
    }
}

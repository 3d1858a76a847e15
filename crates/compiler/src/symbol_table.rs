//! A generic stack-of-scopes symbol table.
//!
//! Shared by the typechecker (binding `Type`s), the IR generator
//! (binding IR `Variable`s), and the tree-walking interpreter (binding
//! runtime `Value`s) — each instantiates `SymbolTable<V>` with its own
//! value type rather than duplicating the scoping logic three times.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SymbolError {
    pub name: String,
}

impl std::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "undefined identifier '{}'", self.name)
    }
}

pub struct SymbolTable<V> {
    scopes: Vec<HashMap<String, V>>,
}

impl<V> SymbolTable<V> {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the root scope");
    }

    /// Binds `name` in the innermost scope, shadowing any outer binding.
    pub fn add_local(&mut self, name: impl Into<String>, value: V) {
        self.scopes
            .last_mut()
            .expect("symbol table always has at least one scope")
            .insert(name.into(), value);
    }

    /// Walks outward from the innermost scope looking for `name`. When
    /// found, returns a clone of the current binding, and, if
    /// `rebind` is `Some`, overwrites the binding at the scope where it
    /// was found with the new value. This single operation covers both
    /// plain reads (`rebind: None`) and assignment (`rebind: Some(v)`),
    /// which is what makes `x = x + 1` update the right `x` even when
    /// it was declared in an enclosing scope.
    pub fn require(&mut self, name: &str, rebind: Option<V>) -> Result<V, SymbolError>
    where
        V: Clone,
    {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(existing) = scope.get(name).cloned() {
                if let Some(new_value) = rebind {
                    scope.insert(name.to_string(), new_value);
                }
                return Ok(existing);
            }
        }
        Err(SymbolError {
            name: name.to_string(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&V> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    /// A lexically isolated copy holding only the outermost scope.
    ///
    /// The interpreter uses this when entering a function call: the
    /// callee should see top-level bindings but none of the caller's
    /// transient block-local scopes (the ones a `Block`/`While` pushed
    /// between the module root and the call site).
    pub fn root_snapshot(&self) -> Self
    where
        V: Clone,
    {
        SymbolTable {
            scopes: vec![self.scopes[0].clone()],
        }
    }
}

impl<V> Default for SymbolTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table: SymbolTable<i64> = SymbolTable::new();
        table.add_local("x", 1);
        table.push_scope();
        table.add_local("x", 2);
        assert_eq!(table.lookup("x"), Some(&2));
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(&1));
    }

    #[test]
    fn require_rebinds_at_the_discovery_scope() {
        let mut table: SymbolTable<i64> = SymbolTable::new();
        table.add_local("x", 1);
        table.push_scope();
        // no local `x` here; require should walk out and rebind the outer one
        let old = table.require("x", Some(42)).unwrap();
        assert_eq!(old, 1);
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(&42));
    }

    #[test]
    fn require_missing_name_errors() {
        let mut table: SymbolTable<i64> = SymbolTable::new();
        assert!(table.require("missing", None).is_err());
    }
}

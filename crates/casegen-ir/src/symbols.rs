//! Scoped symbol table.

use crate::types::SymbolEntry;
use std::collections::HashMap;

/// A single scope's bindings.
#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, SymbolEntry>,
    /// Declaration order, used when listing the global scope.
    order: Vec<String>,
}

/// Stack of scopes. Scope 0 is the global scope and never popped.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Number of open scopes; 1 at top level.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Enter a new scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Exit the current scope.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind a symbol in the current scope. Returns the rejected entry if
    /// the name is already bound in that scope.
    pub fn declare(&mut self, entry: SymbolEntry) -> Result<(), SymbolEntry> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(entry);
        };
        if scope.bindings.contains_key(&entry.name) {
            return Err(entry);
        }
        scope.order.push(entry.name.clone());
        scope.bindings.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Look up a symbol, searching from innermost scope.
    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// Global symbols in declaration order.
    pub fn globals(&self) -> impl Iterator<Item = &SymbolEntry> {
        let global = &self.scopes[0];
        global
            .order
            .iter()
            .filter_map(|name| global.bindings.get(name))
    }
}

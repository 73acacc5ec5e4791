//! Scoped symbol table used during compilation.

use std::collections::HashMap;

/// Where a resolved name lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
    /// The name a `let`-bound function gives itself, compiled to
    /// `OpCurrentClosure` so recursion works before the binding exists.
    Function,
}

/// A resolved name: its scope plus its scope-local slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope, linked to its enclosing scope.
///
/// `free_symbols` records, in capture order, the original outer symbols
/// that resolutions in this scope promoted to free variables. Its order is
/// the order of `OpGetFree` indices in the compiled body and the order the
/// enclosing scope pushes captures before `OpClosure`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a nested scope enclosing `outer`.
    pub fn enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Take back the enclosing scope when this one closes.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    /// Define a name in the current scope.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register a builtin at a fixed index. Done once in the outermost
    /// scope, before compilation starts.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Make a `let`-bound function visible to its own body.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolve a name, walking outward through enclosing scopes.
    ///
    /// Globals, builtins and function self-names come back unchanged. A
    /// local or free variable found in an outer scope is promoted to a
    /// free variable of the current scope, which is how the compiler
    /// discovers exactly what each closure must capture.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Function => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define_and_resolve_global() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));
        assert_eq!(
            global.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(global.resolve("missing"), None);
    }

    #[test]
    fn test_resolve_local() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::enclosed(global);
        local.define("c");
        local.define("d");

        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(local.resolve("c"), Some(symbol("c", SymbolScope::Local, 0)));
        assert_eq!(local.resolve("d"), Some(symbol("d", SymbolScope::Local, 1)));
    }

    #[test]
    fn test_resolve_nested_local_promotes_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut first = SymbolTable::enclosed(global);
        first.define("c");
        let mut second = SymbolTable::enclosed(first);
        second.define("e");
        second.define("f");

        assert_eq!(
            second.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(second.resolve("c"), Some(symbol("c", SymbolScope::Free, 0)));
        assert_eq!(second.resolve("e"), Some(symbol("e", SymbolScope::Local, 0)));
        assert_eq!(second.resolve("f"), Some(symbol("f", SymbolScope::Local, 1)));
        assert_eq!(
            second.free_symbols,
            vec![symbol("c", SymbolScope::Local, 0)]
        );
    }

    #[test]
    fn test_free_symbol_order_matches_resolution_order() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut first = SymbolTable::enclosed(global);
        first.define("b");
        first.define("c");
        let mut second = SymbolTable::enclosed(first);

        assert_eq!(second.resolve("c"), Some(symbol("c", SymbolScope::Free, 0)));
        assert_eq!(second.resolve("b"), Some(symbol("b", SymbolScope::Free, 1)));
        assert_eq!(
            second.free_symbols,
            vec![
                symbol("c", SymbolScope::Local, 1),
                symbol("b", SymbolScope::Local, 0),
            ]
        );
        // Resolving again returns the already promoted symbol.
        assert_eq!(second.resolve("c"), Some(symbol("c", SymbolScope::Free, 0)));
        assert_eq!(second.free_symbols.len(), 2);
    }

    #[test]
    fn test_define_builtin_resolves_from_any_depth() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        let first = SymbolTable::enclosed(global);
        let mut second = SymbolTable::enclosed(first);
        assert_eq!(
            second.resolve("len"),
            Some(symbol("len", SymbolScope::Builtin, 0))
        );
        assert!(second.free_symbols.is_empty());
    }

    #[test]
    fn test_define_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("fib");
        assert_eq!(
            global.resolve("fib"),
            Some(symbol("fib", SymbolScope::Function, 0))
        );
    }

    #[test]
    fn test_shadowing_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("a");
        global.define("a");
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
    }

    #[test]
    fn test_into_outer_round_trip() {
        let mut global = SymbolTable::new();
        global.define("a");
        let local = SymbolTable::enclosed(global);
        let global = local.into_outer().expect("has an outer scope");
        assert_eq!(global.num_definitions, 1);
        assert!(SymbolTable::new().into_outer().is_none());
    }
}

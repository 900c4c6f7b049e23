use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::function::Function;

/// Name-keyed lookup of the functions a compiler may call.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    fns: FxHashMap<&'static str, Arc<dyn Function>>,
}

static BUILTINS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::with_builtins);

/// Shared registry holding every builtin.
pub fn builtins() -> &'static FunctionRegistry {
    &BUILTINS
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        crate::builtins::load_builtins(&mut reg);
        reg
    }

    /// Register `f` under its name and aliases, replacing earlier entries.
    pub fn register(&mut self, f: Arc<dyn Function>) {
        for &alias in f.aliases() {
            self.fns.insert(alias, Arc::clone(&f));
        }
        self.fns.insert(f.name(), f);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.fns.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.fns.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("fns", &self.names())
            .finish()
    }
}

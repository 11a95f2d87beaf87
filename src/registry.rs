// Wed Jan 15 2026 - Alex

use crate::memory::Address;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// The host's view of which addresses are code, plus a comment store.
pub trait FunctionRegistry: Send + Sync {
    fn is_code(&self, addr: Address) -> bool;

    /// Records `addr` as a function entry. Returns false if it already was one.
    fn register_function(&self, addr: Address) -> bool;

    fn set_comment(&self, addr: Address, comment: &str);

    fn comment(&self, addr: Address) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    functions: RwLock<HashSet<u64>>,
    comments: RwLock<HashMap<u64, String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions<I: IntoIterator<Item = Address>>(functions: I) -> Self {
        let registry = Self::new();
        registry
            .functions
            .write()
            .extend(functions.into_iter().map(|a| a.as_u64()));
        registry
    }

    pub fn function_count(&self) -> usize {
        self.functions.read().len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.read().len()
    }
}

impl FunctionRegistry for InMemoryRegistry {
    fn is_code(&self, addr: Address) -> bool {
        self.functions.read().contains(&addr.as_u64())
    }

    fn register_function(&self, addr: Address) -> bool {
        self.functions.write().insert(addr.as_u64())
    }

    fn set_comment(&self, addr: Address, comment: &str) {
        self.comments.write().insert(addr.as_u64(), comment.to_string());
    }

    fn comment(&self, addr: Address) -> Option<String> {
        self.comments.read().get(&addr.as_u64()).cloned()
    }
}

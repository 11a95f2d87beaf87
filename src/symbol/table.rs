// Tue Jan 13 2026 - Alex

use crate::memory::Address;
use crate::symbol::{SymbolInfo, SymbolKind, SymbolTable};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Symbol table keyed by name, enumerated in insertion order.
///
/// Several names may share an address; `name_at` reports the first one added.
#[derive(Debug, Default, Clone)]
pub struct SymbolMap {
    symbols: IndexMap<String, SymbolInfo>,
    by_address: HashMap<u64, usize>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol. Returns false when the name is already present.
    pub fn add(&mut self, symbol: SymbolInfo) -> bool {
        if symbol.name().is_empty() || self.symbols.contains_key(symbol.name()) {
            return false;
        }
        let addr = symbol.address().as_u64();
        let (index, _) = self.symbols.insert_full(symbol.name().to_string(), symbol);
        self.by_address.entry(addr).or_insert(index);
        true
    }

    pub fn insert(&mut self, address: u64, name: &str) -> bool {
        self.add(SymbolInfo::new(name, Address::new(address), SymbolKind::Unknown))
    }

    pub fn find(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn find_by_address(&self, address: Address) -> Option<&SymbolInfo> {
        let index = *self.by_address.get(&address.as_u64())?;
        self.symbols.get_index(index).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolTable for SymbolMap {
    fn symbols(&self) -> Vec<(Address, String)> {
        self.symbols
            .values()
            .map(|s| (s.address(), s.name().to_string()))
            .collect()
    }

    fn name_at(&self, address: Address) -> Option<String> {
        self.find_by_address(address).map(|s| s.name().to_string())
    }
}

impl FromIterator<(u64, String)> for SymbolMap {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        let mut map = SymbolMap::new();
        for (addr, name) in iter {
            map.insert(addr, &name);
        }
        map
    }
}

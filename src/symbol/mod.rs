// Tue Jan 13 2026 - Alex

pub mod demangle;
pub mod names;
pub mod symbol_info;
pub mod table;

pub use demangle::{demangle, BuiltinDemangler};
pub use symbol_info::{SymbolInfo, SymbolKind};
pub use table::SymbolMap;

use crate::memory::Address;

/// Read access to the symbols of the analyzed image.
pub trait SymbolTable: Send + Sync {
    /// Every named address, in table order.
    fn symbols(&self) -> Vec<(Address, String)>;

    fn name_at(&self, address: Address) -> Option<String>;
}

pub trait Demangler: Send + Sync {
    fn demangle(&self, mangled: &str) -> Option<String>;
}

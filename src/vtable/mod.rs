// Tue Jan 13 2026 - Alex

pub mod candidates;
pub mod comparison;
pub mod slots;

pub use candidates::{classify_symbol, SymbolClass, SymbolScanner, VTableCandidate};
pub use comparison::{ComparisonEntry, OverrideStatus, VTableComparison};
pub use slots::{SlotScanner, SlotState, SlotSummary, VTableEntry};

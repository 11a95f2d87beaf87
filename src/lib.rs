// Wed Jan 15 2026 - Alex

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod registry;
pub mod report;
pub mod rtti;
pub mod session;
pub mod symbol;
pub mod utils;
pub mod vtable;

#[cfg(test)]
pub mod testing;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use hierarchy::{ClassNode, HierarchySnapshot};
pub use memory::{load_binary, Address, MemoryImage, SegmentedImage};
pub use registry::{FunctionRegistry, InMemoryRegistry};
pub use rtti::{AbiFamily, InheritanceInfo, RttiConfig};
pub use session::{AnalysisSession, CancelToken};
pub use symbol::{BuiltinDemangler, Demangler, SymbolMap, SymbolTable};
pub use vtable::{OverrideStatus, VTableComparison, VTableEntry};

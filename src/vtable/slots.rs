// Tue Jan 13 2026 - Alex

use crate::config::AnalysisConfig;
use crate::memory::{Address, MemoryImage};
use crate::registry::FunctionRegistry;
use crate::rtti::AbiFamily;
use crate::symbol::SymbolTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One valid slot of a vtable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTableEntry {
    /// Position among valid slots; invalid slots do not consume an index
    pub index: usize,
    /// Where the pointer is stored
    pub slot_address: Address,
    /// Where the pointer points
    pub target_address: Address,
    pub is_pure_virtual: bool,
    /// Symbol at the target, if any
    pub function_name: Option<String>,
}

impl fmt::Display for VTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function_name.as_deref().unwrap_or("unknown");
        let pure = if self.is_pure_virtual { " [pure]" } else { "" };
        write!(f, "[{}] {} -> {} {}{}", self.index, self.slot_address, self.target_address, name, pure)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub valid_count: usize,
    pub pure_virtual_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Valid,
    PureVirtual,
    Invalid,
}

/// Walks the pointer slots of vtables.
///
/// A walk starts at the first function slot and ends at the next known
/// vtable, after `consecutive_invalid_threshold` invalid slots in a row, or
/// at `max_vtable_entries` when nothing follows.
pub struct SlotScanner<'a> {
    image: &'a dyn MemoryImage,
    symbols: &'a dyn SymbolTable,
    registry: &'a dyn FunctionRegistry,
    config: &'a AnalysisConfig,
    /// Start addresses of every known vtable, sorted ascending
    boundaries: &'a [Address],
}

impl<'a> SlotScanner<'a> {
    pub fn new(
        image: &'a dyn MemoryImage,
        symbols: &'a dyn SymbolTable,
        registry: &'a dyn FunctionRegistry,
        config: &'a AnalysisConfig,
        boundaries: &'a [Address],
    ) -> Self {
        Self {
            image,
            symbols,
            registry,
            config,
            boundaries,
        }
    }

    fn pointer_size(&self) -> u64 {
        self.image.pointer_size() as u64
    }

    /// First function slot. MSVC vtables start at their symbol; Itanium ones
    /// carry an offset-to-top and typeinfo header first.
    pub fn start_slot(&self, vtable: Address, abi: AbiFamily) -> usize {
        if abi == AbiFamily::Msvc {
            return 0;
        }

        let ps = self.pointer_size();
        (0..self.config.start_slot_probe_depth)
            .find(|&i| {
                let slot = vtable + i as u64 * ps;
                self.image.is_mapped(slot)
                    && self
                        .image
                        .read_ptr(slot)
                        .map_or(false, |target| self.image.is_executable(target))
            })
            .unwrap_or(self.config.default_itanium_start_slot)
    }

    pub fn next_boundary(&self, vtable: Address) -> Option<Address> {
        let idx = self.boundaries.partition_point(|b| *b <= vtable);
        self.boundaries.get(idx).copied()
    }

    fn slot_limit(&self, vtable: Address) -> usize {
        let max = self.config.max_vtable_entries;
        match self.next_boundary(vtable) {
            Some(next) => (((next - vtable) as u64 / self.pointer_size()) as usize).min(max),
            None => max,
        }
    }

    pub fn classify_target(&self, target: Address) -> SlotState {
        if target.is_null() || !self.image.is_mapped(target) {
            return SlotState::Invalid;
        }

        let name = self.symbols.name_at(target);
        if let Some(name) = name.as_deref() {
            if self.config.is_pure_virtual_name(name) {
                return SlotState::PureVirtual;
            }
            if name.contains("_ZTI") || name.contains("typeinfo") {
                return SlotState::Invalid;
            }
        }

        if !self.image.is_executable(target) {
            return SlotState::Invalid;
        }

        if self.registry.is_code(target) {
            return SlotState::Valid;
        }

        if name.as_deref().map_or(false, |n| self.config.has_function_prefix(n)) {
            return SlotState::Valid;
        }

        match self.image.read_u8(target) {
            Ok(byte) if self.config.prologue_opcodes.contains(&byte) => SlotState::Valid,
            _ => SlotState::Invalid,
        }
    }

    /// The single walk behind every output mode. Returns the start slot.
    fn walk(&self, vtable: Address, abi: AbiFamily, mut visit: impl FnMut(&VTableEntry)) -> usize {
        let ps = self.pointer_size();
        let start = self.start_slot(vtable, abi);
        let limit = self.slot_limit(vtable);

        let mut index = 0;
        let mut invalid_run = 0;

        for slot_no in start..limit {
            let slot = vtable + slot_no as u64 * ps;

            if slot != vtable && self.boundaries.binary_search(&slot).is_ok() {
                break;
            }

            let state = match self.image.read_ptr(slot) {
                Ok(target) => (target, self.classify_target(target)),
                Err(_) => (Address::zero(), SlotState::Invalid),
            };

            match state {
                (_, SlotState::Invalid) => {
                    invalid_run += 1;
                    if invalid_run >= self.config.consecutive_invalid_threshold {
                        break;
                    }
                }
                (target, valid) => {
                    invalid_run = 0;
                    let entry = VTableEntry {
                        index,
                        slot_address: slot,
                        target_address: target,
                        is_pure_virtual: valid == SlotState::PureVirtual,
                        function_name: self.symbols.name_at(target),
                    };
                    visit(&entry);
                    index += 1;
                }
            }
        }

        start
    }

    pub fn summary(&self, vtable: Address, abi: AbiFamily) -> SlotSummary {
        let mut summary = SlotSummary::default();
        self.walk(vtable, abi, |entry| {
            summary.valid_count += 1;
            if entry.is_pure_virtual {
                summary.pure_virtual_count += 1;
            }
        });
        summary
    }

    pub fn entries(&self, vtable: Address, abi: AbiFamily) -> Vec<VTableEntry> {
        let mut entries = Vec::new();
        self.walk(vtable, abi, |entry| entries.push(entry.clone()));
        entries
    }

    /// Comments every valid slot with its index and byte offset and registers
    /// unclassified targets as functions. Returns the number of slots annotated.
    pub fn annotate(&self, vtable: Address, abi: AbiFamily) -> usize {
        let ps = self.pointer_size() as usize;
        let mut pending = Vec::new();
        let start = self.walk(vtable, abi, |entry| {
            pending.push((entry.index, entry.slot_address, entry.target_address));
        });

        for (index, slot, target) in &pending {
            if !self.registry.is_code(*target) && self.registry.register_function(*target) {
                log::trace!("Registered function at {}", target);
            }
            let offset = (start + index) * ps;
            self.registry
                .set_comment(*slot, &format!("index: {} | offset: {}", index, offset));
        }

        pending.len()
    }
}

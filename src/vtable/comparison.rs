// Wed Jan 15 2026 - Alex

use crate::memory::Address;
use crate::vtable::VTableEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideStatus {
    Inherited,
    Overridden,
    NewVirtual,
    PureToImpl,
    ImplToPure,
}

impl OverrideStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OverrideStatus::Inherited => "Inherited",
            OverrideStatus::Overridden => "Overridden",
            OverrideStatus::NewVirtual => "New Virtual",
            OverrideStatus::PureToImpl => "Pure→Impl",
            OverrideStatus::ImplToPure => "Impl→Pure",
        }
    }

    /// Pure transitions replace the base slot, so they count as overrides.
    pub fn is_override(&self) -> bool {
        matches!(
            self,
            OverrideStatus::Overridden | OverrideStatus::PureToImpl | OverrideStatus::ImplToPure
        )
    }

    fn classify(base: Option<&VTableEntry>, derived: &VTableEntry) -> Self {
        let base = match base {
            Some(base) => base,
            None => return OverrideStatus::NewVirtual,
        };

        if base.target_address == derived.target_address {
            return OverrideStatus::Inherited;
        }

        match (base.is_pure_virtual, derived.is_pure_virtual) {
            (true, false) => OverrideStatus::PureToImpl,
            (false, true) => OverrideStatus::ImplToPure,
            _ => OverrideStatus::Overridden,
        }
    }
}

impl fmt::Display for OverrideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub index: usize,
    pub base: Option<VTableEntry>,
    pub derived: VTableEntry,
    pub status: OverrideStatus,
}

/// Slot-by-slot alignment of a derived vtable against one of its bases.
///
/// Driven by the derived side: base slots past the end of the derived
/// vtable are never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTableComparison {
    pub derived_class: String,
    pub base_class: String,
    pub derived_vtable: Option<Address>,
    pub base_vtable: Option<Address>,
    pub entries: Vec<ComparisonEntry>,
    pub inherited_count: usize,
    pub overridden_count: usize,
    pub new_virtual_count: usize,
}

impl VTableComparison {
    pub fn new(derived_class: impl Into<String>, base_class: impl Into<String>) -> Self {
        Self {
            derived_class: derived_class.into(),
            base_class: base_class.into(),
            derived_vtable: None,
            base_vtable: None,
            entries: Vec::new(),
            inherited_count: 0,
            overridden_count: 0,
            new_virtual_count: 0,
        }
    }

    pub fn with_vtables(mut self, derived: Option<Address>, base: Option<Address>) -> Self {
        self.derived_vtable = derived;
        self.base_vtable = base;
        self
    }

    pub fn from_entries(
        derived_class: impl Into<String>,
        base_class: impl Into<String>,
        derived: &[VTableEntry],
        base: &[VTableEntry],
    ) -> Self {
        let mut comparison = Self::new(derived_class, base_class);
        comparison.align(derived, base);
        comparison
    }

    fn align(&mut self, derived: &[VTableEntry], base: &[VTableEntry]) {
        let by_index: HashMap<usize, &VTableEntry> = base.iter().map(|e| (e.index, e)).collect();

        self.entries = derived
            .iter()
            .map(|d| {
                let b = by_index.get(&d.index).copied();
                ComparisonEntry {
                    index: d.index,
                    base: b.cloned(),
                    derived: d.clone(),
                    status: OverrideStatus::classify(b, d),
                }
            })
            .collect();

        self.inherited_count = self.count_where(|s| s == OverrideStatus::Inherited);
        self.overridden_count = self.count_where(|s| s.is_override());
        self.new_virtual_count = self.count_where(|s| s == OverrideStatus::NewVirtual);
    }

    fn count_where(&self, pred: impl Fn(OverrideStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e.status)).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn status_at(&self, index: usize) -> Option<OverrideStatus> {
        self.entries.iter().find(|e| e.index == index).map(|e| e.status)
    }
}

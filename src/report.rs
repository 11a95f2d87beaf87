// Tue Jan 13 2026 - Alex

//! Plain-text and JSON renderings of hierarchy and comparison results.

use crate::hierarchy::{ClassNode, HierarchySnapshot};
use crate::vtable::{VTableComparison, VTableEntry};
use serde::{Deserialize, Serialize};
use serde_json::{to_string, to_string_pretty};

/// `Name  0x1000  funcs: 3  pure: 0  parent: Base (+1)`
pub fn summary_line(node: &ClassNode) -> String {
    let address = match (node.vtable_address, node.forwarded_address) {
        (Some(vt), _) => vt.to_string(),
        (None, Some(fwd)) => format!("~{}", fwd),
        (None, None) => "-".to_string(),
    };

    let parent = match node.primary_base() {
        Some(base) if node.base_classes.len() > 1 => {
            format!("{} (+{})", base, node.base_classes.len() - 1)
        }
        Some(base) => base.to_string(),
        None => "(root)".to_string(),
    };

    format!(
        "{}  {}  funcs: {}  pure: {}  parent: {}",
        node.class_name, address, node.func_count, node.pure_virtual_count, parent
    )
}

pub fn entry_line(entry: &VTableEntry) -> String {
    let name = entry.function_name.as_deref().unwrap_or("?");
    let pure = if entry.is_pure_virtual { "  [pure]" } else { "" };
    format!(
        "{:>4}  {}  -> {}  {}{}",
        entry.index, entry.slot_address, entry.target_address, name, pure
    )
}

pub fn comparison_lines(comparison: &VTableComparison) -> Vec<String> {
    let mut lines: Vec<String> = comparison
        .entries
        .iter()
        .map(|e| {
            let base = e
                .base
                .as_ref()
                .map_or_else(|| "-".to_string(), |b| b.target_address.to_string());
            format!(
                "{:>4}  {:<12}  {}  {}",
                e.index,
                e.status.label(),
                base,
                e.derived.target_address
            )
        })
        .collect();

    lines.push(format!(
        "{} vs {}: {} inherited, {} overridden, {} new",
        comparison.derived_class,
        comparison.base_class,
        comparison.inherited_count,
        comparison.overridden_count,
        comparison.new_virtual_count
    ));
    lines
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyStatistics {
    pub version: u64,
    pub classes: usize,
    pub synthetic: usize,
    pub roots: usize,
    pub abstract_classes: usize,
    pub multiple_inheritance: usize,
    pub virtual_inheritance: usize,
    pub total_functions: usize,
}

impl HierarchyStatistics {
    pub fn collect(snapshot: &HierarchySnapshot) -> Self {
        let nodes = snapshot.nodes();
        let real = || nodes.iter().filter(|n| !n.is_synthetic);

        Self {
            version: snapshot.version(),
            classes: nodes.len(),
            synthetic: nodes.iter().filter(|n| n.is_synthetic).count(),
            roots: snapshot.roots().count(),
            abstract_classes: real().filter(|n| n.is_abstract()).count(),
            multiple_inheritance: nodes.iter().filter(|n| n.has_multiple_inheritance).count(),
            virtual_inheritance: nodes.iter().filter(|n| n.has_virtual_inheritance).count(),
            total_functions: real().map(|n| n.func_count).sum(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Classes:              {}", self.classes),
            format!("Synthetic:            {}", self.synthetic),
            format!("Roots:                {}", self.roots),
            format!("Abstract:             {}", self.abstract_classes),
            format!("Multiple inheritance: {}", self.multiple_inheritance),
            format!("Virtual inheritance:  {}", self.virtual_inheritance),
            format!("Virtual functions:    {}", self.total_functions),
        ]
    }
}

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        to_string_pretty(value)
    } else {
        to_string(value)
    }
}

// Tue Jan 13 2026 - Alex

use crate::hierarchy::{ClassNode, HierarchySnapshot};
use crate::memory::Address;
use crate::rtti::{BaseClassInfo, InheritanceInfo, RttiStatus};
use crate::vtable::{SlotSummary, VTableCandidate};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Everything learned about one vtable-backed class during a refresh.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub candidate: VTableCandidate,
    pub inheritance: Arc<InheritanceInfo>,
    pub slots: SlotSummary,
}

impl ClassRecord {
    fn into_node(self) -> ClassNode {
        let info = self.inheritance;
        let mut node = ClassNode::new(&self.candidate.class_name, self.candidate.abi)
            .with_vtable(self.candidate.address)
            .with_counts(self.slots.valid_count, self.slots.pure_virtual_count);
        node.base_classes = info.base_classes.clone();
        node.has_multiple_inheritance = info.has_multiple_inheritance;
        node.has_virtual_inheritance = info.has_virtual_inheritance;
        node.rtti_status = info.status.clone();
        node.confidence = info.confidence;
        node
    }
}

/// Collects real classes, then fills in the bases the compiler left without
/// a vtable of their own.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    nodes: Vec<ClassNode>,
    names: HashSet<String>,
    vtables: HashSet<u64>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: ClassRecord) -> bool {
        self.add_node(record.into_node())
    }

    /// Adds a vtable-backed class. Later duplicates of a name or vtable are
    /// dropped.
    pub fn add_node(&mut self, node: ClassNode) -> bool {
        if self.names.contains(&node.class_name) {
            log::debug!("Duplicate class {} ignored", node.class_name);
            return false;
        }
        if let Some(vt) = node.vtable_address {
            if !self.vtables.insert(vt.as_u64()) {
                log::debug!("Vtable {} already claimed, dropping {}", vt, node.class_name);
                return false;
            }
        }
        self.names.insert(node.class_name.clone());
        self.nodes.push(node);
        true
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn build(self, version: u64) -> HierarchySnapshot {
        let real: HashMap<&str, &ClassNode> = self
            .nodes
            .iter()
            .map(|n| (n.class_name.as_str(), n))
            .collect();

        let synthetic = Self::synthesize(&self.nodes, &real);
        let reverse = Self::reverse_index(&self.nodes);

        let mut all: Vec<ClassNode> = self.nodes.iter().cloned().chain(synthetic).collect();
        for node in &mut all {
            if let Some(derived) = reverse.get(node.class_name.as_str()) {
                node.derived_classes = derived.iter().map(|s| s.to_string()).collect();
            }
        }
        all.sort_by(|a, b| a.class_name.cmp(&b.class_name));

        log::debug!(
            "Hierarchy v{}: {} real, {} total classes",
            version,
            self.nodes.len(),
            all.len()
        );
        HierarchySnapshot::from_nodes(version, all)
    }

    /// One node per distinct base name that has no vtable. Each forwards to
    /// the first real class after it in the base list that introduced it.
    fn synthesize(nodes: &[ClassNode], real: &HashMap<&str, &ClassNode>) -> Vec<ClassNode> {
        let mut created: HashSet<&str> = HashSet::new();
        let mut synthetic = Vec::new();

        for node in nodes {
            for (i, base) in node.base_classes.iter().enumerate() {
                let name = base.class_name.as_str();
                if real.contains_key(name) || !created.insert(name) {
                    continue;
                }

                let ancestor = node.base_classes[i + 1..]
                    .iter()
                    .find_map(|b| real.get(b.class_name.as_str()).copied());

                let mut synth = ClassNode::new(name, node.abi);
                synth.is_synthetic = true;
                synth.rtti_status = RttiStatus::NotFound;
                if let Some(ancestor) = ancestor {
                    synth.forwarded_address = ancestor.vtable_address;
                    synth.func_count = ancestor.func_count;
                    synth.pure_virtual_count = ancestor.pure_virtual_count;
                    synth.base_classes.push(BaseClassInfo::new(ancestor.class_name.as_str()));
                }

                log::trace!(
                    "Synthetic class {} (from {}, forwards to {})",
                    name,
                    node.class_name,
                    synth.forwarded_address.map_or_else(|| "nothing".to_string(), |a: Address| a.to_string())
                );
                synthetic.push(synth);
            }
        }

        synthetic
    }

    fn reverse_index(nodes: &[ClassNode]) -> HashMap<&str, BTreeSet<&str>> {
        let mut reverse: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for node in nodes {
            for base in &node.base_classes {
                reverse
                    .entry(base.class_name.as_str())
                    .or_default()
                    .insert(node.class_name.as_str());
            }
        }
        reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtti::AbiFamily;

    fn real(name: &str, vt: u64, bases: &[&str]) -> ClassNode {
        bases.iter().fold(
            ClassNode::new(name, AbiFamily::Msvc)
                .with_vtable(Address::new(vt))
                .with_counts(4, 1),
            |node, b| node.with_base(BaseClassInfo::new(*b)),
        )
    }

    #[test]
    fn test_one_synthetic_node_per_missing_base() {
        let mut builder = HierarchyBuilder::new();
        builder.add_node(real("Base", 0x1000, &[]));
        builder.add_node(real("Left", 0x2000, &["Hidden", "Base"]));
        builder.add_node(real("Right", 0x3000, &["Hidden", "Base"]));
        let snap = builder.build(1);

        let hidden: Vec<&ClassNode> = snap.nodes().iter().filter(|n| n.is_synthetic).collect();
        assert_eq!(hidden.len(), 1);

        let hidden = hidden[0];
        assert_eq!(hidden.class_name, "Hidden");
        assert!(hidden.vtable_address.is_none());
        assert_eq!(hidden.forwarded_address, Some(Address::new(0x1000)));
        assert_eq!(hidden.func_count, 4);
        assert_eq!(hidden.primary_base(), Some("Base"));
        assert_eq!(hidden.derived_classes.len(), 2);
        assert_eq!(hidden.effective_vtable(), Some(Address::new(0x1000)));
    }

    #[test]
    fn test_synthetic_without_real_ancestor() {
        let mut builder = HierarchyBuilder::new();
        builder.add_node(real("Leaf", 0x1000, &["Gone"]));
        let snap = builder.build(1);

        let gone = snap.get("Gone").unwrap();
        assert!(gone.is_synthetic);
        assert!(gone.forwarded_address.is_none());
        assert!(gone.is_root());
        assert_eq!(snap.descendants("Gone").unwrap().len(), 1);
    }

    #[test]
    fn test_ancestors_terminate_on_cycle() {
        let mut builder = HierarchyBuilder::new();
        builder.add_node(real("A", 0x1000, &["Missing", "B"]));
        builder.add_node(real("B", 0x2000, &["A"]));
        let snap = builder.build(1);

        let ancestors = snap.ancestors("Missing").unwrap();
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains("A"));
        assert!(ancestors.contains("B"));

        let from_a = snap.ancestors("A").unwrap();
        assert!(!from_a.contains("A"));
        assert_eq!(from_a.len(), 2);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut builder = HierarchyBuilder::new();
        assert!(builder.add_node(real("A", 0x1000, &[])));
        assert!(!builder.add_node(real("A", 0x2000, &[])));
        assert!(!builder.add_node(real("B", 0x1000, &[])));
        assert_eq!(builder.len(), 1);
    }
}

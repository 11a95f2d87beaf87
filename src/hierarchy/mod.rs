// Tue Jan 13 2026 - Alex

//! Class graph assembled from vtable symbols, parsed RTTI and slot scans.

pub mod builder;

pub use builder::{ClassRecord, HierarchyBuilder};

use crate::memory::Address;
use crate::rtti::{AbiFamily, BaseClassInfo, Confidence, RttiStatus};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

pub type NodeId = usize;

/// One class in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    pub class_name: String,
    /// Absent for synthetic nodes
    pub vtable_address: Option<Address>,
    pub abi: AbiFamily,
    pub func_count: usize,
    pub pure_virtual_count: usize,
    /// Ordered; index 0 is the primary base
    pub base_classes: Vec<BaseClassInfo>,
    pub derived_classes: BTreeSet<String>,
    pub has_multiple_inheritance: bool,
    pub has_virtual_inheritance: bool,
    pub is_synthetic: bool,
    /// Synthetic nodes only: vtable of the nearest real ancestor
    pub forwarded_address: Option<Address>,
    pub rtti_status: RttiStatus,
    pub confidence: Confidence,
}

impl ClassNode {
    pub fn new(class_name: &str, abi: AbiFamily) -> Self {
        Self {
            class_name: class_name.to_string(),
            vtable_address: None,
            abi,
            func_count: 0,
            pure_virtual_count: 0,
            base_classes: Vec::new(),
            derived_classes: BTreeSet::new(),
            has_multiple_inheritance: false,
            has_virtual_inheritance: false,
            is_synthetic: false,
            forwarded_address: None,
            rtti_status: RttiStatus::NotFound,
            confidence: Confidence::Validated,
        }
    }

    pub fn with_vtable(mut self, vtable: Address) -> Self {
        self.vtable_address = Some(vtable);
        self
    }

    pub fn with_counts(mut self, func_count: usize, pure_virtual_count: usize) -> Self {
        self.func_count = func_count;
        self.pure_virtual_count = pure_virtual_count;
        self
    }

    pub fn with_base(mut self, base: BaseClassInfo) -> Self {
        self.base_classes.push(base);
        self
    }

    /// Address used for slot queries: own vtable, or the forwarded one.
    pub fn effective_vtable(&self) -> Option<Address> {
        self.vtable_address.or(self.forwarded_address)
    }

    pub fn primary_base(&self) -> Option<&str> {
        self.base_classes.first().map(|b| b.class_name.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.base_classes.is_empty()
    }

    pub fn is_abstract(&self) -> bool {
        self.pure_virtual_count > 0
    }
}

impl fmt::Display for ClassNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class_name)?;
        match (self.vtable_address, self.forwarded_address) {
            (Some(vt), _) => write!(f, " (vtable: {})", vt)?,
            (None, Some(fwd)) => write!(f, " (synthetic -> {})", fwd)?,
            (None, None) => write!(f, " (synthetic)")?,
        }
        if self.is_abstract() {
            write!(f, " [abstract]")?;
        }
        Ok(())
    }
}

/// Immutable, versioned view of the class graph. Rebuilt as a whole on
/// refresh and swapped in atomically by the session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchySnapshot {
    version: u64,
    /// Sorted by class name; a node's position is its id
    nodes: Vec<ClassNode>,
    #[serde(skip)]
    by_name: HashMap<String, NodeId>,
    #[serde(skip)]
    by_vtable: HashMap<u64, NodeId>,
    /// Edges used for ancestor walks; synthetic nodes have at most one
    #[serde(skip)]
    parents: Vec<Vec<NodeId>>,
    #[serde(skip)]
    children: Vec<Vec<NodeId>>,
    #[serde(skip)]
    vtables: Vec<Address>,
}

impl HierarchySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Indexes `nodes`, which must already be sorted and unique by name.
    pub(crate) fn from_nodes(version: u64, nodes: Vec<ClassNode>) -> Self {
        let by_name: HashMap<String, NodeId> = nodes
            .iter()
            .enumerate()
            .map(|(id, n)| (n.class_name.clone(), id))
            .collect();

        let by_vtable: HashMap<u64, NodeId> = nodes
            .iter()
            .enumerate()
            .filter_map(|(id, n)| n.vtable_address.map(|vt| (vt.as_u64(), id)))
            .collect();

        let parents = nodes
            .iter()
            .map(|n| {
                n.base_classes
                    .iter()
                    .filter_map(|b| by_name.get(&b.class_name).copied())
                    .collect()
            })
            .collect();

        let children = nodes
            .iter()
            .map(|n| {
                n.derived_classes
                    .iter()
                    .filter_map(|d| by_name.get(d).copied())
                    .collect()
            })
            .collect();

        let mut vtables: Vec<Address> = nodes.iter().filter_map(|n| n.vtable_address).collect();
        vtables.sort();

        Self {
            version,
            nodes,
            by_name,
            by_vtable,
            parents,
            children,
            vtables,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ClassNode] {
        &self.nodes
    }

    pub fn at(&self, index: usize) -> Option<&ClassNode> {
        self.nodes.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&ClassNode> {
        self.id_of(name).map(|id| &self.nodes[id])
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn by_vtable(&self, vtable: Address) -> Option<&ClassNode> {
        self.by_vtable.get(&vtable.as_u64()).map(|&id| &self.nodes[id])
    }

    /// Start addresses of every real vtable, ascending.
    pub fn vtable_addresses(&self) -> &[Address] {
        &self.vtables
    }

    pub fn roots(&self) -> impl Iterator<Item = &ClassNode> {
        self.nodes.iter().filter(|n| n.is_root())
    }

    /// Transitive bases of `name`, nearest first. `None` for unknown names.
    pub fn ancestors(&self, name: &str) -> Option<IndexSet<String>> {
        let start = self.id_of(name)?;
        Some(self.closure(start, &self.parents))
    }

    /// Transitive derived classes of `name`, nearest first.
    pub fn descendants(&self, name: &str) -> Option<IndexSet<String>> {
        let start = self.id_of(name)?;
        Some(self.closure(start, &self.children))
    }

    fn closure(&self, start: NodeId, edges: &[Vec<NodeId>]) -> IndexSet<String> {
        let mut seen = vec![false; self.nodes.len()];
        let mut result = IndexSet::new();
        let mut queue = VecDeque::from([start]);
        seen[start] = true;

        while let Some(id) = queue.pop_front() {
            for &next in &edges[id] {
                if seen[next] {
                    continue;
                }
                seen[next] = true;
                result.insert(self.nodes[next].class_name.clone());
                queue.push_back(next);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> HierarchySnapshot {
        let mut builder = HierarchyBuilder::new();
        builder.add_node(
            ClassNode::new("Animal", AbiFamily::Itanium)
                .with_vtable(Address::new(0x1000))
                .with_counts(2, 1),
        );
        builder.add_node(
            ClassNode::new("Dog", AbiFamily::Itanium)
                .with_vtable(Address::new(0x2000))
                .with_base(BaseClassInfo::new("Animal")),
        );
        builder.add_node(
            ClassNode::new("Puppy", AbiFamily::Itanium)
                .with_vtable(Address::new(0x3000))
                .with_base(BaseClassInfo::new("Dog")),
        );
        builder.build(1)
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let snap = snapshot();
        let ancestors: Vec<String> = snap.ancestors("Puppy").unwrap().into_iter().collect();
        assert_eq!(ancestors, vec!["Dog", "Animal"]);

        let descendants = snap.descendants("Animal").unwrap();
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains("Puppy"));
        assert!(snap.ancestors("Nope").is_none());
    }

    #[test]
    fn test_lookup_and_order() {
        let snap = snapshot();
        assert_eq!(snap.version(), 1);
        assert_eq!(snap.at(0).map(|n| n.class_name.as_str()), Some("Animal"));
        assert_eq!(snap.by_vtable(Address::new(0x2000)).map(|n| n.class_name.as_str()), Some("Dog"));
        assert_eq!(snap.vtable_addresses().len(), 3);
        assert_eq!(snap.roots().count(), 1);
        assert!(snap.get("Animal").unwrap().is_abstract());
    }
}

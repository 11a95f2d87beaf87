// Wed Jan 15 2026 - Alex

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::hierarchy::{ClassNode, ClassRecord, HierarchyBuilder, HierarchySnapshot};
use crate::memory::{Address, MemoryImage};
use crate::registry::{FunctionRegistry, InMemoryRegistry};
use crate::rtti::{RttiCache, RttiConfig, RttiContext, RttiDetector, RttiReader, RttiStrategy};
use crate::symbol::{BuiltinDemangler, Demangler, SymbolTable};
use crate::utils::logging::ScopedTimer;
use crate::vtable::{SlotScanner, SymbolScanner, VTableComparison, VTableEntry};
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked once per vtable during a refresh.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Analysis state for one image.
///
/// Holds the RTTI layout cache, the per-vtable parse memo and the current
/// hierarchy snapshot. Queries read the snapshot published by the last
/// successful refresh; a refresh builds a new one off to the side and swaps
/// it in only once complete.
pub struct AnalysisSession {
    image: Arc<dyn MemoryImage>,
    symbols: Arc<dyn SymbolTable>,
    demangler: Arc<dyn Demangler>,
    registry: Arc<dyn FunctionRegistry>,
    config: AnalysisConfig,
    rtti: RttiCache,
    snapshot: RwLock<Arc<HierarchySnapshot>>,
    version: AtomicU64,
}

impl AnalysisSession {
    pub fn new(image: Arc<dyn MemoryImage>, symbols: Arc<dyn SymbolTable>) -> Self {
        Self {
            image,
            symbols,
            demangler: Arc::new(BuiltinDemangler),
            registry: Arc::new(InMemoryRegistry::new()),
            config: AnalysisConfig::default(),
            rtti: RttiCache::new(),
            snapshot: RwLock::new(Arc::new(HierarchySnapshot::empty())),
            version: AtomicU64::new(0),
        }
    }

    pub fn with_demangler(mut self, demangler: Arc<dyn Demangler>) -> Self {
        self.demangler = demangler;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn FunctionRegistry> {
        &self.registry
    }

    pub fn rtti_config(&self) -> Option<RttiConfig> {
        self.rtti.config()
    }

    pub fn parsed_count(&self) -> usize {
        self.rtti.parsed_count()
    }

    pub fn snapshot(&self) -> Arc<HierarchySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn rtti_context(&self) -> RttiContext<'_> {
        RttiContext {
            image: self.image.as_ref(),
            symbols: self.symbols.as_ref(),
            demangler: self.demangler.as_ref(),
            config: &self.config,
        }
    }

    pub fn refresh_hierarchy(&self) -> Result<Arc<HierarchySnapshot>> {
        self.refresh_hierarchy_with(&CancelToken::new(), |_, _| {})
    }

    /// Rebuilds the class graph from scratch. `progress` receives
    /// `(done, total)` after each vtable. On cancellation the previous
    /// snapshot stays published.
    pub fn refresh_hierarchy_with(
        &self,
        cancel: &CancelToken,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<Arc<HierarchySnapshot>> {
        let _timer = ScopedTimer::new("hierarchy refresh");
        let ctx = self.rtti_context();

        let candidates =
            SymbolScanner::new(self.symbols.as_ref(), self.demangler.as_ref(), &self.config).scan();
        log::info!("Scanning {} vtables", candidates.len());

        let mut boundaries: Vec<Address> = candidates.iter().map(|c| c.address).collect();
        boundaries.sort();
        boundaries.dedup();

        let slots = SlotScanner::new(
            self.image.as_ref(),
            self.symbols.as_ref(),
            self.registry.as_ref(),
            &self.config,
            &boundaries,
        );

        let total = candidates.len();
        let mut builder = HierarchyBuilder::new();

        for (done, candidate) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Hierarchy refresh cancelled after {} of {} vtables", done, total);
                return Err(AnalysisError::Cancelled);
            }

            let layout = self
                .rtti
                .config_or_detect(|| RttiDetector::new(ctx).detect(candidate.address));
            let inheritance = self.rtti.get_or_parse(candidate.address, || {
                RttiStrategy::for_config(ctx, layout).parse_rtti_at(candidate.address, &candidate.class_name)
            });
            if !inheritance.is_parsed() {
                log::debug!(
                    "{}: RTTI {}",
                    candidate.class_name,
                    inheritance.status.describe()
                );
            }

            let summary = slots.summary(candidate.address, candidate.abi);
            builder.add_record(ClassRecord {
                candidate,
                inheritance,
                slots: summary,
            });
            progress(done + 1, total);
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(builder.build(version));
        *self.snapshot.write() = Arc::clone(&snapshot);
        log::info!("Hierarchy v{} published with {} classes", version, snapshot.len());

        Ok(snapshot)
    }

    pub fn list_classes(&self) -> Vec<ClassNode> {
        self.snapshot().nodes().to_vec()
    }

    pub fn class_at(&self, index: usize) -> Result<ClassNode> {
        let snapshot = self.snapshot();
        snapshot.at(index).cloned().ok_or(AnalysisError::IndexOutOfBounds {
            index,
            len: snapshot.len(),
        })
    }

    pub fn class(&self, name: &str) -> Result<ClassNode> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownClass(name.to_string()))
    }

    fn with_slots<T>(&self, snapshot: &HierarchySnapshot, f: impl FnOnce(&SlotScanner<'_>) -> T) -> T {
        let scanner = SlotScanner::new(
            self.image.as_ref(),
            self.symbols.as_ref(),
            self.registry.as_ref(),
            &self.config,
            snapshot.vtable_addresses(),
        );
        f(&scanner)
    }

    /// Valid slots of a class's vtable. Synthetic classes report the slots
    /// of the ancestor they forward to.
    pub fn get_entries(&self, class: &str) -> Result<Vec<VTableEntry>> {
        let snapshot = self.snapshot();
        let node = snapshot
            .get(class)
            .ok_or_else(|| AnalysisError::UnknownClass(class.to_string()))?;

        Ok(match node.effective_vtable() {
            Some(vt) => self.with_slots(&snapshot, |s| s.entries(vt, node.abi)),
            None => Vec::new(),
        })
    }

    pub fn compare(&self, derived: &str, base: &str) -> Result<VTableComparison> {
        let snapshot = self.snapshot();
        let derived_node = snapshot
            .get(derived)
            .ok_or_else(|| AnalysisError::UnknownClass(derived.to_string()))?;
        let base_node = snapshot
            .get(base)
            .ok_or_else(|| AnalysisError::UnknownClass(base.to_string()))?;

        let derived_entries = self.get_entries(derived)?;
        let base_entries = self.get_entries(base)?;

        Ok(VTableComparison::from_entries(derived, base, &derived_entries, &base_entries)
            .with_vtables(derived_node.effective_vtable(), base_node.effective_vtable()))
    }

    /// Compares against base 0, if the class has one.
    pub fn compare_with_primary_base(&self, class: &str) -> Result<Option<VTableComparison>> {
        let node = self.class(class)?;
        match node.primary_base() {
            Some(base) => self.compare(class, base).map(Some),
            None => Ok(None),
        }
    }

    pub fn ancestors(&self, class: &str) -> Result<IndexSet<String>> {
        self.snapshot()
            .ancestors(class)
            .ok_or_else(|| AnalysisError::UnknownClass(class.to_string()))
    }

    pub fn descendants(&self, class: &str) -> Result<IndexSet<String>> {
        self.snapshot()
            .descendants(class)
            .ok_or_else(|| AnalysisError::UnknownClass(class.to_string()))
    }

    /// The class itself plus everything above and below it.
    pub fn lineage(&self, class: &str) -> Result<BTreeSet<String>> {
        let mut lineage: BTreeSet<String> = self.ancestors(class)?.into_iter().collect();
        lineage.extend(self.descendants(class)?);
        lineage.insert(class.to_string());
        Ok(lineage)
    }

    /// Comments each valid slot of the class's own vtable and registers new
    /// function targets. Synthetic classes own no slots and annotate nothing.
    pub fn annotate(&self, class: &str) -> Result<usize> {
        let snapshot = self.snapshot();
        let node = snapshot
            .get(class)
            .ok_or_else(|| AnalysisError::UnknownClass(class.to_string()))?;

        let count = match node.vtable_address {
            Some(vt) => self.with_slots(&snapshot, |s| s.annotate(vt, node.abi)),
            None => 0,
        };
        log::debug!("Annotated {} slots of {}", count, class);
        Ok(count)
    }

    pub fn annotate_all(&self) -> usize {
        let snapshot = self.snapshot();
        self.with_slots(&snapshot, |s| {
            snapshot
                .nodes()
                .iter()
                .filter_map(|n| n.vtable_address.map(|vt| s.annotate(vt, n.abi)))
                .sum()
        })
    }

    /// Drops the detected layout, every memoized parse and the published
    /// hierarchy. The next refresh re-detects from scratch.
    pub fn reset(&self) {
        self.rtti.clear();
        *self.snapshot.write() = Arc::new(HierarchySnapshot::empty());
        log::debug!("Session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PointerWidth;
    use crate::rtti::AbiFamily;
    use crate::testing::FixtureBuilder;
    use crate::vtable::OverrideStatus;

    fn itanium_scenario() -> crate::testing::Fixture {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        let f0 = b.function("_ZN4Base2f0Ev");
        let f1 = b.function("_ZN4Base2f1Ev");
        let f1_override = b.function("_ZN7Derived2f1Ev");
        let f2 = b.function("_ZN7Derived2f2Ev");

        let base_ti = b.typeinfo("Base");
        b.itanium_vtable("Base", base_ti, &[f0, f1]);
        let derived_ti = b.typeinfo_si("Derived", "Base");
        b.itanium_vtable("Derived", derived_ti, &[f0, f1_override, f2]);
        b.finish()
    }

    #[test]
    fn test_refresh_and_compare() {
        let fx = itanium_scenario();
        let session = fx.session();
        let snapshot = session.refresh_hierarchy().unwrap();

        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.get("Base").is_some());
        let derived = session.class("Derived").unwrap();
        assert_eq!(derived.primary_base(), Some("Base"));
        assert_eq!(derived.func_count, 3);

        let cmp = session.compare("Derived", "Base").unwrap();
        let statuses: Vec<OverrideStatus> = cmp.entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![OverrideStatus::Inherited, OverrideStatus::Overridden, OverrideStatus::NewVirtual]
        );
        assert_eq!(
            (cmp.inherited_count, cmp.overridden_count, cmp.new_virtual_count),
            (1, 1, 1)
        );

        let primary = session.compare_with_primary_base("Derived").unwrap().unwrap();
        assert_eq!(primary.base_class, "Base");
        assert!(session.compare_with_primary_base("Base").unwrap().is_none());
    }

    #[test]
    fn test_lineage_queries() {
        let fx = itanium_scenario();
        let session = fx.session();
        session.refresh_hierarchy().unwrap();

        assert!(session.ancestors("Derived").unwrap().contains("Base"));
        assert!(session.descendants("Base").unwrap().contains("Derived"));
        let lineage = session.lineage("Base").unwrap();
        assert_eq!(lineage.len(), 2);
        assert!(matches!(
            session.ancestors("Nope"),
            Err(AnalysisError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_unknown_class_and_bad_index() {
        let fx = itanium_scenario();
        let session = fx.session();
        session.refresh_hierarchy().unwrap();

        assert!(matches!(
            session.get_entries("Missing"),
            Err(AnalysisError::UnknownClass(_))
        ));
        assert!(matches!(
            session.class_at(99),
            Err(AnalysisError::IndexOutOfBounds { index: 99, len: 2 })
        ));
        assert_eq!(session.class_at(0).unwrap().class_name, "Base");
    }

    #[test]
    fn test_cancelled_refresh_keeps_previous_snapshot() {
        let fx = itanium_scenario();
        let session = fx.session();
        let first = session.refresh_hierarchy().unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = session.refresh_hierarchy_with(&cancel, |_, _| {});
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert_eq!(session.snapshot().version(), first.version());
        assert_eq!(session.snapshot().len(), 2);
    }

    #[test]
    fn test_progress_and_versions() {
        let fx = itanium_scenario();
        let session = fx.session();
        let mut calls = Vec::new();
        session
            .refresh_hierarchy_with(&CancelToken::new(), |done, total| calls.push((done, total)))
            .unwrap();
        assert_eq!(calls, vec![(1, 2), (2, 2)]);
        assert_eq!(session.refresh_hierarchy().unwrap().version(), 2);
    }

    #[test]
    fn test_reset_clears_caches() {
        let fx = itanium_scenario();
        let session = fx.session();
        session.refresh_hierarchy().unwrap();
        assert!(session.rtti_config().is_some());
        assert_eq!(session.parsed_count(), 2);

        session.reset();
        assert!(session.rtti_config().is_none());
        assert_eq!(session.parsed_count(), 0);
        assert!(session.list_classes().is_empty());

        session.refresh_hierarchy().unwrap();
        assert_eq!(session.list_classes().len(), 2);
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let fx = itanium_scenario();
        let session = fx.session();
        session.refresh_hierarchy().unwrap();

        let before = session.get_entries("Derived").unwrap();
        assert_eq!(session.annotate("Derived").unwrap(), 3);
        let after = session.get_entries("Derived").unwrap();
        assert_eq!(before, after);
        assert_eq!(session.annotate_all(), 5);
        assert!(fx.registry.comment_count() >= 5);
    }

    #[test]
    fn test_msvc_hierarchy_with_synthetic_base() {
        let mut b = FixtureBuilder::msvc(PointerWidth::Bits64);
        let f = b.function("?f@Base@@UEAAXXZ");
        let g = b.function("?g@Leaf@@UEAAXXZ");
        b.msvc_simple_class("Base", &[f]);
        let col = b.msvc_class("Leaf", &[("Middle", 0, false), ("Base", 0, false)], 1);
        b.msvc_vtable("Leaf", col, &[f, g]);
        let fx = b.finish();

        let session = fx.session();
        session.refresh_hierarchy().unwrap();

        let leaf = session.class("Leaf").unwrap();
        assert_eq!(leaf.abi, AbiFamily::Msvc);
        assert_eq!(leaf.base_classes.len(), 2);
        assert!(leaf.has_multiple_inheritance);

        let middle = session.class("Middle").unwrap();
        assert!(middle.is_synthetic);
        assert_eq!(middle.primary_base(), Some("Base"));
        assert_eq!(session.get_entries("Middle").unwrap().len(), 1);
        assert_eq!(session.annotate("Middle").unwrap(), 0);

        let ancestors = session.ancestors("Middle").unwrap();
        assert_eq!(ancestors.into_iter().collect::<Vec<_>>(), vec!["Base"]);
    }
}

// Tue Jan 13 2026 - Alex

use crate::config::AnalysisConfig;
use crate::memory::Address;
use crate::rtti::AbiFamily;
use crate::symbol::names::{
    class_from_demangled_vtable, is_valid_class_name, itanium_vtable_fallback,
    msvc_vtable_fallback, ITANIUM_VTABLE_PREFIX, MSVC_VTABLE_PREFIX,
};
use crate::symbol::{Demangler, SymbolTable};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime-support classes whose vtables describe typeinfo objects, not
/// program classes.
const ABI_RUNTIME_NAMESPACE: &str = "__cxxabiv1::";

/// A symbol that names a vtable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTableCandidate {
    /// Address the symbol points at
    pub address: Address,
    /// Symbol as found in the table
    pub symbol: String,
    pub abi: AbiFamily,
    /// Recovered display name of the owning class
    pub class_name: String,
}

impl fmt::Display for VTableCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) @ {}", self.class_name, self.abi, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    ItaniumVTable,
    MsvcVTable,
    /// Name merely mentions `vftable` or `vtbl`.
    Heuristic,
}

pub fn classify_symbol(name: &str) -> Option<SymbolClass> {
    if name.starts_with(ITANIUM_VTABLE_PREFIX) {
        Some(SymbolClass::ItaniumVTable)
    } else if name.starts_with(MSVC_VTABLE_PREFIX) {
        Some(SymbolClass::MsvcVTable)
    } else if name.contains("vftable") || name.contains("vtbl") {
        Some(SymbolClass::Heuristic)
    } else {
        None
    }
}

/// Turns the symbol table into a sorted, de-duplicated list of vtables.
pub struct SymbolScanner<'a> {
    symbols: &'a dyn SymbolTable,
    demangler: &'a dyn Demangler,
    config: &'a AnalysisConfig,
}

impl<'a> SymbolScanner<'a> {
    pub fn new(
        symbols: &'a dyn SymbolTable,
        demangler: &'a dyn Demangler,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            symbols,
            demangler,
            config,
        }
    }

    pub fn scan(&self) -> Vec<VTableCandidate> {
        let bounds = self.config.class_name_bounds();

        let mut candidates: Vec<VTableCandidate> = self
            .symbols
            .symbols()
            .into_iter()
            .filter_map(|(address, symbol)| {
                let kind = classify_symbol(&symbol)?;
                let (class_name, abi) = self.extract_class_name(&symbol, kind)?;
                if !is_valid_class_name(&class_name, &bounds)
                    || class_name.starts_with(ABI_RUNTIME_NAMESPACE)
                {
                    log::trace!("Dropping vtable symbol {} ({:?})", symbol, class_name);
                    return None;
                }
                Some(VTableCandidate {
                    address,
                    symbol,
                    abi,
                    class_name,
                })
            })
            .unique_by(|c| c.class_name.clone())
            .collect();

        candidates.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        log::debug!("Found {} vtable candidates", candidates.len());
        candidates
    }

    /// Demangled pattern first, then manual decoding of the raw symbol.
    pub fn extract_class_name(&self, symbol: &str, kind: SymbolClass) -> Option<(String, AbiFamily)> {
        let bounds = self.config.class_name_bounds();
        let symbol = symbol.strip_suffix("_ptr").unwrap_or(symbol);
        let demangled = self.demangler.demangle(symbol);

        let abi = match kind {
            SymbolClass::ItaniumVTable => AbiFamily::Itanium,
            SymbolClass::MsvcVTable => AbiFamily::Msvc,
            SymbolClass::Heuristic => match demangled.as_deref() {
                Some(d) if d.contains("vtable for") => AbiFamily::Itanium,
                _ => AbiFamily::Msvc,
            },
        };

        if let Some(class) = demangled.as_deref().and_then(class_from_demangled_vtable) {
            if is_valid_class_name(&class, &bounds) {
                return Some((class, abi));
            }
        }

        let fallback = match kind {
            SymbolClass::ItaniumVTable => {
                itanium_vtable_fallback(symbol, self.config.max_component_length, &bounds)
            }
            SymbolClass::MsvcVTable => msvc_vtable_fallback(symbol),
            SymbolClass::Heuristic => Some(symbol.to_string()),
        };

        fallback.map(|class| (class, abi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{BuiltinDemangler, SymbolMap};

    fn scan(entries: &[(u64, &str)]) -> Vec<VTableCandidate> {
        let symbols: SymbolMap = entries.iter().map(|(a, n)| (*a, n.to_string())).collect();
        let config = AnalysisConfig::default();
        SymbolScanner::new(&symbols, &BuiltinDemangler, &config).scan()
    }

    #[test]
    fn test_class_names_from_both_abis() {
        let found = scan(&[(0x2000, "??_7Derived@@6B@"), (0x1000, "_ZTV4Base")]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class_name, "Base");
        assert_eq!(found[0].abi, AbiFamily::Itanium);
        assert_eq!(found[1].class_name, "Derived");
        assert_eq!(found[1].abi, AbiFamily::Msvc);
        assert_eq!(found[1].address, Address::new(0x2000));
    }

    #[test]
    fn test_first_occurrence_wins_and_output_is_sorted() {
        let found = scan(&[
            (0x3000, "_ZTV5Zebra"),
            (0x1000, "_ZTV5Apple"),
            (0x2000, "??_7Apple@@6B@"),
        ]);
        let names: Vec<&str> = found.iter().map(|c| c.class_name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Zebra"]);
        assert_eq!(found[0].address, Address::new(0x1000));
    }

    #[test]
    fn test_nested_itanium_names_keep_last_component() {
        let found = scan(&[(0x1000, "_ZTVN3app6WidgetE")]);
        assert_eq!(found[0].class_name, "Widget");
    }

    #[test]
    fn test_hostile_length_prefixes_are_dropped() {
        let mut blowup = String::from("_ZTVN1AIS_S_E");
        for id in 0..24 {
            blowup.push_str(&format!("IS{}_S{}_E", id, id));
        }
        let found = scan(&[
            (0x1000, "_ZTV18446744073709551615A"),
            (0x2000, "_ZTV999999Short"),
            (0x3000, blowup.as_str()),
            (0x4000, "_ZTV4Base"),
        ]);
        let names: Vec<&str> = found.iter().map(|c| c.class_name.as_str()).collect();
        assert!(names.contains(&"Base"));
        assert!(!names.iter().any(|n| n.len() > 512));
    }

    #[test]
    fn test_non_vtable_and_invalid_names_are_dropped() {
        let found = scan(&[
            (0x1000, "_ZN4Base3fooEv"),
            (0x2000, "_ZTVN10__cxxabiv120__si_class_type_infoE"),
            (0x3000, "_ZTV3___"),
            (0x4000, "lowercase_vtbl"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_heuristic_symbols() {
        let found = scan(&[(0x1000, "Widget_vtbl")]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_name, "Widget_vtbl");
        assert_eq!(found[0].abi, AbiFamily::Msvc);
        assert_eq!(classify_symbol("_ZTI4Base"), None);
    }
}

// Wed Jan 15 2026 - Alex

use crate::memory::Address;
use crate::rtti::{
    BaseClassInfo, Confidence, InheritanceInfo, RttiConfig, RttiContext, RttiReader,
};
use crate::symbol::names::{class_from_demangled_typeinfo, itanium_type_string_class};
use itertools::Itertools;

const SI_CLASS_TYPE_INFO: &str = "__si_class_type_info";
const VMI_CLASS_TYPE_INFO: &str = "__vmi_class_type_info";
const CLASS_TYPE_INFO: &str = "__class_type_info";

/// `__vmi_class_type_info::__diamond_shaped_mask`
const VMI_DIAMOND_SHAPED: u32 = 0x2;
/// `__base_class_type_info::__virtual_mask`
const BASE_VIRTUAL_MASK: i64 = 0x1;
const BASE_OFFSET_SHIFT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeinfoKind {
    /// No bases.
    Root,
    /// One public non-virtual base.
    Single,
    /// Anything else.
    Multiple,
}

fn classify_kind(name: &str) -> Option<TypeinfoKind> {
    if name.contains(VMI_CLASS_TYPE_INFO) {
        Some(TypeinfoKind::Multiple)
    } else if name.contains(SI_CLASS_TYPE_INFO) {
        Some(TypeinfoKind::Single)
    } else if name.contains(CLASS_TYPE_INFO) {
        Some(TypeinfoKind::Root)
    } else {
        None
    }
}

fn looks_like_type_string(record: &str) -> bool {
    record.starts_with("_ZTS")
        || record.starts_with('N')
        || record.starts_with("St")
        || record.bytes().next().map_or(false, |b| b.is_ascii_digit())
}

/// Typeinfo check used by layout detection: both header pointers mapped and
/// the name pointer leading to a type-string record.
pub fn is_valid_typeinfo(ctx: &RttiContext<'_>, ti: Address) -> bool {
    if !ctx.image.is_mapped(ti) || ctx.mapped_ptr(ti).is_none() {
        return false;
    }
    type_string_class(ctx, ti).is_some()
}

/// Class name stored in the typeinfo at `ti`.
fn type_string_class(ctx: &RttiContext<'_>, ti: Address) -> Option<String> {
    let name_ptr = ctx.mapped_ptr(ti + ctx.pointer_size())?;
    let record = ctx.read_string(name_ptr)?;
    if !looks_like_type_string(&record) {
        return None;
    }

    itanium_type_string_class(&record, ctx.config.max_component_length).or_else(|| {
        let demangled = ctx.demangler.demangle(&format!("_ZTI{}", record))?;
        class_from_demangled_typeinfo(&demangled)
    })
}

pub struct ItaniumRttiParser<'a> {
    ctx: RttiContext<'a>,
    config: RttiConfig,
}

impl<'a> ItaniumRttiParser<'a> {
    pub fn new(ctx: RttiContext<'a>, config: RttiConfig) -> Self {
        Self { ctx, config }
    }

    /// Slots that may hold the typeinfo pointer, detected offset first.
    fn candidate_slots(&self, vtable: Address) -> Vec<Address> {
        let ps = self.ctx.pointer_size() as i64;
        [self.config.rtti_offset, ps, -ps, -2 * ps]
            .into_iter()
            .filter_map(|off| vtable.checked_offset(off))
            .unique()
            .collect()
    }

    pub fn parse_typeinfo(&self, ti: Address, class_hint: &str) -> InheritanceInfo {
        let class_name = if class_hint.is_empty() {
            type_string_class(&self.ctx, ti).unwrap_or_default()
        } else {
            class_hint.to_string()
        };

        let kind_ptr = match self.ctx.image.read_ptr(ti) {
            Ok(ptr) => ptr,
            Err(_) => return InheritanceInfo::not_found(class_name),
        };

        match self.resolve_kind(kind_ptr) {
            Some(TypeinfoKind::Root) => InheritanceInfo::parsed(class_name),
            Some(TypeinfoKind::Single) => self.parse_single(ti, class_name),
            Some(TypeinfoKind::Multiple) => self.parse_multiple(ti, class_name),
            None => self.parse_unclassified(ti, class_name),
        }
    }

    /// Names the typeinfo's own class: the symbol at the kind pointer, the
    /// `_ZTV` symbol two slots before it, or one level of indirection.
    fn resolve_kind(&self, kind_ptr: Address) -> Option<TypeinfoKind> {
        let symbols = self.ctx.symbols;
        let ps = self.ctx.pointer_size();

        let direct = symbols.name_at(kind_ptr);
        let vtable_start = kind_ptr.checked_offset(-2 * ps as i64).and_then(|a| symbols.name_at(a));
        let indirect = self.ctx.mapped_ptr(kind_ptr).and_then(|a| symbols.name_at(a));

        [direct, vtable_start, indirect]
            .into_iter()
            .flatten()
            .filter(|name| !name.starts_with("off_"))
            .find_map(|name| classify_kind(&name))
    }

    fn base_name(&self, base_ti: Address) -> Option<String> {
        type_string_class(&self.ctx, base_ti)
    }

    fn parse_single(&self, ti: Address, class_name: String) -> InheritanceInfo {
        let ps = self.ctx.pointer_size();
        let base = self
            .ctx
            .mapped_ptr(ti + 2 * ps)
            .and_then(|base_ti| self.base_name(base_ti));

        match base {
            Some(name) => {
                let mut info = InheritanceInfo::parsed(class_name);
                info.base_classes.push(BaseClassInfo::new(name));
                info
            }
            None => {
                log::debug!("Single-inheritance typeinfo {} has no readable base", ti);
                InheritanceInfo::not_found(class_name)
            }
        }
    }

    fn parse_multiple(&self, ti: Address, class_name: String) -> InheritanceInfo {
        let image = self.ctx.image;
        let ps = self.ctx.pointer_size();

        let header = ti + 2 * ps;
        let (Ok(flags), Ok(count)) = (image.read_u32(header), image.read_u32(header + 4)) else {
            return InheritanceInfo::not_found(class_name);
        };

        if count == 0 || count > self.ctx.config.max_itanium_bases {
            log::debug!("VMI typeinfo {} has base count {}", ti, count);
            return InheritanceInfo::rejected(class_name, format!("base count {}", count));
        }

        let mut info = InheritanceInfo::parsed(class_name);
        let array = header + 8;

        for i in 0..u64::from(count) {
            let entry = array + i * 2 * ps;
            let Some(base_ti) = self.ctx.mapped_ptr(entry) else {
                log::trace!("VMI base {} of {} unmapped", i, ti);
                continue;
            };
            let Ok(offset_flags) = image.read_isize(entry + ps) else {
                continue;
            };
            let Some(name) = self.base_name(base_ti) else {
                continue;
            };

            info.base_classes.push(
                BaseClassInfo::new(name)
                    .with_offset(offset_flags >> BASE_OFFSET_SHIFT)
                    .with_virtual(offset_flags & BASE_VIRTUAL_MASK != 0),
            );
        }

        // any vmi typeinfo counts, even with a single listed base
        info.has_multiple_inheritance = true;
        info.has_virtual_inheritance =
            info.base_classes.iter().any(|b| b.is_virtual) || flags & VMI_DIAMOND_SHAPED != 0;
        info
    }

    /// Kind symbol unknown: read one trailing base pointer without validation.
    fn parse_unclassified(&self, ti: Address, class_name: String) -> InheritanceInfo {
        let ps = self.ctx.pointer_size();
        let mut info = InheritanceInfo::parsed(class_name);
        info.confidence = Confidence::Heuristic;

        if let Some(name) = self
            .ctx
            .mapped_ptr(ti + 2 * ps)
            .and_then(|base_ti| self.base_name(base_ti))
        {
            info.base_classes.push(BaseClassInfo::new(name));
        }
        info
    }
}

impl RttiReader for ItaniumRttiParser<'_> {
    fn parse_rtti_at(&self, vtable: Address, class_hint: &str) -> InheritanceInfo {
        let mut fallback: Option<InheritanceInfo> = None;

        for slot in self.candidate_slots(vtable) {
            let Some(ti) = self.ctx.mapped_ptr(slot) else {
                continue;
            };
            if type_string_class(&self.ctx, ti).is_none() {
                continue;
            }

            let info = self.parse_typeinfo(ti, class_hint);
            if !info.base_classes.is_empty() {
                return info;
            }

            let better = match &fallback {
                None => true,
                Some(prev) => !prev.is_parsed() && info.is_parsed(),
            };
            if better {
                fallback = Some(info);
            }
        }

        fallback.unwrap_or_else(|| {
            log::debug!("No typeinfo found for vtable {}", vtable);
            InheritanceInfo::not_found(class_hint)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PointerWidth;
    use crate::rtti::{AbiFamily, RttiDetector, RttiStatus};
    use crate::testing::FixtureBuilder;

    fn itanium_config() -> RttiConfig {
        RttiConfig {
            abi: AbiFamily::Itanium,
            width: PointerWidth::Bits64,
            absolute_col: true,
            rtti_offset: 8,
            validated: true,
        }
    }

    #[test]
    fn test_single_inheritance_chain_has_one_base() {
        for width in [PointerWidth::Bits64, PointerWidth::Bits32] {
            let mut b = FixtureBuilder::itanium(width);
            let f = b.function("_ZN4Base1fEv");
            let g = b.function("_ZN7Derived1fEv");
            let base_ti = b.typeinfo("Base");
            b.itanium_vtable("Base", base_ti, &[f]);
            let derived_ti = b.typeinfo_si("Derived", "Base");
            let vt = b.itanium_vtable("Derived", derived_ti, &[g]);
            let fx = b.finish();

            let ctx = fx.ctx();
            let config = RttiDetector::new(ctx).detect(vt);
            assert!(config.validated);
            assert_eq!(config.rtti_offset, width.bytes() as i64);

            let info = ItaniumRttiParser::new(ctx, config).parse_rtti_at(vt, "Derived");
            assert_eq!(info.status, RttiStatus::Parsed);
            assert_eq!(info.confidence, Confidence::Validated);
            assert_eq!(info.base_classes, vec![BaseClassInfo::new("Base")]);
            assert!(!info.has_multiple_inheritance);
        }
    }

    #[test]
    fn test_vmi_offsets_and_virtual_flag() {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        let f = b.function("_ZN1A1fEv");
        b.typeinfo("A");
        b.typeinfo("B");
        let ti = b.typeinfo_vmi("C", 0, &[("A", 0, false), ("B", 16, true)]);
        let vt = b.itanium_vtable("C", ti, &[f]);
        let fx = b.finish();

        let ctx = fx.ctx();
        let config = RttiDetector::new(ctx).detect(vt);
        let info = ItaniumRttiParser::new(ctx, config).parse_rtti_at(vt, "C");

        assert_eq!(info.base_classes.len(), 2);
        assert_eq!(info.base_classes[1], BaseClassInfo::new("B").with_offset(16).with_virtual(true));
        assert!(info.has_multiple_inheritance);
        assert!(info.has_virtual_inheritance);
    }

    #[test]
    fn test_unresolvable_kind_falls_back_with_heuristic_confidence() {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        let f = b.function("_ZN4Leaf1fEv");
        b.typeinfo("ns::Parent");
        let ti = b.typeinfo_si("Leaf", "ns::Parent");
        let vt = b.itanium_vtable("Leaf", ti, &[f]);
        // unrelocated kind pointer
        b.write_ptr(ti, Address::zero());
        let fx = b.finish();

        let ctx = fx.ctx();
        let config = RttiDetector::new(ctx).detect(vt);
        let info = ItaniumRttiParser::new(ctx, config).parse_rtti_at(vt, "Leaf");

        assert_eq!(info.confidence, Confidence::Heuristic);
        assert_eq!(info.base_classes, vec![BaseClassInfo::new("ns::Parent")]);
    }

    #[test]
    fn test_missing_typeinfo_is_not_found() {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        let f = b.function("_ZN6Orphan1fEv");
        let vt = b.itanium_vtable("Orphan", Address::zero(), &[f]);
        let fx = b.finish();

        let ctx = fx.ctx();
        let config = RttiDetector::new(ctx).detect(vt);
        assert!(!config.validated);

        let info = ItaniumRttiParser::new(ctx, config).parse_rtti_at(vt, "Orphan");
        assert_eq!(info.status, RttiStatus::NotFound);
        assert_eq!(info.class_name, "Orphan");
    }

    #[test]
    fn test_vmi_base_count_limits() {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        b.typeinfo("A");
        let empty = b.typeinfo_vmi("Empty", 0, &[("A", 0, false)]);
        b.set_vmi_base_count(empty, 0);
        let wide = b.typeinfo_vmi("Wide", 0, &[("A", 0, false)]);
        b.set_vmi_base_count(wide, 33);
        let full = b.typeinfo_vmi("Full", 0, &[("A", 0, false)]);
        b.set_vmi_base_count(full, 32);
        let fx = b.finish();

        let ctx = fx.ctx();
        let parser = ItaniumRttiParser::new(ctx, itanium_config());
        assert_eq!(
            parser.parse_typeinfo(empty, "Empty").status,
            RttiStatus::Rejected("base count 0".to_string())
        );
        assert_eq!(
            parser.parse_typeinfo(wide, "Wide").status,
            RttiStatus::Rejected("base count 33".to_string())
        );
        assert!(parser.parse_typeinfo(full, "Full").is_parsed());
    }

    #[test]
    fn test_vmi_with_one_base_is_multiple() {
        let mut b = FixtureBuilder::itanium(PointerWidth::Bits64);
        b.typeinfo("Base");
        let ti = b.typeinfo_vmi("Virt", 0, &[("Base", 0, true)]);
        let fx = b.finish();

        let info = ItaniumRttiParser::new(fx.ctx(), itanium_config()).parse_typeinfo(ti, "Virt");
        assert_eq!(info.base_classes.len(), 1);
        assert!(info.has_multiple_inheritance);
        assert!(info.has_virtual_inheritance);
    }
}

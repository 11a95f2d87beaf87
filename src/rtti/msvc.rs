// Wed Jan 15 2026 - Alex

use crate::memory::Address;
use crate::rtti::{BaseClassInfo, InheritanceInfo, RttiConfig, RttiContext, RttiReader};
use crate::symbol::names::msvc_type_descriptor_fallback;
use bitflags::bitflags;

const COL_SIGNATURE_MAX: u32 = 2;
const COL_TYPE_DESCRIPTOR: u64 = 12;
const COL_HIERARCHY_DESCRIPTOR: u64 = 16;
const CHD_ATTRIBUTES: u64 = 4;
const CHD_BASE_COUNT: u64 = 8;
const CHD_BASE_ARRAY: u64 = 12;
const BCD_MDISP: u64 = 8;
const BCD_PDISP: u64 = 12;

bitflags! {
    /// `ClassHierarchyDescriptor::attributes`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsvcHierarchyAttributes: u32 {
        const MULTIPLE_INHERITANCE = 1 << 0;
        const VIRTUAL_INHERITANCE  = 1 << 1;
        const AMBIGUOUS            = 1 << 2;
    }
}

/// Resolves a 32-bit structure reference: image-relative on 64-bit images,
/// absolute on 32-bit ones. Zero is never a valid reference.
pub(crate) fn resolve_ref(ctx: &RttiContext<'_>, value: u32) -> Option<Address> {
    if value == 0 {
        return None;
    }
    if ctx.image.pointer_width().is_64() {
        ctx.image.image_base()?.checked_add(u64::from(value))
    } else {
        Some(Address::new(u64::from(value)))
    }
}

fn read_ref(ctx: &RttiContext<'_>, at: Address) -> Option<Address> {
    let value = ctx.image.read_u32(at).ok()?;
    resolve_ref(ctx, value).filter(|addr| ctx.image.is_mapped(*addr))
}

/// Complete Object Locator sanity check used by layout detection.
pub fn is_valid_col(ctx: &RttiContext<'_>, col: Address) -> bool {
    let image = ctx.image;
    if !image.is_mapped(col) {
        return false;
    }

    match image.read_u32(col) {
        Ok(sig) if sig <= COL_SIGNATURE_MAX => {}
        _ => return false,
    }

    let (Some(_td), Some(chd)) = (
        read_ref(ctx, col + COL_TYPE_DESCRIPTOR),
        read_ref(ctx, col + COL_HIERARCHY_DESCRIPTOR),
    ) else {
        return false;
    };

    if image.read_u32(chd).ok() != Some(0) {
        return false;
    }

    image
        .read_u32(chd + CHD_BASE_COUNT)
        .map_or(false, |count| count <= ctx.config.max_msvc_base_classes)
}

pub struct MsvcRttiParser<'a> {
    ctx: RttiContext<'a>,
    config: RttiConfig,
}

impl<'a> MsvcRttiParser<'a> {
    pub fn new(ctx: RttiContext<'a>, config: RttiConfig) -> Self {
        Self { ctx, config }
    }

    /// Follows the RTTI slot to the COL.
    pub fn locate_col(&self, vtable: Address) -> Option<Address> {
        let image = self.ctx.image;
        let slot = vtable.checked_offset(self.config.rtti_offset)?;
        if !image.is_mapped(slot) {
            return None;
        }

        let col = if image.pointer_width().is_64() && !self.config.absolute_col {
            resolve_ref(&self.ctx, image.read_u32(slot).ok()?)?
        } else {
            image.read_ptr(slot).ok()?
        };

        image.is_mapped(col).then_some(col)
    }

    pub fn parse_col(&self, col: Address, class_hint: &str) -> InheritanceInfo {
        let image = self.ctx.image;

        let signature = match image.read_u32(col) {
            Ok(sig) => sig,
            Err(_) => return InheritanceInfo::not_found(class_hint),
        };
        if signature > COL_SIGNATURE_MAX {
            log::debug!("COL {} has bad signature {}", col, signature);
            return InheritanceInfo::rejected(class_hint, format!("COL signature {}", signature));
        }

        let Some(td) = read_ref(&self.ctx, col + COL_TYPE_DESCRIPTOR) else {
            return InheritanceInfo::not_found(class_hint);
        };
        let Some(chd) = read_ref(&self.ctx, col + COL_HIERARCHY_DESCRIPTOR) else {
            return InheritanceInfo::not_found(class_hint);
        };

        let class_name = if class_hint.is_empty() {
            self.type_name(td).unwrap_or_default()
        } else {
            class_hint.to_string()
        };
        let mut info = InheritanceInfo::parsed(class_name.clone());

        let attributes = image
            .read_u32(chd + CHD_ATTRIBUTES)
            .map(MsvcHierarchyAttributes::from_bits_truncate)
            .unwrap_or(MsvcHierarchyAttributes::empty());
        info.has_multiple_inheritance =
            attributes.contains(MsvcHierarchyAttributes::MULTIPLE_INHERITANCE);
        info.has_virtual_inheritance =
            attributes.contains(MsvcHierarchyAttributes::VIRTUAL_INHERITANCE);

        let count = image.read_u32(chd + CHD_BASE_COUNT).unwrap_or(0);
        if count == 0 || count > self.ctx.config.max_msvc_base_classes {
            log::debug!("CHD {} has base count {}", chd, count);
            info.status = crate::rtti::RttiStatus::Rejected(format!("base count {}", count));
            return info;
        }

        let Some(array) = read_ref(&self.ctx, chd + CHD_BASE_ARRAY) else {
            info.status = crate::rtti::RttiStatus::NotFound;
            return info;
        };

        // entry 0 describes the class itself
        for i in 1..u64::from(count) {
            let Some(bcd) = read_ref(&self.ctx, array + i * 4) else {
                log::trace!("Base descriptor {} of {} unmapped", i, class_name);
                continue;
            };
            let Some(base_td) = read_ref(&self.ctx, bcd) else {
                continue;
            };
            let Some(base_name) = self.type_name(base_td) else {
                continue;
            };
            if base_name == class_name {
                continue;
            }

            let mdisp = image.read_i32(bcd + BCD_MDISP).unwrap_or(0);
            let pdisp = image.read_i32(bcd + BCD_PDISP).unwrap_or(-1);

            info.base_classes.push(
                BaseClassInfo::new(base_name)
                    .with_offset(i64::from(mdisp))
                    .with_virtual(pdisp != -1),
            );
        }

        info
    }

    /// Display name from a type descriptor's decorated name.
    pub fn type_name(&self, td: Address) -> Option<String> {
        let ps = self.ctx.pointer_size();
        let raw = self.ctx.read_string(td + 2 * ps)?;

        let demangled = self.ctx.demangler.demangle(&raw).and_then(|d| {
            let stripped = ["class ", "struct ", "union ", "enum "]
                .iter()
                .find_map(|kind| d.strip_prefix(kind))
                .unwrap_or(&d)
                .to_string();
            (!stripped.is_empty()).then_some(stripped)
        });

        let name = match demangled {
            Some(name) => name,
            None => msvc_type_descriptor_fallback(&raw)?,
        };
        (!name.is_empty()).then_some(name)
    }
}

impl RttiReader for MsvcRttiParser<'_> {
    fn parse_rtti_at(&self, vtable: Address, class_hint: &str) -> InheritanceInfo {
        match self.locate_col(vtable) {
            Some(col) => self.parse_col(col, class_hint),
            None => {
                log::debug!("No COL for vtable {}", vtable);
                InheritanceInfo::not_found(class_hint)
            }
        }
    }
}

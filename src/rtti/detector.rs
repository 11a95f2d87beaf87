// Wed Jan 15 2026 - Alex

use crate::memory::{Address, FileFormat, PointerWidth};
use crate::rtti::{itanium, msvc, AbiFamily, RttiConfig, RttiContext};
use crate::symbol::names::{ITANIUM_VTABLE_PREFIX, MSVC_VTABLE_PREFIX};
use itertools::Itertools;

/// Works out the RTTI layout of an image from one of its vtables.
pub struct RttiDetector<'a> {
    ctx: RttiContext<'a>,
}

impl<'a> RttiDetector<'a> {
    pub fn new(ctx: RttiContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn detect(&self, vtable: Address) -> RttiConfig {
        let abi = self.detect_abi(vtable);
        let width = self.ctx.image.pointer_width();
        let probes = self.probe_offsets();

        let found = match abi {
            AbiFamily::Msvc => self.probe_msvc(vtable, &probes),
            AbiFamily::Itanium => self.probe_itanium(vtable, &probes).map(|off| (off, true)),
        };

        match found {
            Some((rtti_offset, absolute_col)) => RttiConfig {
                abi,
                width,
                absolute_col,
                rtti_offset,
                validated: true,
            },
            None => {
                log::debug!("No RTTI slot validated near {}, using default offset", vtable);
                RttiConfig {
                    abi,
                    width,
                    absolute_col: true,
                    rtti_offset: self.scale(self.ctx.config.default_rtti_offset),
                    validated: false,
                }
            }
        }
    }

    /// Symbol prefix first, container format second.
    pub fn detect_abi(&self, vtable: Address) -> AbiFamily {
        if let Some(name) = self.ctx.symbols.name_at(vtable) {
            if name.starts_with(MSVC_VTABLE_PREFIX) {
                return AbiFamily::Msvc;
            }
            if name.starts_with(ITANIUM_VTABLE_PREFIX) {
                return AbiFamily::Itanium;
            }
        }

        match self.ctx.image.file_format() {
            FileFormat::Pe => AbiFamily::Msvc,
            _ => AbiFamily::Itanium,
        }
    }

    /// Configured offsets are in 64-bit slot units; 32-bit images halve them.
    pub fn probe_offsets(&self) -> Vec<i64> {
        self.ctx
            .config
            .rtti_probe_offsets
            .iter()
            .map(|&off| self.scale(off))
            .unique()
            .collect()
    }

    fn scale(&self, offset: i64) -> i64 {
        match self.ctx.image.pointer_width() {
            PointerWidth::Bits64 => offset,
            PointerWidth::Bits32 => offset / 2,
        }
    }

    /// Returns the validated offset and whether the COL reference is absolute.
    fn probe_msvc(&self, vtable: Address, probes: &[i64]) -> Option<(i64, bool)> {
        let image = self.ctx.image;

        for &off in probes {
            let Some(probe) = vtable.checked_offset(off) else { continue };
            if !image.is_mapped(probe) {
                continue;
            }

            if let Ok(col) = image.read_ptr(probe) {
                if msvc::is_valid_col(&self.ctx, col) {
                    return Some((off, true));
                }
            }

            if image.pointer_width().is_64() {
                let relative = image
                    .read_u32(probe)
                    .ok()
                    .and_then(|rva| msvc::resolve_ref(&self.ctx, rva));
                if let Some(col) = relative {
                    if msvc::is_valid_col(&self.ctx, col) {
                        return Some((off, false));
                    }
                }
            }

            log::trace!("MSVC probe {:+} at {} rejected", off, probe);
        }

        None
    }

    fn probe_itanium(&self, vtable: Address, probes: &[i64]) -> Option<i64> {
        probes.iter().copied().find(|&off| {
            vtable
                .checked_offset(off)
                .and_then(|probe| self.ctx.mapped_ptr(probe))
                .map_or(false, |ti| itanium::is_valid_typeinfo(&self.ctx, ti))
        })
    }
}

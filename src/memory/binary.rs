// Tue Jan 13 2026 - Alex

use crate::memory::{
    Address, FileFormat, MemoryError, MemoryImage, MemoryRange, MemorySegment, PointerWidth,
    Protection, SegmentedImage,
};
use crate::symbol::{SymbolInfo, SymbolKind, SymbolMap};
use goblin::elf::program_header::{PF_R, PF_W, PF_X, PT_LOAD};
use goblin::elf::sym::{STT_FUNC, STT_OBJECT};
use goblin::mach::{Mach, MachO};
use goblin::Object;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// An executable loaded from disk: its mapped segments plus its symbols.
#[derive(Debug, Clone)]
pub struct LoadedBinary {
    pub path: PathBuf,
    pub image: SegmentedImage,
    pub symbols: SymbolMap,
}

impl LoadedBinary {
    /// Addresses of symbols known to be functions.
    pub fn function_addresses(&self) -> Vec<Address> {
        self.symbols
            .iter()
            .filter(|s| s.is_function())
            .map(|s| s.address())
            .collect()
    }
}

pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<LoadedBinary, MemoryError> {
    let file = File::open(path.as_ref())?;
    // SAFETY: the mapping is read-only and only lives for the duration of the parse
    let mmap = unsafe { Mmap::map(&file) }?;
    let data: &[u8] = &mmap;

    let object = Object::parse(data)
        .map_err(|e| MemoryError::BinaryParseError(format!("{}: {}", path.as_ref().display(), e)))?;

    let (image, symbols) = match object {
        Object::Elf(elf) => load_elf(&elf, data)?,
        Object::PE(pe) => load_pe(&pe, data)?,
        Object::Mach(Mach::Binary(macho)) => load_macho(&macho, data)?,
        Object::Mach(Mach::Fat(_)) => {
            return Err(MemoryError::NotSupported("fat Mach-O binaries".to_string()))
        }
        _ => return Err(MemoryError::NotSupported("unrecognized object format".to_string())),
    };

    log::info!(
        "Loaded {} ({}, {}): {} segments, {} symbols",
        path.as_ref().display(),
        image.file_format(),
        image.pointer_width(),
        image.segments().len(),
        symbols.len()
    );

    Ok(LoadedBinary {
        path: path.as_ref().to_path_buf(),
        image,
        symbols,
    })
}

fn file_slice(data: &[u8], offset: u64, size: u64) -> Vec<u8> {
    let start = (offset as usize).min(data.len());
    let end = offset.saturating_add(size).min(data.len() as u64) as usize;
    data[start..end.max(start)].to_vec()
}

fn segment(name: &str, start: u64, size: u64, protection: Protection, bytes: Vec<u8>) -> MemorySegment {
    MemorySegment::new(
        MemoryRange::from_start_size(Address::new(start), size),
        protection,
        name.to_string(),
    )
    .with_data(bytes)
}

/// Virtual address of an image-relative offset, `None` if it wraps.
fn rva_to_va(base: u64, rva: u64) -> Option<Address> {
    base.checked_add(rva).map(Address::new)
}

fn add_or_skip(image: &mut SegmentedImage, seg: MemorySegment) {
    let name = seg.name().to_string();
    if let Err(e) = image.add_segment(seg) {
        log::warn!("Skipping segment {}: {}", name, e);
    }
}

fn load_elf(elf: &goblin::elf::Elf, data: &[u8]) -> Result<(SegmentedImage, SymbolMap), MemoryError> {
    let width = if elf.is_64 { PointerWidth::Bits64 } else { PointerWidth::Bits32 };
    let mut image = SegmentedImage::new(width, FileFormat::Elf);

    let mut lowest: Option<u64> = None;
    for (i, ph) in elf.program_headers.iter().enumerate() {
        if ph.p_type != PT_LOAD || ph.p_memsz == 0 {
            continue;
        }
        let mut flags = 0;
        if ph.p_flags & PF_R != 0 {
            flags |= 1;
        }
        if ph.p_flags & PF_W != 0 {
            flags |= 2;
        }
        if ph.p_flags & PF_X != 0 {
            flags |= 4;
        }
        lowest = Some(lowest.map_or(ph.p_vaddr, |l| l.min(ph.p_vaddr)));
        add_or_skip(
            &mut image,
            segment(
                &format!("LOAD{}", i),
                ph.p_vaddr,
                ph.p_memsz,
                Protection::from_flags(flags),
                file_slice(data, ph.p_offset, ph.p_filesz),
            ),
        );
    }
    if let Some(base) = lowest {
        image = image.with_image_base(Address::new(base));
    }

    let mut symbols = SymbolMap::new();
    let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
    for (syms, strtab) in tables {
        for sym in syms.iter() {
            if sym.st_value == 0 {
                continue;
            }
            let Some(name) = strtab.get_at(sym.st_name) else {
                continue;
            };
            let kind = match sym.st_type() {
                STT_FUNC => SymbolKind::Function,
                STT_OBJECT => SymbolKind::Data,
                _ => SymbolKind::Unknown,
            };
            symbols.add(SymbolInfo::new(name, Address::new(sym.st_value), kind));
        }
    }

    Ok((image, symbols))
}

fn load_pe(pe: &goblin::pe::PE, data: &[u8]) -> Result<(SegmentedImage, SymbolMap), MemoryError> {
    let width = if pe.is_64 { PointerWidth::Bits64 } else { PointerWidth::Bits32 };
    let base = pe.image_base as u64;
    let mut image = SegmentedImage::new(width, FileFormat::Pe).with_image_base(Address::new(base));

    for section in &pe.sections {
        let name = section.name().unwrap_or("?").to_string();
        let size = u64::from(section.virtual_size.max(section.size_of_raw_data));
        if size == 0 {
            continue;
        }
        let mut flags = 0;
        if section.characteristics & IMAGE_SCN_MEM_READ != 0 {
            flags |= 1;
        }
        if section.characteristics & IMAGE_SCN_MEM_WRITE != 0 {
            flags |= 2;
        }
        if section.characteristics & IMAGE_SCN_MEM_EXECUTE != 0 {
            flags |= 4;
        }
        let Some(start) = rva_to_va(base, u64::from(section.virtual_address)) else {
            log::debug!("Section {} at RVA {:#x} wraps the address space", name, section.virtual_address);
            continue;
        };
        add_or_skip(
            &mut image,
            segment(
                &name,
                start.as_u64(),
                size,
                Protection::from_flags(flags),
                file_slice(
                    data,
                    u64::from(section.pointer_to_raw_data),
                    u64::from(section.size_of_raw_data),
                ),
            ),
        );
    }

    let mut symbols = SymbolMap::new();
    for export in &pe.exports {
        let Some(name) = export.name else {
            continue;
        };
        let Some(addr) = rva_to_va(base, export.rva as u64) else {
            log::debug!("Export {} at RVA {:#x} wraps the address space", name, export.rva);
            continue;
        };
        let kind = if image.is_executable(addr) { SymbolKind::Function } else { SymbolKind::Data };
        symbols.add(SymbolInfo::new(name, addr, kind));
    }

    Ok((image, symbols))
}

fn load_macho(macho: &MachO, data: &[u8]) -> Result<(SegmentedImage, SymbolMap), MemoryError> {
    let width = if macho.is_64 { PointerWidth::Bits64 } else { PointerWidth::Bits32 };
    let mut image = SegmentedImage::new(width, FileFormat::MachO);

    for seg in &macho.segments {
        let name = seg.name().unwrap_or("?").to_string();
        // __PAGEZERO and friends
        if seg.initprot == 0 || seg.vmsize == 0 {
            continue;
        }
        if name == "__TEXT" {
            image = image.with_image_base(Address::new(seg.vmaddr));
        }
        add_or_skip(
            &mut image,
            segment(
                &name,
                seg.vmaddr,
                seg.vmsize,
                Protection::from_flags(seg.initprot),
                file_slice(data, seg.fileoff, seg.filesize),
            ),
        );
    }

    let mut symbols = SymbolMap::new();
    for (name, nlist) in macho.symbols().flatten() {
        if nlist.is_undefined() || nlist.n_value == 0 {
            continue;
        }
        // Mach-O prepends an underscore to every C-level name
        let name = name.strip_prefix('_').unwrap_or(name);
        let addr = Address::new(nlist.n_value);
        let kind = if image.is_executable(addr) { SymbolKind::Function } else { SymbolKind::Data };
        symbols.add(SymbolInfo::new(name, addr, kind));
    }

    Ok((image, symbols))
}

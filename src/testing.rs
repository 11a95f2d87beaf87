// Wed Jan 15 2026 - Alex

//! Builders for synthetic Itanium and MSVC images used by the unit tests.

use crate::config::AnalysisConfig;
use crate::memory::{Address, FileFormat, MemoryWriter, PointerWidth, Protection, SegmentedImage};
use crate::registry::InMemoryRegistry;
use crate::rtti::{AbiFamily, RttiContext};
use crate::session::AnalysisSession;
use crate::symbol::{BuiltinDemangler, SymbolInfo, SymbolKind, SymbolMap};
use std::collections::HashMap;
use std::sync::Arc;

const PROLOGUE: u8 = 0x55;
const INT3: u8 = 0xCC;
const FUNCTION_STRIDE: u64 = 0x10;
const LEADING_PAD_SLOTS: u64 = 2;
const TRAILING_GAP_SLOTS: u64 = 6;

pub struct Fixture {
    pub image: Arc<SegmentedImage>,
    pub symbols: Arc<SymbolMap>,
    pub registry: Arc<InMemoryRegistry>,
    pub demangler: BuiltinDemangler,
    pub config: AnalysisConfig,
}

impl Fixture {
    pub fn ctx(&self) -> RttiContext<'_> {
        RttiContext {
            image: self.image.as_ref(),
            symbols: self.symbols.as_ref(),
            demangler: &self.demangler,
            config: &self.config,
        }
    }

    pub fn session(&self) -> AnalysisSession {
        AnalysisSession::new(self.image.clone(), self.symbols.clone())
            .with_registry(self.registry.clone())
            .with_config(self.config.clone())
    }
}

pub struct FixtureBuilder {
    abi: AbiFamily,
    image: SegmentedImage,
    symbols: SymbolMap,
    functions: Vec<Address>,
    base: u64,
    ps: u64,
    text_next: u64,
    data_next: u64,
    kinds: [Address; 3],
    typeinfos: HashMap<String, Address>,
    type_descriptors: HashMap<String, Address>,
    hierarchies: HashMap<Address, Address>,
    pure_virtual: Option<Address>,
}

fn itanium_record(class: &str) -> String {
    let parts: Vec<&str> = class.split("::").collect();
    if parts.len() == 1 {
        return format!("{}{}", class.len(), class);
    }
    let body: String = parts.iter().map(|p| format!("{}{}", p.len(), p)).collect();
    format!("N{}E", body)
}

fn msvc_scope(class: &str) -> String {
    let mut parts: Vec<&str> = class.split("::").collect();
    parts.reverse();
    parts.join("@")
}

impl FixtureBuilder {
    fn new(abi: AbiFamily, width: PointerWidth) -> Self {
        let (format, base, text, data) = match (abi, width) {
            (AbiFamily::Itanium, _) => (FileFormat::Elf, 0x40_0000, 0x40_1000, 0x60_0000),
            (AbiFamily::Msvc, PointerWidth::Bits64) => {
                (FileFormat::Pe, 0x1_4000_0000, 0x1_4000_1000, 0x1_4002_0000)
            }
            (AbiFamily::Msvc, PointerWidth::Bits32) => {
                (FileFormat::Pe, 0x40_0000, 0x40_1000, 0x42_0000)
            }
        };

        let mut image = SegmentedImage::new(width, format).with_image_base(Address::new(base));
        image
            .map(".text", Address::new(text), 0x1_0000, Protection::ReadExecute)
            .unwrap();
        image
            .map(".data", Address::new(data), 0x4_0000, Protection::ReadWrite)
            .unwrap();

        let mut builder = Self {
            abi,
            image,
            symbols: SymbolMap::new(),
            functions: Vec::new(),
            base,
            ps: width.bytes() as u64,
            text_next: text,
            data_next: data,
            kinds: [Address::zero(); 3],
            typeinfos: HashMap::new(),
            type_descriptors: HashMap::new(),
            hierarchies: HashMap::new(),
            pure_virtual: None,
        };

        if abi == AbiFamily::Itanium {
            let names = [
                "_ZTVN10__cxxabiv117__class_type_infoE",
                "_ZTVN10__cxxabiv120__si_class_type_infoE",
                "_ZTVN10__cxxabiv121__vmi_class_type_infoE",
            ];
            for (i, name) in names.iter().enumerate() {
                let vt = builder.alloc(4 * builder.ps);
                builder.symbol(name, vt, SymbolKind::Data);
                builder.kinds[i] = vt + 2 * builder.ps;
            }
        }

        builder
    }

    pub fn itanium(width: PointerWidth) -> Self {
        Self::new(AbiFamily::Itanium, width)
    }

    pub fn msvc(width: PointerWidth) -> Self {
        Self::new(AbiFamily::Msvc, width)
    }

    pub fn alloc(&mut self, size: u64) -> Address {
        let addr = Address::new(self.data_next);
        self.data_next += (size + 7) & !7;
        addr
    }

    pub fn symbol(&mut self, name: &str, addr: Address, kind: SymbolKind) {
        self.symbols.add(SymbolInfo::new(name, addr, kind));
    }

    fn code(&mut self, first_byte: u8) -> Address {
        let addr = Address::new(self.text_next);
        self.text_next += FUNCTION_STRIDE;
        self.image.write_u8(addr, first_byte).unwrap();
        addr
    }

    /// Named function already known to the registry.
    pub fn function(&mut self, name: &str) -> Address {
        let addr = self.code(PROLOGUE);
        self.symbol(name, addr, SymbolKind::Function);
        self.functions.push(addr);
        addr
    }

    /// Unnamed code starting with a recognizable prologue.
    pub fn unregistered_function(&mut self) -> Address {
        self.code(PROLOGUE)
    }

    /// Executable bytes that look like nothing in particular.
    pub fn stub(&mut self) -> Address {
        self.code(INT3)
    }

    pub fn pure_virtual(&mut self) -> Address {
        if let Some(addr) = self.pure_virtual {
            return addr;
        }
        let name = match self.abi {
            AbiFamily::Itanium => "__cxa_pure_virtual",
            AbiFamily::Msvc => "_purecall",
        };
        let addr = self.function(name);
        self.pure_virtual = Some(addr);
        addr
    }

    pub fn write_u32(&mut self, addr: Address, value: u32) {
        self.image.write_u32(addr, value).unwrap();
    }

    pub fn write_u64(&mut self, addr: Address, value: u64) {
        self.image.write_u64(addr, value).unwrap();
    }

    pub fn write_ptr(&mut self, addr: Address, value: Address) {
        self.image.write_ptr(addr, value).unwrap();
    }

    fn write_str(&mut self, s: &str) -> Address {
        let addr = self.alloc(s.len() as u64 + 1);
        self.image.write_bytes(addr, s.as_bytes()).unwrap();
        addr
    }

    fn write_slots(&mut self, at: Address, slots: &[Address]) {
        for (i, slot) in slots.iter().enumerate() {
            self.write_ptr(at + i as u64 * self.ps, *slot);
        }
    }

    fn itanium_header(&mut self, class: &str, kind: usize, extra: u64) -> Address {
        let record = itanium_record(class);
        let name = self.write_str(&record);
        self.symbol(&format!("_ZTS{}", record), name, SymbolKind::Data);

        let ti = self.alloc(2 * self.ps + extra);
        let kind_ptr = self.kinds[kind];
        self.write_ptr(ti, kind_ptr);
        self.write_ptr(ti + self.ps, name);
        self.symbol(&format!("_ZTI{}", record), ti, SymbolKind::Data);
        self.typeinfos.insert(class.to_string(), ti);
        ti
    }

    fn typeinfo_of(&mut self, class: &str) -> Address {
        match self.typeinfos.get(class) {
            Some(ti) => *ti,
            None => self.typeinfo(class),
        }
    }

    /// `__class_type_info` for a class without bases.
    pub fn typeinfo(&mut self, class: &str) -> Address {
        if let Some(ti) = self.typeinfos.get(class) {
            return *ti;
        }
        self.itanium_header(class, 0, 0)
    }

    pub fn typeinfo_si(&mut self, class: &str, base: &str) -> Address {
        let base_ti = self.typeinfo_of(base);
        let ti = self.itanium_header(class, 1, self.ps);
        self.write_ptr(ti + 2 * self.ps, base_ti);
        ti
    }

    pub fn typeinfo_vmi(&mut self, class: &str, flags: u32, bases: &[(&str, i64, bool)]) -> Address {
        let base_tis: Vec<Address> = bases.iter().map(|(name, _, _)| self.typeinfo_of(name)).collect();
        let ps = self.ps;
        let ti = self.itanium_header(class, 2, 8 + bases.len() as u64 * 2 * ps);
        self.write_u32(ti + 2 * ps, flags);
        self.write_u32(ti + 2 * ps + 4, bases.len() as u32);
        for (i, ((_, offset, is_virtual), base_ti)) in bases.iter().zip(base_tis).enumerate() {
            let entry = ti + 2 * ps + 8 + i as u64 * 2 * ps;
            self.write_ptr(entry, base_ti);
            // public bit plus virtual bit
            let offset_flags = (*offset << 8) | 0x2 | i64::from(*is_virtual);
            self.write_ptr(entry + ps, Address::new(offset_flags as u64));
        }
        ti
    }

    /// Lays out `[offset-to-top][typeinfo][slots...]` and names it `_ZTV...`.
    /// Returns the symbol address, which is the start of the group.
    pub fn itanium_vtable(&mut self, class: &str, typeinfo: Address, slots: &[Address]) -> Address {
        let total = LEADING_PAD_SLOTS + 2 + slots.len() as u64 + TRAILING_GAP_SLOTS;
        let start = self.alloc(total * self.ps);
        let vt = start + LEADING_PAD_SLOTS * self.ps;
        self.write_ptr(vt + self.ps, typeinfo);
        self.write_slots(vt + 2 * self.ps, slots);
        self.symbol(&format!("_ZTV{}", itanium_record(class)), vt, SymbolKind::Data);
        vt
    }

    /// Structure reference as MSVC stores it for this pointer width.
    pub fn rva(&self, addr: Address) -> u32 {
        if self.ps == 8 {
            (addr.as_u64() - self.base) as u32
        } else {
            addr.as_u64() as u32
        }
    }

    fn type_descriptor(&mut self, class: &str) -> Address {
        if let Some(td) = self.type_descriptors.get(class) {
            return *td;
        }
        let decorated = format!(".?AV{}@@", msvc_scope(class));
        let td = self.alloc(2 * self.ps + decorated.len() as u64 + 1);
        self.image
            .write_bytes(td + 2 * self.ps, decorated.as_bytes())
            .unwrap();
        self.type_descriptors.insert(class.to_string(), td);
        td
    }

    fn base_descriptor(&mut self, class: &str, mdisp: i32, is_virtual: bool) -> Address {
        let td = self.type_descriptor(class);
        let bcd = self.alloc(28);
        let td_ref = self.rva(td);
        self.write_u32(bcd, td_ref);
        self.write_u32(bcd + 8, mdisp as u32);
        self.write_u32(bcd + 12, if is_virtual { 0 } else { u32::MAX });
        self.write_u32(bcd + 16, if is_virtual { 4 } else { 0 });
        bcd
    }

    /// Builds TD, base descriptors, CHD and COL. Returns the COL address.
    pub fn msvc_class(&mut self, class: &str, bases: &[(&str, i32, bool)], attributes: u32) -> Address {
        let td = self.type_descriptor(class);
        let mut descriptors = vec![self.base_descriptor(class, 0, false)];
        for (name, mdisp, is_virtual) in bases {
            descriptors.push(self.base_descriptor(name, *mdisp, *is_virtual));
        }

        let array = self.alloc(4 * descriptors.len() as u64);
        for (i, bcd) in descriptors.iter().enumerate() {
            let r = self.rva(*bcd);
            self.write_u32(array + i as u64 * 4, r);
        }

        let chd = self.alloc(16);
        self.write_u32(chd + 4, attributes);
        self.write_u32(chd + 8, descriptors.len() as u32);
        let array_ref = self.rva(array);
        self.write_u32(chd + 12, array_ref);

        let col = self.alloc(24);
        let (td_ref, chd_ref, col_ref) = (self.rva(td), self.rva(chd), self.rva(col));
        self.write_u32(col, if self.ps == 8 { 1 } else { 0 });
        self.write_u32(col + 12, td_ref);
        self.write_u32(col + 16, chd_ref);
        if self.ps == 8 {
            self.write_u32(col + 20, col_ref);
        }
        self.hierarchies.insert(col, chd);
        col
    }

    /// Overwrites the base count of the CHD behind `col`.
    pub fn set_base_count(&mut self, col: Address, count: u32) {
        if let Some(chd) = self.hierarchies.get(&col).copied() {
            self.write_u32(chd + 8, count);
        }
    }

    /// Overwrites the base count of a `__vmi_class_type_info`.
    pub fn set_vmi_base_count(&mut self, ti: Address, count: u32) {
        let at = ti + 2 * self.ps + 4;
        self.write_u32(at, count);
    }

    /// Lays out `[COL pointer][slots...]` and names it `??_7...`. Returns
    /// the address of the first slot.
    pub fn msvc_vtable(&mut self, class: &str, col: Address, slots: &[Address]) -> Address {
        let total = LEADING_PAD_SLOTS + 1 + slots.len() as u64 + TRAILING_GAP_SLOTS;
        let start = self.alloc(total * self.ps);
        let vt = start + (LEADING_PAD_SLOTS + 1) * self.ps;
        self.write_ptr(vt - self.ps, col);
        self.write_slots(vt, slots);
        self.symbol(&format!("??_7{}@@6B@", msvc_scope(class)), vt, SymbolKind::Data);
        vt
    }

    pub fn msvc_simple_class(&mut self, class: &str, slots: &[Address]) -> Address {
        let col = self.msvc_class(class, &[], 0);
        self.msvc_vtable(class, col, slots)
    }

    pub fn finish(self) -> Fixture {
        Fixture {
            image: Arc::new(self.image),
            symbols: Arc::new(self.symbols),
            registry: Arc::new(InMemoryRegistry::with_functions(self.functions)),
            demangler: BuiltinDemangler,
            config: AnalysisConfig::default(),
        }
    }
}

// Wed Jan 15 2026 - Alex

//! Run-time type information decoding for the Itanium and MSVC ABIs.

pub mod detector;
pub mod itanium;
pub mod msvc;

pub use detector::RttiDetector;
pub use itanium::ItaniumRttiParser;
pub use msvc::{MsvcHierarchyAttributes, MsvcRttiParser};

use crate::config::AnalysisConfig;
use crate::memory::{Address, MemoryImage, PointerWidth};
use crate::symbol::{Demangler, SymbolTable};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbiFamily {
    Itanium,
    Msvc,
}

impl fmt::Display for AbiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiFamily::Itanium => write!(f, "Itanium"),
            AbiFamily::Msvc => write!(f, "MSVC"),
        }
    }
}

/// How RTTI is laid out in one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RttiConfig {
    pub abi: AbiFamily,
    pub width: PointerWidth,
    /// MSVC 64-bit only: the COL is referenced by an absolute pointer rather
    /// than an image-relative offset.
    pub absolute_col: bool,
    /// Signed byte offset from the vtable address to the RTTI slot.
    pub rtti_offset: i64,
    /// Whether a probe actually validated; defaulted configs are not cached.
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseClassInfo {
    pub class_name: String,
    pub offset: i64,
    pub is_virtual: bool,
}

impl BaseClassInfo {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            offset: 0,
            is_virtual: false,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }
}

/// Outcome marker for a parse. Neither failure kind is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RttiStatus {
    Parsed,
    /// Expected structure absent or unmapped.
    NotFound,
    /// A validator rejected the structure.
    Rejected(String),
}

impl RttiStatus {
    pub fn describe(&self) -> String {
        match self {
            RttiStatus::Parsed => "parsed".to_string(),
            RttiStatus::NotFound => "not found".to_string(),
            RttiStatus::Rejected(reason) => format!("rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Validated,
    /// Read without structural validation.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceInfo {
    pub class_name: String,
    pub base_classes: Vec<BaseClassInfo>,
    pub has_multiple_inheritance: bool,
    pub has_virtual_inheritance: bool,
    pub status: RttiStatus,
    pub confidence: Confidence,
}

impl InheritanceInfo {
    pub fn parsed(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            base_classes: Vec::new(),
            has_multiple_inheritance: false,
            has_virtual_inheritance: false,
            status: RttiStatus::Parsed,
            confidence: Confidence::Validated,
        }
    }

    pub fn not_found(class_name: impl Into<String>) -> Self {
        Self {
            status: RttiStatus::NotFound,
            ..Self::parsed(class_name)
        }
    }

    pub fn rejected(class_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: RttiStatus::Rejected(reason.into()),
            ..Self::parsed(class_name)
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.status == RttiStatus::Parsed
    }

    pub fn primary_base(&self) -> Option<&BaseClassInfo> {
        self.base_classes.first()
    }
}

/// Everything a parser reads from. Cheap to copy.
#[derive(Clone, Copy)]
pub struct RttiContext<'a> {
    pub image: &'a dyn MemoryImage,
    pub symbols: &'a dyn SymbolTable,
    pub demangler: &'a dyn Demangler,
    pub config: &'a AnalysisConfig,
}

impl<'a> RttiContext<'a> {
    pub fn pointer_size(&self) -> u64 {
        self.image.pointer_size() as u64
    }

    /// Reads a pointer and returns it only if it lands in mapped memory.
    pub(crate) fn mapped_ptr(&self, addr: Address) -> Option<Address> {
        if !self.image.is_mapped(addr) {
            return None;
        }
        let ptr = self.image.read_ptr(addr).ok()?;
        (!ptr.is_null() && self.image.is_mapped(ptr)).then_some(ptr)
    }

    pub(crate) fn read_string(&self, addr: Address) -> Option<String> {
        let s = self
            .image
            .read_c_string(addr, self.config.max_rtti_string_length)
            .ok()?;
        (!s.is_empty()).then_some(s)
    }
}

/// Common capability of the per-ABI parsers.
pub trait RttiReader {
    /// Decodes the RTTI attached to the vtable at `vtable`. `class_hint` is
    /// the name recovered from the vtable symbol, if any.
    fn parse_rtti_at(&self, vtable: Address, class_hint: &str) -> InheritanceInfo;
}

/// Parser strategy chosen once per image from its `RttiConfig`.
pub enum RttiStrategy<'a> {
    Itanium(ItaniumRttiParser<'a>),
    Msvc(MsvcRttiParser<'a>),
}

impl<'a> RttiStrategy<'a> {
    pub fn for_config(ctx: RttiContext<'a>, config: RttiConfig) -> Self {
        match config.abi {
            AbiFamily::Itanium => RttiStrategy::Itanium(ItaniumRttiParser::new(ctx, config)),
            AbiFamily::Msvc => RttiStrategy::Msvc(MsvcRttiParser::new(ctx, config)),
        }
    }
}

impl RttiReader for RttiStrategy<'_> {
    fn parse_rtti_at(&self, vtable: Address, class_hint: &str) -> InheritanceInfo {
        match self {
            RttiStrategy::Itanium(p) => p.parse_rtti_at(vtable, class_hint),
            RttiStrategy::Msvc(p) => p.parse_rtti_at(vtable, class_hint),
        }
    }
}

/// Session-scoped memo of the detected layout and per-vtable parse results.
#[derive(Debug, Default)]
pub struct RttiCache {
    config: RwLock<Option<RttiConfig>>,
    parsed: RwLock<HashMap<u64, Arc<InheritanceInfo>>>,
}

impl RttiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<RttiConfig> {
        *self.config.read()
    }

    /// Returns the cached layout, or runs `detect`. Only validated results
    /// are kept; the first one wins for the rest of the session.
    pub fn config_or_detect(&self, detect: impl FnOnce() -> RttiConfig) -> RttiConfig {
        if let Some(config) = *self.config.read() {
            return config;
        }

        let detected = detect();
        if detected.validated {
            let mut slot = self.config.write();
            if let Some(existing) = *slot {
                return existing;
            }
            log::debug!(
                "RTTI layout: {} {} offset {} (absolute COL: {})",
                detected.abi,
                detected.width,
                detected.rtti_offset,
                detected.absolute_col
            );
            *slot = Some(detected);
        }
        detected
    }

    pub fn get_or_parse(
        &self,
        vtable: Address,
        parse: impl FnOnce() -> InheritanceInfo,
    ) -> Arc<InheritanceInfo> {
        if let Some(info) = self.parsed.read().get(&vtable.as_u64()) {
            return Arc::clone(info);
        }

        let info = Arc::new(parse());
        self.parsed
            .write()
            .entry(vtable.as_u64())
            .or_insert(info)
            .clone()
    }

    pub fn parsed_count(&self) -> usize {
        self.parsed.read().len()
    }

    pub fn clear(&self) {
        *self.config.write() = None;
        self.parsed.write().clear();
    }
}

// Tue Jan 13 2026 - Alex

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Decompiler marker for virtual functions, matched anywhere in a name.
const VFUNC_MARKER: &str = "_vfunc_";

/// Scan bounds and recognition tables used throughout the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Hard cap on slots walked when no following vtable bounds the scan.
    pub max_vtable_entries: usize,
    /// Consecutive invalid slots that end a scan.
    pub consecutive_invalid_threshold: usize,
    /// Itanium start slot when probing finds nothing (offset-to-top + typeinfo).
    pub default_itanium_start_slot: usize,
    pub start_slot_probe_depth: usize,
    /// Byte offsets from the vtable address tried for the RTTI slot, in order.
    pub rtti_probe_offsets: Vec<i64>,
    pub default_rtti_offset: i64,
    pub max_msvc_base_classes: u32,
    pub max_itanium_bases: u32,
    pub min_class_name_length: usize,
    pub max_class_name_length: usize,
    pub max_rtti_string_length: usize,
    pub max_component_length: usize,
    pub prologue_opcodes: Vec<u8>,
    pub function_name_prefixes: Vec<String>,
    pub pure_virtual_markers: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_vtable_entries: 2048,
            consecutive_invalid_threshold: 5,
            default_itanium_start_slot: 2,
            start_slot_probe_depth: 4,
            rtti_probe_offsets: vec![-8, -16, 8, 0, 16, -24, 24],
            default_rtti_offset: -8,
            max_msvc_base_classes: 64,
            max_itanium_bases: 32,
            min_class_name_length: 1,
            max_class_name_length: 512,
            max_rtti_string_length: 1024,
            max_component_length: 256,
            prologue_opcodes: vec![0x55, 0x48, 0x40, 0x41],
            function_name_prefixes: vec![
                "sub_".to_string(),
                "nullsub_".to_string(),
                "j_".to_string(),
                VFUNC_MARKER.to_string(),
            ],
            pure_virtual_markers: vec!["__cxa_pure_virtual".to_string(), "_purecall".to_string()],
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate().map_err(AnalysisError::Config)?;
        Ok(config)
    }

    pub fn with_max_vtable_entries(mut self, max: usize) -> Self {
        self.max_vtable_entries = max;
        self
    }

    pub fn with_consecutive_invalid_threshold(mut self, threshold: usize) -> Self {
        self.consecutive_invalid_threshold = threshold;
        self
    }

    pub fn with_rtti_probe_offsets(mut self, offsets: Vec<i64>) -> Self {
        self.rtti_probe_offsets = offsets;
        self
    }

    pub fn class_name_bounds(&self) -> RangeInclusive<usize> {
        self.min_class_name_length..=self.max_class_name_length
    }

    pub fn is_pure_virtual_name(&self, name: &str) -> bool {
        self.pure_virtual_markers.iter().any(|m| name.contains(m.as_str()))
    }

    pub fn has_function_prefix(&self, name: &str) -> bool {
        self.function_name_prefixes.iter().any(|p| {
            if p == VFUNC_MARKER {
                name.contains(p.as_str())
            } else {
                name.starts_with(p.as_str())
            }
        })
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_vtable_entries == 0 {
            return Err("max_vtable_entries must be greater than 0".to_string());
        }
        if self.consecutive_invalid_threshold == 0 {
            return Err("consecutive_invalid_threshold must be greater than 0".to_string());
        }
        if self.rtti_probe_offsets.is_empty() {
            return Err("rtti_probe_offsets must not be empty".to_string());
        }
        if self.max_msvc_base_classes == 0 || self.max_itanium_bases == 0 {
            return Err("base class limits must be greater than 0".to_string());
        }
        if self.min_class_name_length == 0 || self.min_class_name_length > self.max_class_name_length {
            return Err("class name length bounds are empty".to_string());
        }
        if self.max_rtti_string_length == 0 || self.max_component_length == 0 {
            return Err("string limits must be greater than 0".to_string());
        }
        Ok(())
    }
}

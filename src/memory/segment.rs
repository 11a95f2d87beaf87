// Tue Jan 13 2026 - Alex

use crate::memory::{Address, MemoryRange, Protection};
use std::fmt;

/// One mapped span of the image together with its backing bytes.
///
/// Bytes past `data.len()` but inside the range read as zero (`.bss`-style
/// virtual tails).
#[derive(Debug, Clone)]
pub struct MemorySegment {
    range: MemoryRange,
    protection: Protection,
    name: String,
    data: Vec<u8>,
}

impl MemorySegment {
    pub fn new(range: MemoryRange, protection: Protection, name: String) -> Self {
        Self {
            range,
            protection,
            name,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, mut data: Vec<u8>) -> Self {
        data.truncate(self.range.size() as usize);
        self.data = data;
        self
    }

    pub fn range(&self) -> &MemoryRange {
        &self.range
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Address {
        self.range.start()
    }

    pub fn end(&self) -> Address {
        self.range.end()
    }

    pub fn size(&self) -> u64 {
        self.range.size()
    }

    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.range.contains(addr)
    }

    pub fn is_executable(&self) -> bool {
        self.protection.can_execute()
    }

    pub(crate) fn read(&self, addr: Address, len: usize) -> Option<Vec<u8>> {
        if !self.range.contains_span(addr, len) {
            return None;
        }
        let offset = (addr.as_u64() - self.start().as_u64()) as usize;
        let mut out = vec![0u8; len];
        if offset < self.data.len() {
            let avail = (self.data.len() - offset).min(len);
            out[..avail].copy_from_slice(&self.data[offset..offset + avail]);
        }
        Some(out)
    }

    pub(crate) fn write(&mut self, addr: Address, bytes: &[u8]) -> bool {
        if !self.range.contains_span(addr, bytes.len()) {
            return false;
        }
        let offset = (addr.as_u64() - self.start().as_u64()) as usize;
        let needed = offset + bytes.len();
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
        self.data[offset..needed].copy_from_slice(bytes);
        true
    }
}

impl fmt::Display for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} (file: {}, virtual: {})", self.range, self.protection, self.name, self.file_size(), self.size())
    }
}

// Tue Jan 13 2026 - Alex

use crate::memory::Address;
use std::fmt;

/// Half-open `[start, end)` span of the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    start: Address,
    end: Address,
}

impl MemoryRange {
    pub fn new(start: Address, end: Address) -> Self {
        let end = if end < start { start } else { end };
        Self { start, end }
    }

    pub fn from_start_size(start: Address, size: u64) -> Self {
        let end = start.checked_add(size).unwrap_or(Address::new(u64::MAX));
        Self::new(start, end)
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.is_within_range(self.start, self.end)
    }

    /// True when `len` bytes starting at `addr` stay inside the range.
    pub fn contains_span(&self, addr: Address, len: usize) -> bool {
        match addr.checked_add(len as u64) {
            Some(last) => self.contains(addr) && last <= self.end,
            None => false,
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

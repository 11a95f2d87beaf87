// Wed Jan 15 2026 - Alex

use crate::memory::{Address, MemoryError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    pub fn is_64(self) -> bool {
        matches!(self, Self::Bits64)
    }
}

impl fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits32 => write!(f, "32-bit"),
            Self::Bits64 => write!(f, "64-bit"),
        }
    }
}

/// Container format of the loaded image, used as a fallback ABI hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Elf,
    Pe,
    MachO,
    Unknown,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elf => write!(f, "ELF"),
            Self::Pe => write!(f, "PE"),
            Self::MachO => write!(f, "Mach-O"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Byte-addressable view of a loaded binary.
///
/// Implementors only provide mapping, raw reads and layout facts; the sized
/// little-endian readers are derived from `read_bytes`.
pub trait MemoryImage: Send + Sync {
    fn is_mapped(&self, addr: Address) -> bool;
    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError>;
    fn pointer_width(&self) -> PointerWidth;
    fn image_base(&self) -> Option<Address>;
    fn is_executable(&self, addr: Address) -> bool;

    fn file_format(&self) -> FileFormat {
        FileFormat::Unknown
    }

    fn pointer_size(&self) -> usize {
        self.pointer_width().bytes()
    }

    fn read_u8(&self, addr: Address) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    fn read_u32(&self, addr: Address) -> Result<u32, MemoryError> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&self, addr: Address) -> Result<i32, MemoryError> {
        self.read_u32(addr).map(|v| v as i32)
    }

    fn read_u64(&self, addr: Address) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(addr, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&self, addr: Address) -> Result<i64, MemoryError> {
        self.read_u64(addr).map(|v| v as i64)
    }

    /// Reads one pointer-sized word at the image's pointer width.
    fn read_ptr(&self, addr: Address) -> Result<Address, MemoryError> {
        match self.pointer_width() {
            PointerWidth::Bits64 => self.read_u64(addr).map(Address::new),
            PointerWidth::Bits32 => self.read_u32(addr).map(|v| Address::new(v as u64)),
        }
    }

    /// Reads a pointer-sized signed word (Itanium `__offset_flags`).
    fn read_isize(&self, addr: Address) -> Result<i64, MemoryError> {
        match self.pointer_width() {
            PointerWidth::Bits64 => self.read_i64(addr),
            PointerWidth::Bits32 => self.read_i32(addr).map(|v| v as i64),
        }
    }

    /// Reads bytes until NUL, a non-printable byte or `max_len`.
    fn read_c_string(&self, addr: Address, max_len: usize) -> Result<String, MemoryError> {
        if !self.is_mapped(addr) {
            return Err(MemoryError::Unmapped(addr.as_u64()));
        }
        let mut out = String::new();
        for i in 0..max_len as u64 {
            let Ok(byte) = self.read_u8(addr + i) else { break };
            if byte == 0 || !(byte.is_ascii_graphic() || byte == b' ') {
                break;
            }
            out.push(byte as char);
        }
        Ok(out)
    }
}

pub trait MemoryWriter {
    fn write_bytes(&mut self, addr: Address, data: &[u8]) -> Result<(), MemoryError>;

    fn write_u8(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(addr, &[value])
    }

    fn write_u32(&mut self, addr: Address, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    fn write_u64(&mut self, addr: Address, value: u64) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }
}

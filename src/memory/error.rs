// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Address 0x{0:X} is not mapped")]
    Unmapped(u64),
    #[error("Read of {1} bytes at 0x{0:X} crosses the end of its segment")]
    OutOfBounds(u64, usize),
    #[error("Segment {0} overlaps an existing segment")]
    OverlappingSegment(String),
    #[error("Binary parse error: {0}")]
    BinaryParseError(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}

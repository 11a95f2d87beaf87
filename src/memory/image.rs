// Wed Jan 15 2026 - Alex

use crate::memory::{
    Address, FileFormat, MemoryError, MemoryImage, MemoryRange, MemorySegment, MemoryWriter,
    PointerWidth, Protection,
};

/// In-memory image assembled from named segments.
///
/// This is what the binary loader produces, and what tests build by hand.
#[derive(Debug, Clone)]
pub struct SegmentedImage {
    segments: Vec<MemorySegment>,
    width: PointerWidth,
    base: Option<Address>,
    format: FileFormat,
}

impl SegmentedImage {
    pub fn new(width: PointerWidth, format: FileFormat) -> Self {
        Self {
            segments: Vec::new(),
            width,
            base: None,
            format,
        }
    }

    pub fn with_image_base(mut self, base: Address) -> Self {
        self.base = Some(base);
        self
    }

    /// Maps a zero-filled segment. Segments are kept sorted by start address.
    pub fn map(
        &mut self,
        name: &str,
        start: Address,
        size: u64,
        protection: Protection,
    ) -> Result<(), MemoryError> {
        self.add_segment(MemorySegment::new(
            MemoryRange::from_start_size(start, size),
            protection,
            name.to_string(),
        ))
    }

    pub fn add_segment(&mut self, segment: MemorySegment) -> Result<(), MemoryError> {
        if segment.range().is_empty() {
            return Ok(());
        }
        if self.segments.iter().any(|s| s.range().overlaps(segment.range())) {
            return Err(MemoryError::OverlappingSegment(segment.name().to_string()));
        }
        let pos = self
            .segments
            .partition_point(|s| s.start() < segment.start());
        self.segments.insert(pos, segment);
        Ok(())
    }

    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    fn segment_at(&self, addr: Address) -> Option<&MemorySegment> {
        let idx = self.segments.partition_point(|s| s.end() <= addr);
        self.segments.get(idx).filter(|s| s.contains(addr))
    }

    fn segment_at_mut(&mut self, addr: Address) -> Option<&mut MemorySegment> {
        let idx = self.segments.partition_point(|s| s.end() <= addr);
        self.segments.get_mut(idx).filter(|s| s.contains(addr))
    }
}

impl MemoryImage for SegmentedImage {
    fn is_mapped(&self, addr: Address) -> bool {
        self.segment_at(addr).is_some()
    }

    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let segment = self
            .segment_at(addr)
            .ok_or(MemoryError::Unmapped(addr.as_u64()))?;
        segment
            .read(addr, len)
            .ok_or(MemoryError::OutOfBounds(addr.as_u64(), len))
    }

    fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    fn image_base(&self) -> Option<Address> {
        self.base
    }

    fn is_executable(&self, addr: Address) -> bool {
        self.segment_at(addr).map(|s| s.is_executable()).unwrap_or(false)
    }

    fn file_format(&self) -> FileFormat {
        self.format
    }
}

impl MemoryWriter for SegmentedImage {
    fn write_bytes(&mut self, addr: Address, data: &[u8]) -> Result<(), MemoryError> {
        let segment = self
            .segment_at_mut(addr)
            .ok_or(MemoryError::Unmapped(addr.as_u64()))?;
        if segment.write(addr, data) {
            Ok(())
        } else {
            Err(MemoryError::OutOfBounds(addr.as_u64(), data.len()))
        }
    }
}

impl SegmentedImage {
    /// Writes one pointer at the image's pointer width.
    pub fn write_ptr(&mut self, addr: Address, value: Address) -> Result<(), MemoryError> {
        match self.width {
            PointerWidth::Bits64 => self.write_u64(addr, value.as_u64()),
            PointerWidth::Bits32 => self.write_u32(addr, value.as_u64() as u32),
        }
    }
}

// Tue Jan 13 2026 - Alex

pub mod address;
pub mod binary;
pub mod error;
pub mod image;
pub mod protection;
pub mod range;
pub mod segment;
pub mod traits;

pub use address::Address;
pub use binary::{load_binary, LoadedBinary};
pub use error::MemoryError;
pub use image::SegmentedImage;
pub use protection::Protection;
pub use range::MemoryRange;
pub use segment::MemorySegment;
pub use traits::{FileFormat, MemoryImage, MemoryWriter, PointerWidth};

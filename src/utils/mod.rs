// Tue Jan 13 2026 - Alex

pub mod logging;

pub use logging::{LoggingUtils, ScopedTimer};

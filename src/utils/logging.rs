// Tue Jan 13 2026 - Alex

use colored::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct LoggingUtils;

impl LoggingUtils {
    /// Uses `env_logger` when `RUST_LOG` is set, the coloured stderr logger
    /// otherwise.
    pub fn init(verbosity: u8, color: bool) {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = env_logger::try_init();
            return;
        }

        let level = Self::level_from_verbosity(verbosity);
        let logger = Box::new(ColoredLogger::new(level, color));
        log::set_boxed_logger(logger).ok();
        log::set_max_level(level);
    }

    pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

struct ColoredLogger {
    level: LevelFilter,
    use_color: AtomicBool,
}

impl ColoredLogger {
    fn new(level: LevelFilter, color: bool) -> Self {
        Self {
            level,
            use_color: AtomicBool::new(color),
        }
    }

    fn format_level(&self, level: Level) -> ColoredString {
        match level {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN ".yellow().bold(),
            Level::Info => "INFO ".green().bold(),
            Level::Debug => "DEBUG".blue().bold(),
            Level::Trace => "TRACE".magenta().bold(),
        }
    }
}

impl Log for ColoredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let target = record.target().trim_start_matches("vtable_explorer::");
        if self.use_color.load(Ordering::Relaxed) {
            eprintln!(
                "{} {} {}",
                self.format_level(record.level()),
                format!("[{}]", target).dimmed(),
                record.args()
            );
        } else {
            eprintln!("{:5} [{}] {}", record.level(), target, record.args());
        }
    }

    fn flush(&self) {}
}

/// Logs the elapsed time of a scope at debug level when dropped.
pub struct ScopedTimer {
    name: String,
    start: std::time::Instant,
}

impl ScopedTimer {
    pub fn new(name: &str) -> Self {
        log::trace!("[TIMER] {} started", name);
        Self {
            name: name.to_string(),
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::debug!("[TIMER] {} took {:.2}ms", self.name, self.elapsed_ms());
    }
}

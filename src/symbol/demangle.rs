// Tue Jan 13 2026 - Alex

use crate::symbol::Demangler;
use cpp_demangle::{DemangleOptions, Symbol};
use msvc_demangler::DemangleFlags;
use std::fmt;

/// Longest mangled name handed to either backend.
pub const MAX_MANGLED_LEN: usize = 1024;
/// Demangled output is abandoned once it grows past this.
pub const MAX_DEMANGLED_LEN: usize = 4096;

/// Demangler backed by `cpp_demangle` (Itanium) and `msvc_demangler`.
///
/// Raw RTTI type descriptor names (`.?AVName@@`) are accepted as well and
/// come back as `class Name` / `struct Name`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDemangler;

impl Demangler for BuiltinDemangler {
    fn demangle(&self, mangled: &str) -> Option<String> {
        demangle(mangled)
    }
}

pub fn demangle(name: &str) -> Option<String> {
    if name.is_empty() || name.len() > MAX_MANGLED_LEN {
        return None;
    }

    if name.starts_with("_Z") || name.starts_with("__Z") {
        demangle_itanium(name)
    } else if name.starts_with('?') {
        demangle_msvc(name)
    } else if let Some(rest) = name.strip_prefix('.') {
        demangle_type_descriptor(rest)
    } else {
        None
    }
}

/// `fmt::Write` sink that fails once `limit` bytes have been written.
struct BoundedOutput {
    buf: String,
    limit: usize,
}

impl fmt::Write for BoundedOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.len() + s.len() > self.limit {
            return Err(fmt::Error);
        }
        self.buf.push_str(s);
        Ok(())
    }
}

pub fn demangle_itanium(mangled: &str) -> Option<String> {
    let symbol = Symbol::new(mangled).ok()?;
    let mut out = BoundedOutput {
        buf: String::new(),
        limit: MAX_DEMANGLED_LEN,
    };
    if symbol
        .structured_demangle(&mut out, &DemangleOptions::default())
        .is_err()
    {
        log::trace!("Itanium demangling of {} failed or ran over", mangled);
        return None;
    }
    (!out.buf.is_empty()).then_some(out.buf)
}

pub fn demangle_msvc(mangled: &str) -> Option<String> {
    if !mangled.starts_with('?') {
        return None;
    }
    let out = msvc_demangler::demangle(mangled, DemangleFlags::COMPLETE).ok()?;
    (!out.is_empty() && out.len() <= MAX_DEMANGLED_LEN).then_some(out)
}

/// `?AVInner@Outer@@` is demangled as the type descriptor symbol
/// `??_R0?AVInner@Outer@@@8`, then cut before the descriptor suffix.
fn demangle_type_descriptor(decorated: &str) -> Option<String> {
    if !decorated.starts_with("?A") {
        return None;
    }
    let full = demangle_msvc(&format!("??_R0{}@8", decorated))?;
    let name = full
        .find('`')
        .map_or(full.as_str(), |tick| &full[..tick])
        .trim_end_matches(|c: char| c == ' ' || c == ':');
    (!name.is_empty()).then(|| name.to_string())
}

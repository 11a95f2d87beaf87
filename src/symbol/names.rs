// Tue Jan 13 2026 - Alex

//! Class-name recovery from vtable symbols and RTTI name records.

use std::ops::RangeInclusive;

pub const ITANIUM_VTABLE_PREFIX: &str = "_ZTV";
pub const MSVC_VTABLE_PREFIX: &str = "??_7";

const VTABLE_FOR: &str = "vtable for ";
const TYPEINFO_FOR: &str = "typeinfo for ";
const VFTABLE_MARKER: &str = "::`vftable'";
const CONST_MARKER: &str = "const ";

/// Plausibility filter applied to every recovered class name.
pub fn is_valid_class_name(name: &str, len_bounds: &RangeInclusive<usize>) -> bool {
    if !len_bounds.contains(&name.len()) {
        return false;
    }

    let first = match name.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_uppercase() && first != '_' {
        return false;
    }

    let word_chars = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    if word_chars == 0 {
        return false;
    }

    if name.len() >= 2 && name.chars().all(|c| c == first) {
        return false;
    }

    // mostly identifier characters
    if word_chars * 10 < name.chars().count() * 6 {
        return false;
    }

    mangling_artifacts(name) <= 3
}

/// Counts `EL`, `EE` and `L<digit>` pairs left behind by a broken extraction.
fn mangling_artifacts(name: &str) -> usize {
    name.as_bytes()
        .windows(2)
        .filter(|w| {
            (w[0] == b'E' && (w[1] == b'L' || w[1] == b'E')) || (w[0] == b'L' && w[1].is_ascii_digit())
        })
        .count()
}

/// Pulls the class out of a demangled vtable name.
///
/// Handles `vtable for X` and `const X::`vftable'` (with or without a
/// trailing `{for ...}` clause).
pub fn class_from_demangled_vtable(demangled: &str) -> Option<String> {
    if let Some(pos) = demangled.find(VTABLE_FOR) {
        let class = &demangled[pos + VTABLE_FOR.len()..];
        return (!class.is_empty()).then(|| class.to_string());
    }

    let vft = demangled.find(VFTABLE_MARKER)?;
    let start = demangled.find(CONST_MARKER)? + CONST_MARKER.len();
    if start >= vft {
        return None;
    }
    Some(demangled[start..vft].to_string())
}

pub fn class_from_demangled_typeinfo(demangled: &str) -> Option<String> {
    let class = demangled.strip_prefix(TYPEINFO_FOR).unwrap_or(demangled).trim();
    let class = class
        .strip_prefix("class ")
        .or_else(|| class.strip_prefix("struct "))
        .unwrap_or(class);
    (!class.is_empty()).then(|| class.to_string())
}

/// Manual decode of `_ZTV<name>` when demangling fails.
///
/// Nested names keep only their last component.
pub fn itanium_vtable_fallback(
    symbol: &str,
    max_component: usize,
    len_bounds: &RangeInclusive<usize>,
) -> Option<String> {
    let body = symbol.strip_prefix(ITANIUM_VTABLE_PREFIX)?;

    if let Some(nested) = body.strip_prefix('N') {
        let last = last_nested_component(nested, max_component)?;
        return is_valid_class_name(&last, len_bounds).then_some(last);
    }

    let (class, _) = read_length_prefixed(body, max_component)?;
    if is_valid_class_name(class, len_bounds) {
        return Some(class.to_string());
    }

    // `E18CSVCMsg_HLTVStatusL13...` style leftovers: keep from the first
    // uppercase letter up to a template literal marker
    let first_upper = class.find(|c: char| c.is_ascii_uppercase())?;
    let end = class
        .as_bytes()
        .windows(2)
        .position(|w| w[0] == b'L' && w[1].is_ascii_digit())
        .filter(|&p| p > first_upper)
        .unwrap_or(class.len());
    let cleaned = &class[first_upper..end];
    is_valid_class_name(cleaned, len_bounds).then(|| cleaned.to_string())
}

fn last_nested_component(nested: &str, max_component: usize) -> Option<String> {
    let bytes = nested.as_bytes();
    let mut pos = 0;
    let mut last = None;

    while pos < bytes.len() && bytes[pos] != b'E' {
        if bytes[pos].is_ascii_digit() {
            let (component, consumed) = read_length_prefixed(&nested[pos..], max_component)?;
            last = Some(component.to_string());
            pos += consumed;
        } else {
            pos += 1;
        }
    }

    last
}

/// Reads `<decimal length><bytes>` from the front of `input`.
///
/// Returns the component and the number of bytes consumed.
pub fn read_length_prefixed(input: &str, max_len: usize) -> Option<(&str, usize)> {
    let digits = input.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 6 {
        return None;
    }
    let len: usize = input[..digits].parse().ok()?;
    if len == 0 || len > max_len {
        return None;
    }
    let end = digits.checked_add(len)?;
    let component = input.get(digits..end)?;
    Some((component, end))
}

/// Class name from an Itanium type-string record such as `7Derived` or
/// `N3app6WidgetE`. Nested components are joined with `::`.
pub fn itanium_type_string_class(record: &str, max_component: usize) -> Option<String> {
    let record = record.strip_prefix("_ZTS").unwrap_or(record);

    if let Some(nested) = record.strip_prefix('N') {
        let mut parts = Vec::new();
        let mut rest = nested;
        while let Some((component, consumed)) = read_length_prefixed(rest, max_component) {
            parts.push(component);
            rest = &rest[consumed..];
        }
        return (!parts.is_empty()).then(|| parts.join("::"));
    }

    read_length_prefixed(record, max_component).map(|(c, _)| c.to_string())
}

/// Manual decode of `??_7<reverse scope>@@6B...` when demangling fails.
pub fn msvc_vtable_fallback(symbol: &str) -> Option<String> {
    let body = symbol.strip_prefix(MSVC_VTABLE_PREFIX)?;
    let end = body.find("@@6B").or_else(|| body.find("@@"))?;
    let name = clean_msvc_decorated_name(&normalize_msvc_nested_class(&body[..end]));
    (!name.is_empty()).then_some(name)
}

/// Name from a raw type descriptor string such as `.?AVInner@Outer@@`.
pub fn msvc_type_descriptor_fallback(raw: &str) -> Option<String> {
    let body = raw.strip_prefix(".?A").or_else(|| raw.strip_prefix("?A"))?;
    let body = body
        .strip_prefix(|c: char| matches!(c, 'V' | 'U' | 'T'))
        .unwrap_or(body)
        .trim_end_matches('@');
    let name = clean_msvc_decorated_name(&normalize_msvc_nested_class(body));
    (!name.is_empty()).then_some(name)
}

/// `Inner@Outer` becomes `Outer::Inner`.
pub fn normalize_msvc_nested_class(name: &str) -> String {
    if !name.contains('@') {
        return name.to_string();
    }

    name.split('@')
        .rev()
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}

/// Strips template markers and hashed scopes from a partially decoded MSVC
/// name.
pub fn clean_msvc_decorated_name(name: &str) -> String {
    let mut result = match name.rfind("?$") {
        Some(marker) => name[marker + 2..].to_string(),
        None => name.to_string(),
    };

    while let Some(hash) = result.find("::$") {
        match result[hash + 3..].find("::") {
            Some(rel) => result.replace_range(hash..hash + 3 + rel, ""),
            None => break,
        }
    }

    if result.starts_with('$') && result.len() > 3 {
        let prefix_end = result[1..]
            .find(|c: char| !c.is_ascii_hexdigit())
            .map(|p| p + 1);
        if let Some(end) = prefix_end.filter(|&e| e > 1) {
            result = result[end..].to_string();
        }
    }

    result
}

//! Name sanitization and clash resolution, spec.md §4.3 phases 4–5.

use std::collections::HashSet;

/// Maps an original name to its CF-legal form: replace any character not
/// in `[A-Za-z0-9_]` with `_`; if the first character is a digit, prefix
/// `_`.
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        out.insert(0, '_');
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Resolves a name collision against `taken` by appending `_1`, `_2`, …
/// until the result is unique, per spec.md §4.3 phase 5: "If after
/// sanitization two items collide, append `_1`, `_2`, … to the later ones
/// in source order until unique across the union of all three buckets."
pub fn resolve_clash(sanitized: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(sanitized) {
        return sanitized.to_string();
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{sanitized}_{suffix}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_illegal_chars() {
        assert_eq!("Sensor_Name", sanitize("Sensor Name"));
        assert_eq!("_2A12", sanitize("2A12"));
        assert_eq!("a_b_c", sanitize("a.b-c"));
    }

    #[test]
    fn resolve_clash_appends_suffix() {
        let mut taken = HashSet::new();
        taken.insert("latitude".to_string());
        taken.insert("latitude_1".to_string());
        assert_eq!("latitude_2", resolve_clash("latitude", &taken));
        assert_eq!("longitude", resolve_clash("longitude", &taken));
    }
}

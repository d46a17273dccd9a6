//! String helpers shared across crates.

/// Truncate `s` to at most `max_bytes` without splitting a UTF-8 character.
#[must_use]
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    &s[..end]
}

/// Truncate `s` to `max_bytes` and append a visible marker naming how many
/// bytes were dropped.
///
/// Returns the input unchanged when it already fits.
#[must_use]
pub fn truncate_with_marker(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let kept = truncate_to_boundary(s, max_bytes);
    let dropped = s.len().saturating_sub(kept.len());
    format!("{kept}{}", truncation_marker(dropped))
}

/// Marker appended where content was cut.
#[must_use]
pub fn truncation_marker(dropped_bytes: usize) -> String {
    format!("\n[... truncated {dropped_bytes} bytes]")
}

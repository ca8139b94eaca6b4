//! Shared string helpers for logging and display.

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() { return s; }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Format a progress fraction for display, e.g. `42%`.
pub fn format_percent(value: f64) -> String {
    format!("{}%", value.clamp(0.0, 100.0).round() as i64)
}

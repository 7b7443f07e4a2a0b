//! Text normalization used for duplicate detection.

/// Normalize text for duplicate checks (trim, lowercase, collapse whitespace).
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut prev_space = false;

    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                normalized.push(' ');
                prev_space = true;
            }
        } else {
            normalized.extend(ch.to_lowercase());
            prev_space = false;
        }
    }

    normalized
}

/// Whether two texts are the same memory once normalized.
#[must_use]
pub fn same_memory(a: &str, b: &str) -> bool {
    normalize_text(a) == normalize_text(b)
}

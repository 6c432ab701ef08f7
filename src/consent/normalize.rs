//! Comparison-form normalization for keyword matching.
//!
//! Both message text and rule keywords go through [`normalize`], so "Sí",
//! "SI" and "si" compare equal and punctuation never glues words together.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, fold accents, turn every non-alphanumeric run into a single
/// space and trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Normalized text padded with one space on each side, so whole-word
/// phrases can be found as ` phrase ` substrings.
pub fn padded(normalized: &str) -> String {
    format!(" {normalized} ")
}

/// Number of words in a normalized string.
pub fn word_count(normalized: &str) -> usize {
    normalized.split(' ').filter(|w| !w.is_empty()).count()
}

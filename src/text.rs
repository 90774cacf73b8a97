//! Text cleaning and lightweight metadata heuristics.
//!
//! Cleaning is applied once to the final fused document text (not per
//! page) so page-boundary whitespace is normalized globally. The metadata
//! heuristics are deliberately simple line scans — documented best-effort,
//! not guaranteed correct.

use std::collections::BTreeMap;

/// Normalize whitespace: collapse 3+ consecutive newlines to exactly two,
/// collapse runs of spaces to one, and trim the ends.
///
/// Idempotent: cleaning already-clean text is a no-op.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut prev_space = false;
    for ch in out.chars() {
        if ch == ' ' {
            if !prev_space {
                collapsed.push(ch);
            }
            prev_space = true;
        } else {
            prev_space = false;
            collapsed.push(ch);
        }
    }

    collapsed.trim().to_string()
}

/// Derive best-effort metadata from cleaned text.
///
/// `title` is the first non-blank line. `authors` is the first line that
/// mentions "author" (case-insensitive) or starts with the word "by" —
/// a single match, taken verbatim with no name normalization.
pub fn extract_metadata(text: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if let Some(first) = lines.first() {
        metadata.insert("title".to_string(), (*first).to_string());
    }

    if let Some(authors) = lines.iter().find(|l| is_author_line(l)) {
        metadata.insert("authors".to_string(), (*authors).to_string());
    }

    metadata
}

/// True if the line mentions "author" anywhere or opens with the word "by".
fn is_author_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if lower.contains("author") {
        return true;
    }
    match lower.strip_prefix("by") {
        Some(rest) => match rest.chars().next() {
            // word boundary after "by": end of line or a non-word character
            None => true,
            Some(c) => !(c.is_alphanumeric() || c == '_'),
        },
        None => false,
    }
}

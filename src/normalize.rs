//! Text cleanup applied before vectorization.
//!
//! Case messages arrive as rendered email bodies: HTML fragments, quoted
//! reply chains, and signature blocks. None of that should reach the
//! embedding model, so [`normalize`] strips it down to the prose that
//! actually carries meaning.

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn signature_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)best regards|kind regards").expect("valid regex"))
}

/// Clean raw message or document text for embedding.
///
/// - replaces HTML-like tags with a space
/// - drops `>`-quoted reply lines
/// - cuts the text at a `--` signature line or at a "best regards" /
///   "kind regards" marker (case-insensitive)
/// - collapses whitespace runs and trims
///
/// Pure and total: any input yields a (possibly empty) string.
pub fn normalize(text: &str) -> String {
    let without_tags = tag_re().replace_all(text, " ");

    let mut kept = String::with_capacity(without_tags.len());
    for line in without_tags.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('>') {
            continue;
        }
        // Signature delimiter: everything after it is discarded.
        if trimmed.trim_end() == "--" {
            break;
        }
        if let Some(m) = signature_marker_re().find(line) {
            kept.push_str(&line[..m.start()]);
            kept.push('\n');
            break;
        }
        kept.push_str(line);
        kept.push('\n');
    }

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

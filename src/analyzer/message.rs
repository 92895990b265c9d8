use regex::Regex;
use std::sync::OnceLock;

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([A-Za-z_][A-Za-z0-9_.]*)""#).unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\b").unwrap())
}

/// Identifiers the analyzer quoted in a message, in order of appearance
pub fn quoted_identifiers(message: &str) -> Vec<String> {
    quoted_re()
        .captures_iter(message)
        .map(|c| c[1].to_string())
        .collect()
}

/// Collapse a message to its structural shape: quoted identifiers become
/// `_`, integer literals become `N`. Two diagnostics with the same code and
/// skeleton are instances of the same pattern.
pub fn message_skeleton(message: &str) -> String {
    let no_idents = quoted_re().replace_all(message, "\"_\"");
    number_re().replace_all(&no_idents, "N").trim().to_string()
}

/// Stable content hash for deduplication across scans. Line numbers are
/// deliberately excluded so edits elsewhere in the file do not spawn
/// duplicate rows; the message keeps its identifiers so issues about
/// different names stay distinct.
pub fn content_hash(file: &str, code: &str, message: &str) -> String {
    let normalized = format!(
        "{file}\u{0}{code}\u{0}{}",
        message.split_whitespace().collect::<Vec<_>>().join(" ")
    );
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

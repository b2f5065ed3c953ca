use sha2::{Digest, Sha256};

/// Portable, deterministic file name for a record label: `{sanitized}--{short_hash(label)}.json`.
///
/// The hash keeps labels that sanitize to the same text apart.
pub fn record_filename(label: &str) -> String {
    let sanitized = sanitize_label(label);
    let hash = short_hash(label);
    format!("{sanitized}--{hash}.json")
}

fn sanitize_label(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        // Collapse runs of underscores.
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    let mut cleaned = compacted.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "record".to_string();
    }
    truncate_chars(&mut cleaned, 60);
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode_labels_are_kept() {
        let name = record_filename("一心一意");
        assert!(name.starts_with("一心一意--"));
        assert!(name.ends_with(".json"));
        assert_eq!(name, record_filename("一心一意"));
    }

    #[test]
    fn forbidden_characters_collapse() {
        let name = record_filename("a/:b");
        assert!(name.starts_with("a_b--"));
        assert_ne!(name, record_filename("a//b"));
    }

    #[test]
    fn reserved_and_empty_names_are_patched() {
        assert!(record_filename("con").starts_with("con_--"));
        assert!(record_filename("...").starts_with("record--"));
    }

    #[test]
    fn long_labels_truncate_on_char_boundary() {
        let label = "字".repeat(100);
        let name = record_filename(&label);
        let stem = name.split("--").next().unwrap();
        assert_eq!(stem.chars().count(), 60);
    }
}

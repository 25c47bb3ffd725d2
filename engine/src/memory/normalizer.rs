//! Keyword blob normalization
//!
//! Turns a free-text keyword blob (tokenizer output, a stored preference
//! string, a legacy file value) into trimmed, non-empty tokens.

use sdk::types::is_none_sentinel;

/// Separator used when joining tokens back into a preference string.
pub const CANONICAL_SEPARATOR: char = ',';

/// Separators folded into [`CANONICAL_SEPARATOR`] before splitting:
/// full-width comma and ideographic enumeration comma.
pub const ALTERNATE_SEPARATORS: [char; 2] = ['\u{FF0C}', '\u{3001}'];

/// Split a keyword blob into normalized tokens.
///
/// Empty input and the "none" sentinels yield an empty vector.
pub fn normalize(raw: &str) -> Vec<String> {
    if is_none_sentinel(raw) {
        return Vec::new();
    }

    raw.split(|c: char| c == CANONICAL_SEPARATOR || ALTERNATE_SEPARATORS.contains(&c))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Join tokens with the canonical separator.
pub fn join(tokens: &[String]) -> String {
    tokens.join(&CANONICAL_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_canonical_separator() {
        assert_eq!(normalize("fishing,reading"), vec!["fishing", "reading"]);
    }

    #[test]
    fn test_folds_alternate_separators() {
        assert_eq!(
            normalize("钓鱼，看书、电影,tea"),
            vec!["钓鱼", "看书", "电影", "tea"]
        );
    }

    #[test]
    fn test_trims_and_drops_empty_pieces() {
        assert_eq!(normalize("  a , ,b,,  "), vec!["a", "b"]);
    }

    #[test]
    fn test_sentinels_are_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize("none").is_empty());
        assert!(normalize("无").is_empty());
    }

    #[test]
    fn test_join_uses_canonical_separator() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        assert_eq!(join(&tokens), "a,b");
    }
}

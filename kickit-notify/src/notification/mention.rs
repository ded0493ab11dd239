//! `@nickname` extraction from comment text.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::error;

const MENTION_PATTERN: &str = r"@(\w+)";

fn mention_regex() -> Option<&'static Regex> {
    static MENTION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    MENTION_RE
        .get_or_init(|| match Regex::new(MENTION_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                error!(error = %e, "Invalid mention pattern; mentions disabled");
                None
            }
        })
        .as_ref()
}

/// Nicknames mentioned in `text`, in order of first appearance, without
/// duplicates. `\w` is Unicode-aware, so non-Latin nicknames match.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let Some(re) = mention_regex() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|nickname| seen.insert(*nickname))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_in_order_without_duplicates() {
        assert_eq!(
            extract_mentions("@bob hi @alice, and again @bob"),
            vec!["bob".to_string(), "alice".to_string()]
        );
    }

    #[test]
    fn test_no_mentions() {
        assert!(extract_mentions("no mentions here").is_empty());
        assert!(extract_mentions("trailing @").is_empty());
        assert!(extract_mentions("").is_empty());
    }

    #[test]
    fn test_unicode_and_punctuation() {
        assert_eq!(extract_mentions("@민수! 안녕"), vec!["민수".to_string()]);
        assert_eq!(extract_mentions("(@carol_99)"), vec!["carol_99".to_string()]);
        // Email-like text still yields the part after '@'.
        assert_eq!(extract_mentions("mail me at x@host"), vec!["host".to_string()]);
    }

    #[test]
    fn test_case_is_preserved() {
        assert_eq!(
            extract_mentions("@Bob @bob"),
            vec!["Bob".to_string(), "bob".to_string()]
        );
    }
}

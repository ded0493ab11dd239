//! Text helpers for notification bodies.

/// Truncate to at most `max_chars` characters, appending `…` when anything
/// was cut. Counts `char`s, never splits a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    match input.char_indices().nth(max_chars) {
        None => input.to_string(),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + '…'.len_utf8());
            out.push_str(&input[..cut]);
            out.push('…');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_unchanged() {
        assert_eq!(truncate_chars("hello", 100), "hello");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_exact_length_has_no_ellipsis() {
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_long_input_is_cut_on_char_boundary() {
        assert_eq!(truncate_chars("안녕하세요", 2), "안녕…");
        assert_eq!(truncate_chars("abcdef", 4), "abcd…");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}

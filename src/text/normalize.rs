//! Text normalization.

use std::sync::LazyLock;

use regex::Regex;

/// Anything that is neither a word character nor whitespace.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex is valid"));

/// Lowercase, drop punctuation and collapse whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into tokens. Never yields an empty token.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Subject: Sale! Buy NOW"), "subject sale buy now");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  a \t\n b   c "), "a b c");
    }

    #[test]
    fn apostrophes_join_words() {
        assert_eq!(tokenize("Don't stop"), vec!["dont", "stop"]);
    }

    #[test]
    fn keeps_digits_and_underscores() {
        assert_eq!(tokenize("order_id 4521!"), vec!["order_id", "4521"]);
    }

    #[test]
    fn punctuation_only_is_empty() {
        assert!(tokenize("?!... --- ***").is_empty());
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn unicode_letters_survive() {
        assert_eq!(tokenize("Café — Ünïcode"), vec!["café", "ünïcode"]);
    }
}

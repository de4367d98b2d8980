//! Text normalization applied to references and hypotheses before scoring.
//!
//! The rules are fixed because they change WER/CER materially; both sides
//! of every comparison go through the same chain.

/// Normalize text for scoring.
///
/// Applies, in order:
/// 1. Unicode lowercasing
/// 2. ASCII punctuation removal
/// 3. collapsing whitespace runs to a single ASCII space
/// 4. trimming leading/trailing whitespace
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }

    out
}

/// Word tokens of an already-normalized string.
pub fn words(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Character tokens of an already-normalized string.
///
/// Inter-word whitespace was collapsed by [`normalize`], so each
/// remaining space counts as exactly one character.
pub fn chars(normalized: &str) -> Vec<char> {
    normalized.chars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Hello, World!"), "hello world");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("  the\tcat \n sat  "), "the cat sat");
    }

    #[test]
    fn empty_and_punctuation_only_normalize_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!... ,"), "");
    }

    #[test]
    fn keeps_non_ascii_letters() {
        assert_eq!(normalize("Namaste Δ"), "namaste δ");
    }

    #[test]
    fn word_and_char_tokens() {
        let n = normalize("The cat sat.");
        assert_eq!(words(&n), ["the", "cat", "sat"]);
        assert_eq!(chars(&n).len(), "the cat sat".chars().count());
    }
}

//! Lexical similarity primitives shared by the budget tracker and the
//! convergence detector.

use std::collections::HashSet;

/// Case-folded, whitespace-tokenized word set.
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Word-set Jaccard overlap (intersection over union).
///
/// Returns 0.0 when either text has no words.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_are_fully_similar() {
        let text = "the auth system uses JWT tokens";
        assert!((jaccard_similarity(text, text) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "auth system uses JWT tokens";
        let b = "JWT tokens auth system security";
        assert_eq!(jaccard_similarity(a, b), jaccard_similarity(b, a));
    }

    #[test]
    fn empty_text_has_zero_similarity() {
        assert_eq!(jaccard_similarity("", "anything"), 0.0);
        assert_eq!(jaccard_similarity("anything", ""), 0.0);
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("   ", "  \t "), 0.0);
    }

    #[test]
    fn comparison_is_case_insensitive() {
        assert!((jaccard_similarity("Rust Tokio", "rust TOKIO") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn partial_overlap() {
        // {a, b, c} vs {b, c, d}: 2 shared of 4 total
        assert!((jaccard_similarity("a b c", "b c d") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }
}

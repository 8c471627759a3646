///! Fuzzy text similarity

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Similarity of two short strings in `[0, 1]`
///
/// Blends word-level Jaccard (0.3) with character-bigram Dice (0.7) so that both reordered words
/// and small typos score well. Containment of one string in the other scores by length ratio when
/// that is higher.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let blended = 0.3 * word_jaccard(&a, &b) + 0.7 * bigram_dice(&a, &b);

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let containment = if long.contains(short.as_str()) {
        short.chars().count() as f64 / long.chars().count() as f64
    } else {
        0.0
    };

    blended.max(containment).clamp(0.0, 1.0)
}

fn normalize(text: &str) -> String {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_jaccard(a: &str, b: &str) -> f64 {
    let wa: HashSet<&str> = a.split(' ').collect();
    let wb: HashSet<&str> = b.split(' ').collect();
    let union = wa.union(&wb).count();
    if union == 0 {
        0.0
    } else {
        wa.intersection(&wb).count() as f64 / union as f64
    }
}

fn bigram_dice(a: &str, b: &str) -> f64 {
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() || bb.is_empty() {
        return 0.0;
    }
    let shared = ba.intersection(&bb).count();
    2.0 * shared as f64 / (ba.len() + bb.len()) as f64
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_ignoring_case_and_punctuation() {
        assert_eq!(text_similarity("Sign In", "sign in!"), 1.0);
    }

    #[test]
    fn test_typo_scores_high() {
        assert!(text_similarity("Submit order", "Submt order") > 0.6);
    }

    #[test]
    fn test_unrelated_scores_low() {
        assert!(text_similarity("Submit order", "Privacy policy") < 0.2);
        assert_eq!(text_similarity("", "anything"), 0.0);
    }

    #[test]
    fn test_containment() {
        assert!(text_similarity("Checkout", "Proceed to checkout") >= 0.4);
    }
}

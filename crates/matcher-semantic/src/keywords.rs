///! Keyword extraction from element labels and text

use std::collections::BTreeSet;

use resilience_core_types::ElementSnapshot;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its",
    "of", "on", "or", "that", "the", "to", "was", "will", "with", "this", "your", "you", "our",
    "btn", "div", "span", "container", "wrapper", "col", "row",
];

/// Keyword extractor
#[derive(Clone, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Lowercased keywords from every human-facing attribute of an element
    pub fn extract(&self, element: &ElementSnapshot) -> BTreeSet<String> {
        let mut sources: Vec<&str> = vec![element.text.as_str()];
        sources.extend(
            [
                element.aria_label.as_deref(),
                element.title.as_deref(),
                element.placeholder.as_deref(),
                element.name.as_deref(),
                element.id.as_deref(),
            ]
            .into_iter()
            .flatten(),
        );
        sources.extend(element.classes.iter().map(String::as_str));

        sources
            .into_iter()
            .flat_map(|s| self.tokenize(s))
            .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(&w.as_str()))
            .collect()
    }

    /// Split on word boundaries plus `-`/`_` and camelCase humps
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .flat_map(|w| w.split(['-', '_']))
            .flat_map(split_camel_case)
            .map(|w| w.to_lowercase())
            .filter(|w| !w.is_empty())
            .collect()
    }
}

fn split_camel_case(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in word.chars() {
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Jaccard overlap of two keyword sets; two empty sets score 0
pub fn keyword_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience_core_types::fake::element;

    #[test]
    fn test_tokenize_splits_identifiers() {
        let extractor = KeywordExtractor::new();
        assert_eq!(
            extractor.tokenize("submitOrder checkout-btn place_order"),
            vec!["submit", "order", "checkout", "btn", "place", "order"]
        );
    }

    #[test]
    fn test_extract_skips_stop_words() {
        let extractor = KeywordExtractor::new();
        let mut el = element("b1", "button");
        el.text = "Place your order".into();
        el.classes = vec!["btn".into(), "checkout-submit".into()];
        let keywords = extractor.extract(&el);
        assert!(keywords.contains("place"));
        assert!(keywords.contains("order"));
        assert!(keywords.contains("checkout"));
        assert!(!keywords.contains("your"));
        assert!(!keywords.contains("btn"));
    }

    #[test]
    fn test_keyword_overlap() {
        let a: BTreeSet<String> = ["buy", "now"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["buy", "later"].iter().map(|s| s.to_string()).collect();
        assert!((keyword_overlap(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(keyword_overlap(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }
}

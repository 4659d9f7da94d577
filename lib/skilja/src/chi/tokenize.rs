use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Splits review text into the set of unique, lower-cased, filtered terms.
/// Token boundaries are maximal runs of characters other than ASCII letters
/// and `<`, `>`, `^`, `|`; survivors must be at least two characters long and
/// not stopwords. Duplicate occurrences within one document collapse: only
/// presence matters downstream.
pub struct Tokenizer {
    splitter: Regex,
    stopwords: Arc<HashSet<String>>,
}

impl Tokenizer {
    pub fn new(stopwords: Arc<HashSet<String>>) -> Self {
        Self {
            splitter: Regex::new(r"[^a-zA-Z<>^|]+").expect("static token pattern"),
            stopwords,
        }
    }

    pub fn unique_terms(&self, text: &str) -> HashSet<String> {
        let mut terms = HashSet::new();
        for token in self.splitter.split(text) {
            if token.len() < 2 {
                continue;
            }
            let term = token.to_lowercase();
            if self.stopwords.contains(&term) {
                continue;
            }
            terms.insert(term);
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(stopwords: &[&str]) -> Tokenizer {
        Tokenizer::new(Arc::new(stopwords.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn splits_on_non_letter_runs_and_lowercases() {
        let t = tokenizer(&[]);
        let terms = t.unique_terms("Great product! 100% GREAT value-for-money");
        assert!(terms.contains("great"));
        assert!(terms.contains("product"));
        assert!(terms.contains("value"));
        assert!(terms.contains("for"));
        assert!(terms.contains("money"));
        // digits are separators, so "100" never survives
        assert!(!terms.iter().any(|t| t.chars().any(|c| c.is_ascii_digit())));
    }

    #[test]
    fn keeps_markup_characters_in_tokens() {
        let t = tokenizer(&[]);
        let terms = t.unique_terms("worked <br> fine");
        assert!(terms.contains("<br>"));
    }

    #[test]
    fn drops_short_tokens_and_stopwords() {
        let t = tokenizer(&["the", "a"]);
        let terms = t.unique_terms("the quick fox a i x");
        assert_eq!(
            terms,
            ["quick", "fox"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn duplicates_collapse_to_presence() {
        let t = tokenizer(&[]);
        let terms = t.unique_terms("good good GOOD good");
        assert_eq!(terms.len(), 1);
        assert!(terms.contains("good"));
    }

    #[test]
    fn empty_text_yields_no_terms() {
        let t = tokenizer(&[]);
        assert!(t.unique_terms("").is_empty());
        assert!(t.unique_terms("  ... !!! ").is_empty());
    }
}

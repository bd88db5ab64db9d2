//! TF-IDF keyword extraction over the clips of one video.

use crate::lexical::tokenize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// English filler words never reported as keywords. Sorted.
const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can",
    "could", "did", "do", "does", "doing", "don", "down", "during", "each", "even", "few", "for",
    "from", "further", "get", "go", "going", "gonna", "got", "had", "has", "have", "having", "he",
    "her", "here", "hers", "him", "his", "how", "if", "in", "into", "is", "it", "its", "itself",
    "just", "know", "let", "like", "me", "more", "most", "my", "no", "nor", "not", "now", "of",
    "off", "ok", "okay", "on", "once", "one", "only", "or", "other", "our", "out", "over", "own",
    "really", "right", "said", "same", "say", "see", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "thing", "things",
    "this", "those", "through", "to", "too", "um", "under", "until", "up", "us", "very", "want",
    "was", "we", "well", "were", "what", "when", "where", "which", "while", "who", "why", "will",
    "with", "would", "yeah", "you", "your",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t) && !t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Top `top_n` keywords for each document, most relevant first.
///
/// Term frequency is relative to the document; inverse document frequency is
/// smoothed over `documents`. Ties go to the alphabetically smaller term.
pub fn extract_keywords(documents: &[String], top_n: usize) -> Vec<Vec<String>> {
    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| content_tokens(d)).collect();

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    let n = documents.len() as f32;
    tokenized
        .iter()
        .map(|tokens| {
            if tokens.is_empty() {
                return Vec::new();
            }

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *counts.entry(token.as_str()).or_insert(0) += 1;
            }

            let total = tokens.len() as f32;
            let mut scored: Vec<(&str, f32)> = counts
                .into_iter()
                .map(|(term, count)| {
                    let df = doc_freq.get(term).copied().unwrap_or(1) as f32;
                    let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                    (term, count as f32 / total * idf)
                })
                .collect();

            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            scored
                .into_iter()
                .take(top_n)
                .map(|(term, _)| term.to_string())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_sorted() {
        assert!(STOPWORDS.windows(2).all(|w| w[0] < w[1]));
        assert!(is_stopword("the"));
        assert!(!is_stopword("inheritance"));
    }

    #[test]
    fn test_distinctive_terms_rank_first() {
        let docs = vec![
            "classes and inheritance, inheritance everywhere, python code".to_string(),
            "decorators wrap functions, python code".to_string(),
        ];
        let keywords = extract_keywords(&docs, 2);
        assert_eq!(keywords[0][0], "inheritance");
        assert!(!keywords[0].contains(&"and".to_string()));
        assert_eq!(keywords[1].len(), 2);
        assert!(!keywords[1].contains(&"python".to_string()));
    }

    #[test]
    fn test_keywords_unique_and_bounded() {
        let docs = vec!["rust rust rust borrow borrow checker 2024".to_string()];
        let keywords = extract_keywords(&docs, 5);
        assert_eq!(keywords[0], vec!["rust", "borrow", "checker"]);
    }

    #[test]
    fn test_empty_document() {
        let keywords = extract_keywords(&["the and of".to_string()], 5);
        assert!(keywords[0].is_empty());
    }
}

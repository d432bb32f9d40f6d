//! BM25 lexical scoring
//!
//! The lexical half of hybrid retrieval. IDF statistics come from the
//! caller-supplied corpus (recent same-project memories), so scores are
//! relative to what the session has actually been talking about.

use std::collections::HashMap;

/// Term-frequency saturation
const K1: f64 = 1.2;
/// Length normalization
const B: f64 = 0.75;

/// Lowercased alphanumeric tokens, length >= 2
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// BM25 scorer over a fixed corpus
#[derive(Debug)]
pub struct Bm25 {
    /// Document frequency per term
    doc_freq: HashMap<String, usize>,
    /// Number of documents in the corpus
    doc_count: usize,
    /// Mean document length in tokens
    avg_len: f64,
}

impl Bm25 {
    /// Build IDF statistics from a corpus of documents
    pub fn new<S: AsRef<str>>(corpus: &[S]) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        for doc in corpus {
            let tokens = tokenize(doc.as_ref());
            total_len += tokens.len();
            let mut seen = std::collections::HashSet::new();
            for token in tokens {
                if seen.insert(token.clone()) {
                    *doc_freq.entry(token).or_default() += 1;
                }
            }
        }
        let doc_count = corpus.len();
        Self {
            doc_freq,
            doc_count,
            avg_len: if doc_count > 0 {
                total_len as f64 / doc_count as f64
            } else {
                0.0
            },
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        let n = self.doc_count as f64;
        // Lucene-style non-negative IDF
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    /// Score a document against a query
    pub fn score(&self, query: &str, document: &str) -> f64 {
        if self.doc_count == 0 {
            return 0.0;
        }
        let doc_tokens = tokenize(document);
        if doc_tokens.is_empty() {
            return 0.0;
        }
        let mut term_freq: HashMap<&str, f64> = HashMap::new();
        for token in &doc_tokens {
            *term_freq.entry(token.as_str()).or_default() += 1.0;
        }
        let len_norm = if self.avg_len > 0.0 {
            doc_tokens.len() as f64 / self.avg_len
        } else {
            1.0
        };

        let mut score = 0.0;
        for term in tokenize(query) {
            let Some(tf) = term_freq.get(term.as_str()) else {
                continue;
            };
            let idf = self.idf(&term);
            score += idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * len_norm));
        }
        score
    }
}

// ============================================================================
// TESTS
// ============================================================================

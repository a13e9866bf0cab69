// Stack Sage: BM25 Keyword Index
// Term-frequency scoring over tokenized rule chunks. Complements the vector
// store with exact keyword precision.

use crate::retrieval::chunker::RuleChunk;
use std::collections::{HashMap, HashSet};

const K1: f64 = 1.2;
const B: f64 = 0.75;

pub struct Bm25Index {
    // term -> number of documents containing it
    df: HashMap<String, usize>,
    // per-document term counts
    tf: Vec<HashMap<String, usize>>,
    doc_lengths: Vec<usize>,
    total_docs: usize,
    avg_dl: f64,
}

impl Bm25Index {
    pub fn new(chunks: &[RuleChunk]) -> Self {
        let mut index = Bm25Index {
            df: HashMap::new(),
            tf: Vec::with_capacity(chunks.len()),
            doc_lengths: Vec::with_capacity(chunks.len()),
            total_docs: chunks.len(),
            avg_dl: 0.0,
        };

        let mut total_length = 0usize;
        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            total_length += tokens.len();
            index.doc_lengths.push(tokens.len());

            let mut counts: HashMap<String, usize> = HashMap::new();
            let mut unique: HashSet<&str> = HashSet::new();
            for token in &tokens {
                *counts.entry(token.clone()).or_insert(0) += 1;
                unique.insert(token.as_str());
            }
            for term in unique {
                *index.df.entry(term.to_string()).or_insert(0) += 1;
            }
            index.tf.push(counts);
        }

        if index.total_docs > 0 {
            index.avg_dl = total_length as f64 / index.total_docs as f64;
        }
        index
    }

    /// Score all documents against the query and return the top `k` as
    /// (document index, score) pairs, highest first. Zero-score documents
    /// are omitted.
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.total_docs == 0 {
            return Vec::new();
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for term in query_terms {
            let Some(&df) = self.df.get(&term) else {
                continue;
            };
            let idf = ((self.total_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5) + 1.0).ln();

            for (doc_idx, term_freqs) in self.tf.iter().enumerate() {
                if let Some(&tf) = term_freqs.get(&term) {
                    let tf = tf as f64;
                    let doc_len = self.doc_lengths[doc_idx] as f64;
                    let score =
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * (doc_len / self.avg_dl)));
                    *scores.entry(doc_idx).or_insert(0.0) += score;
                }
            }
        }

        let mut results: Vec<(usize, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    pub fn len(&self) -> usize {
        self.total_docs
    }

    pub fn is_empty(&self) -> bool {
        self.total_docs == 0
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| s.trim_matches('.').to_string())
        .filter(|s| !s.is_empty() && (s.len() > 1 || s.chars().all(|c| c.is_ascii_digit())))
        .collect()
}

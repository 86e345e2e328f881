//! Near-duplicate detection.
//!
//! - [`TfIdfVectorizer`] builds a TF-IDF vector space over a set of texts
//! - [`DuplicateDetector`] scores every new incident against the historical
//!   corpus and flags it when the best cosine similarity reaches the threshold

use crate::constants::DEFAULT_DUPLICATE_THRESHOLD;
use crate::types::IncidentRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Runs of two or more word characters
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("valid token regex"));

/// Lowercase and split a text into terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// TF-IDF vectorizer with smoothed IDF and L2-normalized rows.
#[derive(Debug, Clone, Default)]
pub struct TfIdfVectorizer {
    /// term -> column index
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    /// Fit the vocabulary and IDF weights over `documents`.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

        let terms: BTreeSet<&str> = tokenized
            .iter()
            .flat_map(|doc| doc.iter().map(String::as_str))
            .collect();
        // Sorted for a deterministic column order
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();

        let mut doc_freq = vec![0usize; vocabulary.len()];
        for doc in &tokenized {
            let unique: HashSet<&String> = doc.iter().collect();
            for term in unique {
                if let Some(&idx) = vocabulary.get(term) {
                    doc_freq[idx] += 1;
                }
            }
        }

        let n_docs = tokenized.len() as f64;
        let idf = doc_freq
            .into_iter()
            .map(|df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Self { vocabulary, idf }
    }

    pub fn n_terms(&self) -> usize {
        self.idf.len()
    }

    /// Vectorize one text in the fitted space. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.n_terms()];
        for term in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                vector[idx] += 1.0;
            }
        }
        for (value, idf) in vector.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        l2_normalize(&mut vector);
        vector
    }

    pub fn transform_all<S: AsRef<str>>(&self, documents: &[S]) -> Vec<Vec<f64>> {
        documents.iter().map(|d| self.transform(d.as_ref())).collect()
    }
}

fn l2_normalize(vector: &mut [f64]) {
    let norm: f64 = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two non-negative vectors, clamped to [0, 1].
/// A zero vector has similarity 0 with everything.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Outcome of scoring one new record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Best similarity against any historical record
    pub max_similarity: f64,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    threshold: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DUPLICATE_THRESHOLD)
    }
}

impl DuplicateDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score raw texts: one verdict per entry of `current`.
    pub fn score_texts<S: AsRef<str>>(&self, current: &[S], history: &[S]) -> Vec<Verdict> {
        if history.is_empty() {
            return vec![
                Verdict {
                    max_similarity: 0.0,
                    is_duplicate: false,
                };
                current.len()
            ];
        }

        let corpus: Vec<&str> = history
            .iter()
            .chain(current.iter())
            .map(|s| s.as_ref())
            .collect();
        let vectorizer = TfIdfVectorizer::fit(&corpus);
        let past = vectorizer.transform_all(history);

        current
            .iter()
            .map(|text| {
                let vector = vectorizer.transform(text.as_ref());
                let max_similarity = past
                    .iter()
                    .map(|p| cosine_similarity(&vector, p))
                    .fold(0.0, f64::max);
                Verdict {
                    max_similarity,
                    is_duplicate: max_similarity >= self.threshold,
                }
            })
            .collect()
    }

    /// Score every record of `current` against `history`.
    pub fn detect(&self, current: &[IncidentRecord], history: &[IncidentRecord]) -> Vec<Verdict> {
        let current_texts: Vec<String> =
            current.iter().map(IncidentRecord::composite_text).collect();
        let history_texts: Vec<String> =
            history.iter().map(IncidentRecord::composite_text).collect();
        let verdicts = self.score_texts(&current_texts, &history_texts);

        for (record, verdict) in current.iter().zip(&verdicts) {
            debug!(
                title = %record.title,
                similarity = verdict.max_similarity,
                duplicate = verdict.is_duplicate,
                "Scored incident"
            );
        }
        verdicts
    }

    /// Set `is_duplicate` on every record and return the verdicts.
    pub fn mark(&self, current: &mut [IncidentRecord], history: &[IncidentRecord]) -> Vec<Verdict> {
        let verdicts = self.detect(current, history);
        for (record, verdict) in current.iter_mut().zip(&verdicts) {
            record.is_duplicate = Some(verdict.is_duplicate);
        }
        verdicts
    }
}

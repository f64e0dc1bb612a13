//! BM25 index (C3).
//!
//! Standard Okapi BM25 over tokenised chunk contents, built once from the
//! [`crate::hierarchy::ChunkStore`] at startup and queried per request.

use crate::text::tokenise_bm25;
use std::collections::HashMap;

/// A BM25 index over a fixed ordered set of documents (chunk contents).
#[derive(Debug)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    /// Tokenised documents, in the same order as the chunk ids they index.
    doc_tokens: Vec<Vec<String>>,
    doc_ids: Vec<String>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f64,
    /// term -> document frequency.
    doc_freq: HashMap<String, usize>,
    /// term -> idf, precomputed.
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    /// Builds an index over `(chunk_id, content)` pairs using the shared BM25
    /// tokeniser (C1), with the given `k1`/`b` parameters.
    #[must_use]
    pub fn build<'a, I>(documents: I, k1: f64, b: f64) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut doc_ids = Vec::new();
        let mut doc_tokens = Vec::new();
        for (id, content) in documents {
            doc_ids.push(id.to_string());
            doc_tokens.push(tokenise_bm25(content));
        }

        let doc_lengths: Vec<usize> = doc_tokens.iter().map(Vec::len).collect();
        let total_length: usize = doc_lengths.iter().sum();
        let n = doc_tokens.len();
        let avg_doc_length = if n == 0 {
            0.0
        } else {
            total_length as f64 / n as f64
        };

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let mut seen = std::collections::HashSet::new();
            for tok in tokens {
                if seen.insert(tok.as_str()) {
                    *doc_freq.entry(tok.clone()).or_insert(0) += 1;
                }
            }
        }

        let idf = doc_freq
            .iter()
            .map(|(term, df)| {
                #[allow(clippy::cast_precision_loss)]
                let n_f = n as f64;
                #[allow(clippy::cast_precision_loss)]
                let df_f = *df as f64;
                let value = ((n_f - df_f + 0.5) / (df_f + 0.5) + 1.0).ln();
                (term.clone(), value)
            })
            .collect();

        Self {
            k1,
            b,
            doc_tokens,
            doc_ids,
            doc_lengths,
            avg_doc_length,
            doc_freq,
            idf,
        }
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    /// True if the index holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Computes BM25 scores for `query` against every document; returns one
    /// score per document, in index order (`scores(query) -> vector of
    /// length N`, §4.3). Out-of-vocabulary query tokens contribute zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query_tokens = tokenise_bm25(query);
        let mut scores = vec![0.0; self.doc_tokens.len()];
        if self.doc_tokens.is_empty() {
            return scores;
        }

        for (i, tokens) in self.doc_tokens.iter().enumerate() {
            let doc_len = self.doc_lengths[i] as f64;
            let mut term_counts: HashMap<&str, usize> = HashMap::new();
            for tok in tokens {
                *term_counts.entry(tok.as_str()).or_insert(0) += 1;
            }

            let mut score = 0.0;
            for term in &query_tokens {
                let Some(&idf) = self.idf.get(term) else {
                    continue;
                };
                let tf = *term_counts.get(term.as_str()).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let denominator = tf
                    + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length.max(0.001));
                score += idf * (tf * (self.k1 + 1.0)) / denominator.max(0.001);
            }
            scores[i] = score;
        }
        scores
    }

    /// Returns `(chunk_id, score)` pairs for the top `limit` documents with
    /// strictly positive score, sorted descending.
    #[must_use]
    pub fn top_k(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let scores = self.scores(query);
        let mut ranked: Vec<(String, f64)> = self
            .doc_ids
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, score)| (id.clone(), score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }

    /// Document frequency of a term, for diagnostics/testing.
    #[must_use]
    pub fn document_frequency(&self, term: &str) -> usize {
        *self.doc_freq.get(term).unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Bm25Index {
        Bm25Index::build(
            vec![
                ("c1", "Điểm chuẩn học viện kỹ thuật quân sự năm 2024"),
                ("c2", "Tiêu chuẩn sức khỏe thi vào quân đội"),
                ("c3", "Điểm chuẩn học viện hải quân năm 2025"),
            ],
            1.5,
            0.75,
        )
    }

    #[test]
    fn scores_has_one_entry_per_document() {
        let idx = sample_index();
        assert_eq!(idx.scores("điểm chuẩn").len(), 3);
    }

    #[test]
    fn out_of_vocabulary_tokens_contribute_zero() {
        let idx = sample_index();
        let scores = idx.scores("xyzxyz_not_a_real_token");
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn matching_documents_outrank_non_matching() {
        let idx = sample_index();
        let scores = idx.scores("điểm chuẩn");
        assert!(scores[0] > scores[1]);
        assert!(scores[2] > scores[1]);
    }

    #[test]
    fn top_k_only_returns_positive_scores_descending() {
        let idx = sample_index();
        let top = idx.top_k("điểm chuẩn", 10);
        assert!(top.iter().all(|(_, s)| *s > 0.0));
        for pair in top.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn empty_index_returns_empty_scores() {
        let idx = Bm25Index::build(Vec::new(), 1.5, 0.75);
        assert!(idx.is_empty());
        assert!(idx.scores("anything").is_empty());
    }

    #[test]
    fn document_frequency_counts_distinct_documents() {
        let idx = sample_index();
        assert_eq!(idx.document_frequency("diem"), 2);
    }
}

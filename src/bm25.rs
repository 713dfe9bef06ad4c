//! In-memory BM25 index over chunks.
//!
//! Every chunk is one BM25 "document". The index only grows: there is no
//! removal, and a chunk id that is already indexed is skipped rather than
//! counted twice.
//!
//! Scoring for a query term `t` with `n_t` postings:
//!
//! ```text
//! idf(t)      = ln(1 + (N - n_t + 0.5) / (n_t + 0.5))
//! score(t, c) = idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))
//! ```
//!
//! Serialization goes through [`IndexSnapshot`]; deserializing validates
//! the whole snapshot before an index is handed out.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    error::{Error, Result},
    tokenizer::{TokenizeOptions, tokenize},
};

/// Term frequency saturation.
pub const K1: f32 = 1.2;

/// Document length normalization.
pub const B: f32 = 0.75;

/// One (term, chunk) occurrence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub chunk_id: String,
    pub term_frequency: u32,
}

/// Inverse document frequency of a term found in `doc_freq` of
/// `total_docs` chunks.
///
/// # Examples
///
/// ```
/// use docsift::bm25::idf;
///
/// assert!(idf(10, 1) > idf(10, 5));
/// assert!(idf(10, 10) > 0.0);
/// ```
pub fn idf(total_docs: usize, doc_freq: usize) -> f32 {
    let n = total_docs as f32;
    let df = doc_freq as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Sparse keyword index with BM25 ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndexSnapshot", into = "IndexSnapshot")]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    options: TokenizeOptions,
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: HashMap<String, usize>,
    total_docs: usize,
    total_length: usize,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    /// An empty index with the standard constants and default tokenizer
    /// options.
    pub fn new() -> Self {
        Self {
            k1: K1,
            b: B,
            options: TokenizeOptions::default(),
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_docs: 0,
            total_length: 0,
        }
    }

    pub fn k1(&self) -> f32 {
        self.k1
    }

    pub fn b(&self) -> f32 {
        self.b
    }

    /// Number of indexed chunks (`N`).
    pub fn len(&self) -> usize {
        self.total_docs
    }

    pub fn is_empty(&self) -> bool {
        self.total_docs == 0
    }

    /// Sum of all chunk lengths in terms (`L`).
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// `L / N`, or zero for an empty index.
    pub fn avg_doc_length(&self) -> f32 {
        if self.total_docs == 0 {
            0.0
        } else {
            self.total_length as f32 / self.total_docs as f32
        }
    }

    /// Number of distinct terms.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    pub fn contains_chunk(&self, chunk_id: &str) -> bool {
        self.doc_lengths.contains_key(chunk_id)
    }

    /// Length in terms of an indexed chunk.
    pub fn doc_length(&self, chunk_id: &str) -> Option<usize> {
        self.doc_lengths.get(chunk_id).copied()
    }

    /// Number of chunks containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// IDF of `term` under the current totals.
    pub fn term_idf(&self, term: &str) -> f32 {
        idf(self.total_docs, self.doc_freq(term))
    }

    /// Tokenize and index each chunk. Chunks whose id is already indexed
    /// are skipped; returns how many were added.
    pub fn add_chunks(&mut self, chunks: &[Chunk]) -> usize {
        let mut added = 0;
        for chunk in chunks {
            if self.doc_lengths.contains_key(&chunk.id) {
                tracing::warn!(chunk = %chunk.id, "chunk already indexed, skipping");
                continue;
            }
            self.add_text(&chunk.id, &chunk.text);
            added += 1;
        }
        tracing::debug!(
            added,
            total = self.total_docs,
            terms = self.postings.len(),
            "indexed chunks"
        );
        added
    }

    fn add_text(&mut self, chunk_id: &str, text: &str) {
        let terms = tokenize(text, self.options);

        let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
        for term in &terms {
            *frequencies.entry(term.clone()).or_insert(0) += 1;
        }

        for (term, term_frequency) in frequencies {
            self.postings.entry(term).or_default().push(Posting {
                chunk_id: chunk_id.to_string(),
                term_frequency,
            });
        }

        self.doc_lengths.insert(chunk_id.to_string(), terms.len());
        self.total_docs += 1;
        self.total_length += terms.len();
    }

    /// Rank chunks for `query`, best first, at most `top_k` of them.
    ///
    /// Only chunks containing at least one query term are returned. Query
    /// terms are deduplicated; terms unknown to the index are skipped.
    /// Equal scores are ordered by chunk id.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let avgdl = self.avg_doc_length();
        if top_k == 0 || avgdl == 0.0 {
            return Vec::new();
        }

        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in self.query_terms(query) {
            let Some(postings) = self.postings.get(&term) else {
                continue;
            };
            let term_idf = idf(self.total_docs, postings.len());
            for posting in postings {
                let weight = self.weight(
                    term_idf,
                    posting.term_frequency,
                    self.doc_lengths[posting.chunk_id.as_str()],
                    avgdl,
                );
                *scores.entry(posting.chunk_id.as_str()).or_insert(0.0) +=
                    weight;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        ranked
    }

    /// BM25 score of a single chunk for `query`; zero when nothing matches.
    pub fn score(&self, query: &str, chunk_id: &str) -> f32 {
        let avgdl = self.avg_doc_length();
        let Some(&dl) = self.doc_lengths.get(chunk_id) else {
            return 0.0;
        };
        if avgdl == 0.0 {
            return 0.0;
        }

        self.query_terms(query)
            .iter()
            .filter_map(|term| {
                let postings = self.postings.get(term)?;
                let posting =
                    postings.iter().find(|p| p.chunk_id == chunk_id)?;
                Some(self.weight(
                    idf(self.total_docs, postings.len()),
                    posting.term_frequency,
                    dl,
                    avgdl,
                ))
            })
            .sum()
    }

    /// Per-chunk map of term to BM25 weight.
    ///
    /// Summing the weights of a query's (distinct) terms for a chunk gives
    /// exactly that chunk's [`search`](Self::search) score.
    pub fn term_weights(&self) -> HashMap<String, BTreeMap<String, f32>> {
        let avgdl = self.avg_doc_length();
        let mut weights: HashMap<String, BTreeMap<String, f32>> =
            HashMap::new();
        if avgdl == 0.0 {
            return weights;
        }

        for (term, postings) in &self.postings {
            let term_idf = idf(self.total_docs, postings.len());
            for posting in postings {
                let weight = self.weight(
                    term_idf,
                    posting.term_frequency,
                    self.doc_lengths[posting.chunk_id.as_str()],
                    avgdl,
                );
                weights
                    .entry(posting.chunk_id.clone())
                    .or_default()
                    .insert(term.clone(), weight);
            }
        }

        weights
    }

    fn query_terms(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize(query, self.options)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect()
    }

    fn weight(&self, term_idf: f32, tf: u32, dl: usize, avgdl: f32) -> f32 {
        let tf = tf as f32;
        let norm = 1.0 - self.b + self.b * dl as f32 / avgdl;
        term_idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
    }

    /// Copy the full state into a serializable snapshot.
    pub fn to_snapshot(&self) -> IndexSnapshot {
        self.clone().into()
    }

    /// Rebuild an index from a snapshot, rejecting inconsistent state.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        snapshot.try_into()
    }
}

/// Serializable form of a [`Bm25Index`].
///
/// Maps are ordered so that equal indexes serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub k1: f32,
    pub b: f32,
    pub tokenizer: TokenizeOptions,
    pub total_docs: usize,
    pub total_length: usize,
    pub doc_lengths: BTreeMap<String, usize>,
    pub postings: BTreeMap<String, Vec<Posting>>,
}

impl From<Bm25Index> for IndexSnapshot {
    fn from(index: Bm25Index) -> Self {
        Self {
            k1: index.k1,
            b: index.b,
            tokenizer: index.options,
            total_docs: index.total_docs,
            total_length: index.total_length,
            doc_lengths: index.doc_lengths.into_iter().collect(),
            postings: index.postings.into_iter().collect(),
        }
    }
}

impl TryFrom<IndexSnapshot> for Bm25Index {
    type Error = Error;

    fn try_from(snapshot: IndexSnapshot) -> Result<Self> {
        if !snapshot.k1.is_finite() || snapshot.k1 < 0.0 {
            return Err(invalid(format!("k1 out of range: {}", snapshot.k1)));
        }
        if !(0.0..=1.0).contains(&snapshot.b) {
            return Err(invalid(format!("b out of range: {}", snapshot.b)));
        }
        if snapshot.total_docs != snapshot.doc_lengths.len() {
            return Err(invalid(format!(
                "total_docs is {} but {} chunk lengths are recorded",
                snapshot.total_docs,
                snapshot.doc_lengths.len()
            )));
        }
        let summed: usize = snapshot.doc_lengths.values().sum();
        if snapshot.total_length != summed {
            return Err(invalid(format!(
                "total_length is {} but chunk lengths sum to {summed}",
                snapshot.total_length
            )));
        }

        // Every chunk length must be fully accounted for by its postings.
        let mut accounted: HashMap<&str, usize> = HashMap::new();
        for (term, postings) in &snapshot.postings {
            let mut seen = HashSet::new();
            for posting in postings {
                if !snapshot.doc_lengths.contains_key(&posting.chunk_id) {
                    return Err(invalid(format!(
                        "term '{term}' references unknown chunk '{}'",
                        posting.chunk_id
                    )));
                }
                if posting.term_frequency == 0 {
                    return Err(invalid(format!(
                        "term '{term}' has a zero frequency posting"
                    )));
                }
                if !seen.insert(posting.chunk_id.as_str()) {
                    return Err(invalid(format!(
                        "term '{term}' lists chunk '{}' twice",
                        posting.chunk_id
                    )));
                }
                *accounted.entry(posting.chunk_id.as_str()).or_insert(0) +=
                    posting.term_frequency as usize;
            }
        }
        for (chunk_id, &length) in &snapshot.doc_lengths {
            let found = accounted.get(chunk_id.as_str()).copied().unwrap_or(0);
            if found != length {
                return Err(invalid(format!(
                    "chunk '{chunk_id}' has length {length} but postings account for {found}"
                )));
            }
        }

        Ok(Self {
            k1: snapshot.k1,
            b: snapshot.b,
            options: snapshot.tokenizer,
            postings: snapshot.postings.into_iter().collect(),
            doc_lengths: snapshot.doc_lengths.into_iter().collect(),
            total_docs: snapshot.total_docs,
            total_length: snapshot.total_length,
        })
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidSnapshot(message)
}

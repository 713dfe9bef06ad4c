//! Retrieval session: the single owner of the chunk map, the BM25 index
//! and the stored embedding vectors.
//!
//! A session only grows. Documents are ingested once, chunks never change
//! after creation, and nothing is removed; starting over means dropping
//! the session. Mutating methods take `&mut self`, so the borrow checker
//! enforces the single-writer rule and reads can run concurrently.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    bm25::Bm25Index,
    chunk_id::chunk_id,
    chunking::{Chunk, ChunkingConfig, chunk_document},
    embedding::{Embedder, check_batch},
    error::{Error, Result},
    export::{ExportBundle, ExportKind},
    fusion::{RRF_K, rank_by_cosine, reciprocal_rank_fusion},
    segmenter::{SentenceSegmenter, default_segmenter},
};

/// Minimum candidates taken from each ranking before hybrid fusion. A
/// larger `top_k` deepens both rankings to match.
pub const HYBRID_CANDIDATES: usize = 1000;

/// A document handed to [`Session::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Used as the document id of every chunk.
    pub path: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub docs_ingested: usize,
    pub chunks_created: usize,
}

/// Which ranking signal(s) a search uses.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// BM25 only.
    #[default]
    Sparse,
    /// Cosine similarity against stored vectors.
    Dense,
    /// Reciprocal rank fusion of both.
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sparse => "sparse",
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn needs_vectors(&self) -> bool {
        !matches!(self, Self::Sparse)
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Identity of the provider that produced the stored vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderInfo {
    pub name: String,
    pub dimension: usize,
}

/// Counters reported by `docsift status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub documents: usize,
    pub chunks: usize,
    pub terms: usize,
    pub avg_chunk_terms: f32,
    pub embedded: usize,
    pub embedder: Option<EmbedderInfo>,
}

pub struct Session {
    index: Bm25Index,
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
    documents: Vec<String>,
    vectors: HashMap<String, Vec<f32>>,
    embedder: Option<EmbedderInfo>,
    segmenter: &'static dyn SentenceSegmenter,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("documents", &self.documents.len())
            .field("chunks", &self.chunks.len())
            .field("vectors", &self.vectors.len())
            .field("embedder", &self.embedder)
            .field("segmenter", &self.segmenter.name())
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An empty session using the best available sentence segmenter.
    pub fn new() -> Self {
        Self::with_segmenter(default_segmenter())
    }

    pub fn with_segmenter(segmenter: &'static dyn SentenceSegmenter) -> Self {
        Self {
            index: Bm25Index::new(),
            chunks: Vec::new(),
            positions: HashMap::new(),
            documents: Vec::new(),
            vectors: HashMap::new(),
            embedder: None,
            segmenter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn index(&self) -> &Bm25Index {
        &self.index
    }

    /// All chunks in ingest order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.positions.get(id).map(|&i| &self.chunks[i])
    }

    /// Paths of ingested documents in ingest order.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn vector(&self, chunk_id: &str) -> Option<&[f32]> {
        self.vectors.get(chunk_id).map(Vec::as_slice)
    }

    pub fn embedder_info(&self) -> Option<&EmbedderInfo> {
        self.embedder.as_ref()
    }

    /// Number of chunks that have no vector yet.
    pub fn missing_embeddings(&self) -> usize {
        self.chunks.len() - self.vectors.len()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            documents: self.documents.len(),
            chunks: self.chunks.len(),
            terms: self.index.vocabulary_size(),
            avg_chunk_terms: self.index.avg_doc_length(),
            embedded: self.vectors.len(),
            embedder: self.embedder.clone(),
        }
    }

    /// Chunk and index a batch of documents.
    ///
    /// The configuration and the document paths are checked before
    /// anything is touched: an invalid config or a path that is already
    /// in the session (or repeated within the batch) fails the whole call
    /// with no change to the session.
    pub fn ingest(
        &mut self,
        files: &[SourceDocument],
        config: &ChunkingConfig,
    ) -> Result<IngestStats> {
        config.validate()?;

        let mut seen: HashSet<&str> =
            self.documents.iter().map(String::as_str).collect();
        for file in files {
            if !seen.insert(file.path.as_str()) {
                return Err(Error::DuplicateDocument(file.path.clone()));
            }
        }

        let segmenter = self.segmenter;
        let chunked: Vec<Vec<Chunk>> = files
            .par_iter()
            .map(|file| chunk_document(&file.text, &file.path, config, segmenter))
            .collect::<Result<_>>()?;

        let mut stats = IngestStats {
            docs_ingested: files.len(),
            chunks_created: 0,
        };

        for (file, chunks) in files.iter().zip(chunked) {
            let mut fresh = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                if self.positions.contains_key(&chunk.id) {
                    tracing::debug!(id = %chunk.id, "skipping repeated chunk span");
                    continue;
                }
                self.positions.insert(chunk.id.clone(), self.chunks.len());
                self.chunks.push(chunk.clone());
                fresh.push(chunk);
            }
            self.index.add_chunks(&fresh);
            self.documents.push(file.path.clone());
            stats.chunks_created += fresh.len();
        }

        tracing::info!(
            documents = stats.docs_ingested,
            chunks = stats.chunks_created,
            strategy = config.kind(),
            "ingested documents"
        );
        Ok(stats)
    }

    /// Embed every chunk that has no vector yet, in ingest order.
    ///
    /// Vectors from batches that completed before a failure are kept.
    /// A provider that differs from the one that produced the stored
    /// vectors is rejected, since mixing vector spaces breaks cosine
    /// ranking. Returns the number of chunks embedded.
    pub fn embed_pending(
        &mut self,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<usize> {
        let info = EmbedderInfo {
            name: embedder.name().to_string(),
            dimension: embedder.dimension(),
        };
        if let Some(existing) = &self.embedder
            && *existing != info
            && !self.vectors.is_empty()
        {
            return Err(Error::Embedding(format!(
                "stored vectors come from {} ({} dimensions), not {} ({} dimensions)",
                existing.name, existing.dimension, info.name, info.dimension
            )));
        }

        let pending: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !self.vectors.contains_key(&chunk.id))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut embedded = 0;
        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> =
                batch.iter().map(|&i| self.chunks[i].text.clone()).collect();
            let vectors = embedder.embed(&texts)?;
            check_batch(embedder, texts.len(), &vectors)?;

            for (&i, vector) in batch.iter().zip(vectors) {
                self.vectors.insert(self.chunks[i].id.clone(), vector);
            }
            self.embedder = Some(info.clone());
            embedded += batch.len();
            tracing::debug!(
                embedded,
                pending = pending.len(),
                "embedded batch"
            );
        }

        tracing::info!(chunks = embedded, model = %info.name, "embedded chunks");
        Ok(embedded)
    }

    /// Rank chunks for a query.
    ///
    /// Dense and hybrid modes need a vector for every chunk (otherwise
    /// [`Error::MissingEmbeddings`]) and the query's own vector. An empty
    /// session returns no results in every mode.
    pub fn search(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        mode: SearchMode,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let ranked = match mode {
            SearchMode::Sparse => self.index.search(query, top_k),
            SearchMode::Dense => {
                let query_vector = self.dense_query(query_vector)?;
                rank_by_cosine(query_vector, &self.vectors, top_k)
            }
            SearchMode::Hybrid => {
                let query_vector = self.dense_query(query_vector)?;
                let depth = top_k.max(HYBRID_CANDIDATES);
                let sparse: Vec<String> = self
                    .index
                    .search(query, depth)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                let dense: Vec<String> =
                    rank_by_cosine(query_vector, &self.vectors, depth)
                        .into_iter()
                        .map(|(id, _)| id)
                        .collect();
                reciprocal_rank_fusion(&sparse, &dense, RRF_K, top_k)
            }
        };

        tracing::debug!(
            mode = mode.as_str(),
            hits = ranked.len(),
            "searched session"
        );

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                self.chunk(&id).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect())
    }

    fn dense_query<'q>(&self, query_vector: Option<&'q [f32]>) -> Result<&'q [f32]> {
        let missing = self.missing_embeddings();
        if missing > 0 {
            return Err(Error::MissingEmbeddings {
                missing,
                total: self.chunks.len(),
            });
        }
        query_vector.ok_or_else(|| {
            Error::Embedding("dense ranking needs a query vector".to_string())
        })
    }

    /// Build an export bundle. The bundle is an independent copy.
    pub fn export(&self, kind: ExportKind) -> Result<ExportBundle> {
        ExportBundle::from_session(self, kind)
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            index: self.index.clone(),
            chunks: self.chunks.clone(),
            documents: self.documents.clone(),
            vectors: self
                .vectors
                .iter()
                .map(|(id, v)| (id.clone(), v.clone()))
                .collect(),
            embedder: self.embedder.clone(),
        }
    }

    /// Rebuild a session, checking that chunks, index and vectors agree.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        let SessionSnapshot {
            index,
            chunks,
            documents,
            vectors,
            embedder,
        } = snapshot;

        let known_documents: HashSet<&str> =
            documents.iter().map(String::as_str).collect();
        if known_documents.len() != documents.len() {
            return Err(Error::InvalidSnapshot(
                "document list contains duplicates".to_string(),
            ));
        }

        let mut positions = HashMap::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.id != chunk_id(&chunk.doc_id, chunk.char_start, chunk.char_end)
            {
                return Err(Error::InvalidSnapshot(format!(
                    "chunk id '{}' does not match its span",
                    chunk.id
                )));
            }
            if !known_documents.contains(chunk.doc_id.as_str()) {
                return Err(Error::InvalidSnapshot(format!(
                    "chunk '{}' belongs to unknown document",
                    chunk.id
                )));
            }
            if !index.contains_chunk(&chunk.id) {
                return Err(Error::InvalidSnapshot(format!(
                    "chunk '{}' is not indexed",
                    chunk.id
                )));
            }
            if positions.insert(chunk.id.clone(), i).is_some() {
                return Err(Error::InvalidSnapshot(format!(
                    "chunk '{}' appears twice",
                    chunk.id
                )));
            }
        }
        if index.len() != chunks.len() {
            return Err(Error::InvalidSnapshot(format!(
                "index holds {} chunks but {} are stored",
                index.len(),
                chunks.len()
            )));
        }

        if !vectors.is_empty() {
            let Some(info) = &embedder else {
                return Err(Error::InvalidSnapshot(
                    "vectors stored without an embedder".to_string(),
                ));
            };
            for (id, vector) in &vectors {
                if !positions.contains_key(id) {
                    return Err(Error::InvalidSnapshot(format!(
                        "vector for unknown chunk '{id}'"
                    )));
                }
                if vector.len() != info.dimension {
                    return Err(Error::InvalidSnapshot(format!(
                        "vector for '{id}' has {} dimensions, expected {}",
                        vector.len(),
                        info.dimension
                    )));
                }
            }
        }

        Ok(Self {
            index,
            chunks,
            positions,
            documents,
            vectors: vectors.into_iter().collect(),
            embedder,
            segmenter: default_segmenter(),
        })
    }

    /// Write the session as JSON, replacing `path` only once the new file
    /// is complete.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &self.to_snapshot())?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "saved session");
        Ok(())
    }

    /// Load a saved session, or an empty one when `path` does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let snapshot: SessionSnapshot = serde_json::from_reader(reader)?;
        let session = Self::from_snapshot(snapshot)?;
        tracing::debug!(
            path = %path.display(),
            chunks = session.chunks.len(),
            "loaded session"
        );
        Ok(session)
    }
}

/// Serializable form of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub index: Bm25Index,
    /// In ingest order.
    pub chunks: Vec<Chunk>,
    pub documents: Vec<String>,
    pub vectors: BTreeMap<String, Vec<f32>>,
    pub embedder: Option<EmbedderInfo>,
}

//! Self-contained export bundles.
//!
//! A bundle is two files: `metadata.json` describing the export and
//! `chunks.jsonl` with one record per chunk. Sparse records carry each
//! chunk's BM25 term weights, so a consumer can reproduce [`search`]
//! scores by summing the weights of the query terms; dense records carry
//! the chunk vector for cosine ranking.
//!
//! [`search`]: crate::bm25::Bm25Index::search

use std::{
    collections::BTreeMap,
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    chunk_id::export_id,
    error::{Error, Result},
    fusion::RRF_K,
    session::Session,
};

pub const SCHEMA_VERSION: u32 = 1;
pub const METADATA_FILE: &str = "metadata.json";
pub const CHUNKS_FILE: &str = "chunks.jsonl";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// Chunk text and offsets only.
    Chunks,
    /// Chunks plus BM25 term weights.
    Sparse,
    /// Chunks plus embedding vectors.
    Dense,
    /// Both weights and vectors.
    Hybrid,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunks => "chunks",
            Self::Sparse => "sparse",
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
        }
    }

    fn has_sparse(&self) -> bool {
        matches!(self, Self::Sparse | Self::Hybrid)
    }

    fn has_dense(&self) -> bool {
        matches!(self, Self::Dense | Self::Hybrid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
    pub k: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25: Option<Bm25Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion: Option<FusionParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub dimension: usize,
    pub metric: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub schema_version: u32,
    pub export_type: ExportKind,
    /// Unix seconds.
    pub created_at: u64,
    pub params: ExportParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingMetadata>,
    /// Source document paths in ingest order.
    pub sources: Vec<String>,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `c_000001`, numbered in ingest order.
    pub id: String,
    pub chunk_id: String,
    pub doc_id: String,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<BTreeMap<String, f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub metadata: ExportMetadata,
    pub records: Vec<ChunkRecord>,
}

impl ExportBundle {
    /// Copy the session's state into a bundle of the given kind.
    ///
    /// Dense and hybrid bundles need a vector for every chunk.
    pub fn from_session(session: &Session, kind: ExportKind) -> Result<Self> {
        if kind.has_dense() && session.missing_embeddings() > 0 {
            return Err(Error::MissingEmbeddings {
                missing: session.missing_embeddings(),
                total: session.chunks().len(),
            });
        }

        let index = session.index();
        let mut weights = if kind.has_sparse() {
            index.term_weights()
        } else {
            Default::default()
        };

        let records: Vec<ChunkRecord> = session
            .chunks()
            .iter()
            .enumerate()
            .map(|(i, chunk)| ChunkRecord {
                id: export_id(i + 1),
                chunk_id: chunk.id.clone(),
                doc_id: chunk.doc_id.clone(),
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                text: chunk.text.clone(),
                sparse: kind
                    .has_sparse()
                    .then(|| weights.remove(&chunk.id).unwrap_or_default()),
                dense: kind
                    .has_dense()
                    .then(|| session.vector(&chunk.id).map(<[f32]>::to_vec))
                    .flatten(),
            })
            .collect();

        let params = ExportParams {
            bm25: kind.has_sparse().then(|| Bm25Params {
                k1: index.k1(),
                b: index.b(),
            }),
            fusion: matches!(kind, ExportKind::Hybrid)
                .then_some(FusionParams { k: RRF_K }),
        };

        let embedding = if kind.has_dense() {
            session.embedder_info().map(|info| EmbeddingMetadata {
                dimension: info.dimension,
                metric: "cosine".to_string(),
                model: info.name.clone(),
            })
        } else {
            None
        };

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Ok(Self {
            metadata: ExportMetadata {
                schema_version: SCHEMA_VERSION,
                export_type: kind,
                created_at,
                params,
                embedding,
                sources: session.documents().to_vec(),
                total_chunks: records.len(),
            },
            records,
        })
    }

    /// Write `metadata.json` and `chunks.jsonl` into `dir`, creating it
    /// if needed.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let metadata = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(dir.join(METADATA_FILE), metadata + "\n")?;

        let mut writer =
            BufWriter::new(fs::File::create(dir.join(CHUNKS_FILE))?);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        tracing::info!(
            dir = %dir.display(),
            kind = self.metadata.export_type.as_str(),
            chunks = self.records.len(),
            "wrote export bundle"
        );
        Ok(())
    }

    /// Read a bundle previously written by [`write_to`](Self::write_to).
    pub fn read_from(dir: &Path) -> Result<Self> {
        let metadata: ExportMetadata = serde_json::from_reader(BufReader::new(
            fs::File::open(dir.join(METADATA_FILE))?,
        ))?;

        let reader = BufReader::new(fs::File::open(dir.join(CHUNKS_FILE))?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        if records.len() != metadata.total_chunks {
            return Err(Error::InvalidSnapshot(format!(
                "metadata declares {} chunks but {} records were found",
                metadata.total_chunks,
                records.len()
            )));
        }

        Ok(Self { metadata, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::ChunkingConfig,
        embedding::HashingEmbedder,
        session::SourceDocument,
    };

    fn session() -> Session {
        let mut session = Session::new();
        session
            .ingest(
                &[
                    SourceDocument::new("a.md", "Solar panels convert sunlight into power."),
                    SourceDocument::new("b.md", "Wind turbines convert wind into power."),
                ],
                &ChunkingConfig::FixedTokens { max_tokens: 32 },
            )
            .unwrap();
        session
    }

    #[test]
    fn chunks_export_has_no_weights_or_vectors() {
        let bundle = session().export(ExportKind::Chunks).unwrap();
        assert_eq!(bundle.metadata.schema_version, 1);
        assert_eq!(bundle.metadata.total_chunks, 2);
        assert_eq!(bundle.metadata.sources, vec!["a.md", "b.md"]);
        assert!(bundle.metadata.params.bm25.is_none());
        assert!(bundle.metadata.embedding.is_none());
        assert_eq!(bundle.records[0].id, "c_000001");
        assert_eq!(bundle.records[1].id, "c_000002");
        assert!(bundle.records.iter().all(|r| r.sparse.is_none() && r.dense.is_none()));
    }

    #[test]
    fn sparse_weights_reproduce_search_scores() {
        let session = session();
        let bundle = session.export(ExportKind::Sparse).unwrap();
        let params = bundle.metadata.params.bm25.clone().unwrap();
        assert_eq!(params.k1, 1.2);
        assert_eq!(params.b, 0.75);

        for (chunk_id, score) in session.index().search("convert sunlight power", 10) {
            let record = bundle.records.iter().find(|r| r.chunk_id == chunk_id).unwrap();
            let weights = record.sparse.as_ref().unwrap();
            let summed: f32 = ["convert", "sunlight", "power"]
                .iter()
                .filter_map(|t| weights.get(*t))
                .sum();
            assert!((summed - score).abs() < 1e-5);
        }
    }

    #[test]
    fn dense_export_requires_all_vectors() {
        let mut session = session();
        let err = session.export(ExportKind::Dense).unwrap_err();
        assert!(matches!(err, Error::MissingEmbeddings { missing: 2, total: 2 }));
        assert!(session.export(ExportKind::Hybrid).is_err());

        session.embed_pending(&HashingEmbedder::new(8).unwrap(), 4).unwrap();
        let bundle = session.export(ExportKind::Hybrid).unwrap();
        let embedding = bundle.metadata.embedding.clone().unwrap();
        assert_eq!(embedding.dimension, 8);
        assert_eq!(embedding.metric, "cosine");
        assert_eq!(embedding.model, "hashing-8");
        assert_eq!(bundle.metadata.params.fusion, Some(FusionParams { k: 60.0 }));
        assert!(bundle.records.iter().all(|r| r.dense.as_ref().is_some_and(|v| v.len() == 8)));
        assert!(bundle.records.iter().all(|r| r.sparse.is_some()));
    }

    #[test]
    fn bundle_is_independent_of_later_ingest() {
        let mut session = session();
        let bundle = session.export(ExportKind::Chunks).unwrap();
        session
            .ingest(
                &[SourceDocument::new("c.md", "Hydro dams store water.")],
                &ChunkingConfig::FixedTokens { max_tokens: 32 },
            )
            .unwrap();
        assert_eq!(bundle.records.len(), 2);
        assert_eq!(bundle.metadata.sources.len(), 2);
    }

    #[test]
    fn write_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("bundle");
        let bundle = session().export(ExportKind::Sparse).unwrap();
        bundle.write_to(&out).unwrap();

        let chunks = fs::read_to_string(out.join(CHUNKS_FILE)).unwrap();
        assert_eq!(chunks.lines().count(), 2);
        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(metadata["export_type"], "sparse");
        assert_eq!(metadata["total_chunks"], 2);
        assert!(metadata.get("embedding").is_none());

        let restored = ExportBundle::read_from(&out).unwrap();
        assert_eq!(restored, bundle);
    }

    #[test]
    fn empty_session_exports_empty_bundle() {
        let session = Session::new();
        for kind in [ExportKind::Chunks, ExportKind::Sparse, ExportKind::Dense] {
            let bundle = session.export(kind).unwrap();
            assert_eq!(bundle.metadata.total_chunks, 0);
            assert!(bundle.records.is_empty());
        }
    }
}

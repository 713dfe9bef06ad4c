//! docsift - a local retrieval-preparation engine.
//!
//! docsift splits documents into overlapping chunks, indexes them with
//! BM25, and ranks them by keyword relevance, by cosine similarity over
//! embedding vectors, or by reciprocal rank fusion of both. The whole
//! state can be exported as a self-contained bundle.
//!
//! # Quick start
//!
//! ```
//! use docsift::{ChunkingConfig, SearchMode, Session, SourceDocument};
//!
//! let mut session = Session::new();
//! session
//!     .ingest(
//!         &[SourceDocument::new("notes.md", "The borrow checker enforces ownership.")],
//!         &ChunkingConfig::FixedTokens { max_tokens: 64 },
//!     )
//!     .unwrap();
//!
//! let hits = session.search("ownership", None, SearchMode::Sparse, 5).unwrap();
//! assert_eq!(hits[0].chunk.doc_id, "notes.md");
//! ```

pub mod bm25;
pub mod chunk_id;
pub mod chunking;
pub mod cli;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod export;
pub mod fusion;
pub mod search;
pub mod segmenter;
pub mod session;
pub mod tokenizer;
pub mod walker;

pub use bm25::Bm25Index;
pub use chunking::{Chunk, ChunkingConfig};
pub use data_dir::DataDir;
pub use embedding::{Embedder, HashingEmbedder};
pub use error::{Error, Result};
pub use export::{ExportBundle, ExportKind};
pub use session::{SearchMode, Session, SourceDocument};

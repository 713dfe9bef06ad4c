use serde::Serialize;

use crate::{
    embedding::{Embedder, embed_query},
    error::{Error, Result},
    session::{SearchMode, Session},
};

/// Length of the one-line preview printed for each hit.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub count: usize,
    pub mode: SearchMode,
    /// Only applied when set. Cosine scores can be negative.
    pub min_score: Option<f32>,
    /// Ignore `count` and return every hit above `min_score`.
    pub all: bool,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count: 10,
            mode: SearchMode::Sparse,
            min_score: None,
            all: false,
        }
    }
}

/// A ranked hit ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResult {
    pub rank: usize,
    pub score: f32,
    pub chunk_id: String,
    pub doc_id: String,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// Execute the search pipeline.
///
/// 1. Embed the query when the mode needs vectors
/// 2. Rank through the session
/// 3. Filter by `min_score`, when set
/// 4. Limit to `count` results (unless `all`)
pub fn execute_search(
    params: &SearchParams,
    session: &Session,
    embedder: Option<&dyn Embedder>,
) -> Result<Vec<FinalResult>> {
    let query_vector = if params.mode.needs_vectors() && !session.is_empty() {
        let missing = session.missing_embeddings();
        if missing > 0 {
            return Err(Error::MissingEmbeddings {
                missing,
                total: session.chunks().len(),
            });
        }
        let embedder = embedder.ok_or_else(|| {
            Error::Embedding(format!(
                "{} search needs an embedding provider",
                params.mode.as_str()
            ))
        })?;
        if let Some(info) = session.embedder_info()
            && (info.name != embedder.name()
                || info.dimension != embedder.dimension())
        {
            return Err(Error::Embedding(format!(
                "chunks were embedded with {}, query provider is {}",
                info.name,
                embedder.name()
            )));
        }
        Some(embed_query(embedder, &params.query)?)
    } else {
        None
    };

    let limit = if params.all {
        session.chunks().len()
    } else {
        params.count
    };

    let hits = session.search(
        &params.query,
        query_vector.as_deref(),
        params.mode,
        limit,
    )?;

    Ok(hits
        .into_iter()
        .filter(|hit| params.min_score.is_none_or(|min| hit.score >= min))
        .enumerate()
        .map(|(i, hit)| FinalResult {
            rank: i + 1,
            score: hit.score,
            chunk_id: hit.chunk.id,
            doc_id: hit.chunk.doc_id,
            char_start: hit.chunk.char_start,
            char_end: hit.chunk.char_end,
            text: hit.chunk.text,
        })
        .collect())
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[FinalResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!(
            "{:>3}. [{:.4}] {} ({}..{})",
            r.rank, r.score, r.doc_id, r.char_start, r.char_end
        );
        println!("     {}", preview(&r.text));
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    mode: SearchMode,
    result_count: usize,
    results: &'a [FinalResult],
}

/// Format results as JSON output.
pub fn format_json(
    results: &[FinalResult],
    query: &str,
    mode: SearchMode,
) -> Result<()> {
    let output = JsonOutput {
        query,
        mode,
        result_count: results.len(),
        results,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Collapse whitespace and cut to [`PREVIEW_CHARS`] characters.
fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}

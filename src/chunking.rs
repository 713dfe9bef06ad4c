//! Chunking strategies for splitting documents into retrievable units.
//!
//! Every strategy maps one `(text, doc_id)` pair onto an ordered list of
//! [`Chunk`]s whose spans point back into the source text. Chunk text is
//! always a verbatim slice of the source, so original casing and
//! punctuation survive. Whitespace-only spans never become chunks.
//!
//! Offsets are byte offsets into the UTF-8 source and always fall on
//! character boundaries; size targets (`target_chars`) count characters.

use std::{ops::Range, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    chunk_id::chunk_id,
    error::{Error, Result},
    segmenter::SentenceSegmenter,
};

/// Default window size for the token strategies.
pub const DEFAULT_MAX_TOKENS: usize = 256;

/// Default overlap for the sliding token window.
pub const DEFAULT_OVERLAP_TOKENS: usize = 32;

/// Default chunk size for the sentence and recursive strategies.
pub const DEFAULT_TARGET_CHARS: usize = 1200;

/// Default number of sentences carried into the next chunk.
pub const DEFAULT_SENTENCE_OVERLAP: usize = 1;

static RAW_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("valid token pattern"));

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\r?\n){2,}").expect("valid paragraph pattern")
});

static HEADING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ {0,3}#{1,6}(?:[ \t]|$)").expect("valid heading pattern")
});

/// A bounded span of a document.
///
/// Chunks are created once during ingest and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{doc_id}:{char_start}-{char_end}"`, see [`chunk_id`].
    pub id: String,
    /// Identifier of the source document (its path).
    pub doc_id: String,
    /// Verbatim slice of the source between the two offsets.
    pub text: String,
    /// Byte offset where the chunk starts in the source document.
    pub char_start: usize,
    /// Byte offset one past the end of the chunk.
    pub char_end: usize,
}

impl Chunk {
    fn from_span(source: &str, doc_id: &str, span: Range<usize>) -> Self {
        Self {
            id: chunk_id(doc_id, span.start, span.end),
            doc_id: doc_id.to_string(),
            text: source[span.clone()].to_string(),
            char_start: span.start,
            char_end: span.end,
        }
    }
}

/// Which boundary policy to chunk with, and its parameters.
///
/// Serialized as a tagged variant, e.g.
/// `{"kind": "sliding_tokens", "maxTokens": 128, "overlapTokens": 16}`.
///
/// # Examples
///
/// ```
/// use docsift::chunking::ChunkingConfig;
///
/// let config: ChunkingConfig =
///     serde_json::from_str(r#"{"kind":"recursive","targetChars":800}"#)
///         .unwrap();
/// assert_eq!(config, ChunkingConfig::Recursive { target_chars: 800 });
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ChunkingConfig {
    FixedTokens {
        max_tokens: usize,
    },
    SlidingTokens {
        max_tokens: usize,
        overlap_tokens: usize,
    },
    SentParagraph {
        target_chars: usize,
        sentence_overlap: usize,
    },
    Recursive {
        target_chars: usize,
    },
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::SentParagraph {
            target_chars: DEFAULT_TARGET_CHARS,
            sentence_overlap: DEFAULT_SENTENCE_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// The serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FixedTokens { .. } => "fixed_tokens",
            Self::SlidingTokens { .. } => "sliding_tokens",
            Self::SentParagraph { .. } => "sent_paragraph",
            Self::Recursive { .. } => "recursive",
        }
    }

    /// Reject parameters that would produce degenerate output.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::FixedTokens { max_tokens } => check_max_tokens(max_tokens),
            Self::SlidingTokens {
                max_tokens,
                overlap_tokens,
            } => {
                check_max_tokens(max_tokens)?;
                if overlap_tokens >= max_tokens {
                    return Err(Error::InvalidChunking(format!(
                        "overlapTokens ({overlap_tokens}) must be smaller than maxTokens ({max_tokens})"
                    )));
                }
                Ok(())
            }
            Self::SentParagraph { target_chars, .. }
            | Self::Recursive { target_chars } => {
                check_target_chars(target_chars)
            }
        }
    }
}

fn check_max_tokens(max_tokens: usize) -> Result<()> {
    if max_tokens == 0 {
        return Err(Error::InvalidChunking(
            "maxTokens must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn check_target_chars(target_chars: usize) -> Result<()> {
    if target_chars == 0 {
        return Err(Error::InvalidChunking(
            "targetChars must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Validate `config` and chunk one document with it.
pub fn chunk_document(
    text: &str,
    doc_id: &str,
    config: &ChunkingConfig,
    segmenter: &dyn SentenceSegmenter,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    let chunks = match *config {
        ChunkingConfig::FixedTokens { max_tokens } => {
            chunk_by_tokens(text, doc_id, max_tokens, 0)
        }
        ChunkingConfig::SlidingTokens {
            max_tokens,
            overlap_tokens,
        } => chunk_by_tokens(text, doc_id, max_tokens, overlap_tokens),
        ChunkingConfig::SentParagraph {
            target_chars,
            sentence_overlap,
        } => chunk_by_sentences(
            text,
            doc_id,
            target_chars,
            sentence_overlap,
            segmenter,
        ),
        ChunkingConfig::Recursive { target_chars } => {
            chunk_recursive(text, doc_id, target_chars, segmenter)
        }
    };

    tracing::debug!(
        doc_id,
        strategy = config.kind(),
        chunks = chunks.len(),
        "chunked document"
    );
    Ok(chunks)
}

/// Walk a window of `max_tokens` raw tokens over the text.
///
/// Tokens are runs of non-whitespace. The window advances by
/// `max(1, max_tokens - overlap_tokens)` and stops once it reaches the
/// final token, so the last window may be shorter. Callers are expected to
/// keep `overlap_tokens < max_tokens`; the stride is clamped to 1 anyway.
///
/// # Examples
///
/// ```
/// use docsift::chunking::chunk_by_tokens;
///
/// let chunks = chunk_by_tokens("a b c d e", "doc", 2, 0);
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, vec!["a b", "c d", "e"]);
/// ```
pub fn chunk_by_tokens(
    text: &str,
    doc_id: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let tokens: Vec<Range<usize>> =
        RAW_TOKEN.find_iter(text).map(|m| m.range()).collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let max_tokens = max_tokens.max(1);
    let stride = max_tokens.saturating_sub(overlap_tokens).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + max_tokens).min(tokens.len());
        chunks.push(Chunk::from_span(
            text,
            doc_id,
            tokens[start].start..tokens[end - 1].end,
        ));
        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    chunks
}

/// Pack sentences into chunks of roughly `target_chars` characters.
///
/// Paragraphs are separated by blank lines and segmented into sentences.
/// A chunk is flushed before a sentence that would bring it to
/// `target_chars` or more; the last `sentence_overlap` sentences are then
/// carried into the next chunk. At a paragraph boundary the buffer is also
/// flushed when it is already over target.
pub fn chunk_by_sentences(
    text: &str,
    doc_id: &str,
    target_chars: usize,
    sentence_overlap: usize,
    segmenter: &dyn SentenceSegmenter,
) -> Vec<Chunk> {
    let mut packer = Packer::new(text, doc_id, target_chars, sentence_overlap);
    pack_sentences(&mut packer, text, 0..text.len(), segmenter);
    packer.flush();
    packer.into_chunks()
}

/// Heading-aware packing.
///
/// The text is cut into sections at markdown heading lines (`#` to
/// `######`). Inside a section whole paragraphs are packed up to
/// `target_chars`; a paragraph longer than 1.5x the target is re-packed
/// sentence by sentence instead of being emitted whole. Sections never
/// share a chunk.
pub fn chunk_recursive(
    text: &str,
    doc_id: &str,
    target_chars: usize,
    segmenter: &dyn SentenceSegmenter,
) -> Vec<Chunk> {
    let mut packer = Packer::new(text, doc_id, target_chars, 0);

    for section in sections(text) {
        for paragraph in paragraphs(text, section) {
            if char_len(text, paragraph.clone()) * 2 > target_chars * 3 {
                packer.flush();
                pack_sentences(&mut packer, text, paragraph, segmenter);
            } else {
                packer.push(paragraph);
            }
            packer.flush_if_over_target();
        }
        packer.flush();
    }

    packer.into_chunks()
}

fn pack_sentences(
    packer: &mut Packer<'_>,
    text: &str,
    region: Range<usize>,
    segmenter: &dyn SentenceSegmenter,
) {
    for paragraph in paragraphs(text, region) {
        for sentence in segmenter.segment(&text[paragraph.clone()]) {
            packer.push(paragraph.start + sentence.start
                ..paragraph.start + sentence.end);
        }
        packer.flush_if_over_target();
    }
}

/// Greedy accumulator shared by the sentence and recursive strategies.
///
/// `buffer` holds ordered unit spans; `fresh` counts the units that have
/// not been emitted yet, so a buffer made only of carried-over units is
/// never flushed again.
struct Packer<'a> {
    text: &'a str,
    doc_id: &'a str,
    target_chars: usize,
    overlap: usize,
    buffer: Vec<Range<usize>>,
    fresh: usize,
    chunks: Vec<Chunk>,
}

impl<'a> Packer<'a> {
    fn new(
        text: &'a str,
        doc_id: &'a str,
        target_chars: usize,
        overlap: usize,
    ) -> Self {
        Self {
            text,
            doc_id,
            target_chars,
            overlap,
            buffer: Vec::new(),
            fresh: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, unit: Range<usize>) {
        let start = self.buffer.first().map_or(unit.start, |r| r.start);
        if self.fresh > 0
            && char_len(self.text, start..unit.end) >= self.target_chars
        {
            self.flush();
        }
        self.buffer.push(unit);
        self.fresh += 1;
    }

    fn flush_if_over_target(&mut self) {
        if self.buffered_chars() > self.target_chars {
            self.flush();
        }
    }

    fn buffered_chars(&self) -> usize {
        match (self.buffer.first(), self.buffer.last()) {
            (Some(first), Some(last)) => {
                char_len(self.text, first.start..last.end)
            }
            _ => 0,
        }
    }

    fn flush(&mut self) {
        if self.fresh == 0 {
            return;
        }
        if let (Some(first), Some(last)) =
            (self.buffer.first(), self.buffer.last())
        {
            let span = first.start..last.end;
            if !self.text[span.clone()].trim().is_empty() {
                self.chunks
                    .push(Chunk::from_span(self.text, self.doc_id, span));
            }
        }

        let keep = self.overlap.min(self.buffer.len());
        self.buffer.drain(..self.buffer.len() - keep);
        self.fresh = 0;
    }

    fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }
}

/// Section ranges starting at each heading line.
fn sections(text: &str) -> Vec<Range<usize>> {
    let mut starts: Vec<usize> =
        HEADING_LINE.find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            start..end
        })
        .collect()
}

/// Trimmed, non-empty paragraph ranges inside `region`.
fn paragraphs(text: &str, region: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[region.clone()];
    let mut result = Vec::new();
    let mut last = 0;

    let breaks = PARAGRAPH_BREAK
        .find_iter(slice)
        .map(|m| m.range())
        .chain(std::iter::once(slice.len()..slice.len()));
    for separator in breaks {
        if let Some(range) = trimmed(slice, last..separator.start) {
            result.push(region.start + range.start..region.start + range.end);
        }
        last = separator.end;
    }

    result
}

fn trimmed(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let piece = &text[range.clone()];
    let without_lead = piece.trim_start();
    let start = range.start + (piece.len() - without_lead.len());
    let body = without_lead.trim_end();
    if body.is_empty() {
        return None;
    }
    Some(start..start + body.len())
}

fn char_len(text: &str, range: Range<usize>) -> usize {
    text[range].chars().count()
}

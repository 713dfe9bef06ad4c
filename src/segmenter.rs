//! Sentence segmentation used by the sentence/paragraph chunker.
//!
//! The segmenter is picked once (see [`default_segmenter`]) and handed to
//! the chunkers, so chunking never probes for capabilities per call.

use std::ops::Range;

/// Splits a paragraph into sentence byte ranges.
///
/// Returned ranges are relative to `text`, ordered, non-overlapping, and
/// trimmed of surrounding whitespace. Whitespace-only input yields nothing.
pub trait SentenceSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Range<usize>>;

    fn name(&self) -> &'static str;
}

/// UAX #29 sentence boundaries.
#[cfg(feature = "unicode-sentences")]
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentences;

#[cfg(feature = "unicode-sentences")]
impl SentenceSegmenter for UnicodeSentences {
    fn segment(&self, text: &str) -> Vec<Range<usize>> {
        use unicode_segmentation::UnicodeSegmentation;

        text.split_sentence_bound_indices()
            .filter_map(|(start, sentence)| trimmed_range(sentence, start))
            .collect()
    }

    fn name(&self) -> &'static str {
        "unicode"
    }
}

/// Treats the whole paragraph as one sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphSentences;

impl SentenceSegmenter for ParagraphSentences {
    fn segment(&self, text: &str) -> Vec<Range<usize>> {
        trimmed_range(text, 0).into_iter().collect()
    }

    fn name(&self) -> &'static str {
        "paragraph"
    }
}

/// The best segmenter this build supports.
#[cfg(feature = "unicode-sentences")]
pub fn default_segmenter() -> &'static dyn SentenceSegmenter {
    &UnicodeSentences
}

/// The best segmenter this build supports.
#[cfg(not(feature = "unicode-sentences"))]
pub fn default_segmenter() -> &'static dyn SentenceSegmenter {
    &ParagraphSentences
}

/// Byte range of `piece` without leading/trailing whitespace, shifted by
/// `offset`. `None` when nothing but whitespace remains.
fn trimmed_range(piece: &str, offset: usize) -> Option<Range<usize>> {
    let trimmed = piece.trim_start();
    let start = offset + (piece.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    Some(start..start + trimmed.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_fallback_is_one_sentence() {
        let text = "  First. Second.  ";
        let ranges = ParagraphSentences.segment(text);
        assert_eq!(ranges, vec![2..16]);
        assert_eq!(&text[ranges[0].clone()], "First. Second.");
    }

    #[test]
    fn paragraph_fallback_skips_whitespace() {
        assert!(ParagraphSentences.segment(" \n\t ").is_empty());
    }

    #[cfg(feature = "unicode-sentences")]
    #[test]
    fn unicode_splits_sentences() {
        let text = "Hello there. How are you? Fine!";
        let sentences: Vec<&str> = UnicodeSentences
            .segment(text)
            .into_iter()
            .map(|r| &text[r])
            .collect();
        assert_eq!(sentences, vec!["Hello there.", "How are you?", "Fine!"]);
    }

    #[cfg(feature = "unicode-sentences")]
    #[test]
    fn unicode_ranges_are_ordered_and_disjoint() {
        let text = "One. Two. Three. Four.";
        let ranges = UnicodeSentences.segment(text);
        for pair in ranges.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn default_segmenter_has_a_name() {
        assert!(!default_segmenter().name().is_empty());
    }
}

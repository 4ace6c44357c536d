use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::Chunk;

/// Split points, most preferred first. When none of them fits the window the
/// chunker falls back to a grapheme boundary.
pub const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 250,
        }
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk_text(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let bounds = char_boundaries(text);
        let spans = self.spans(text, &bounds);

        debug!(
            doc_id,
            chars = bounds.len() - 1,
            chunks = spans.len(),
            "Split document into chunks"
        );

        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                Chunk::new(
                    doc_id.to_string(),
                    index,
                    text[bounds[start]..bounds[end]].to_string(),
                    (start, end),
                )
            })
            .collect()
    }

    /// Character spans `[start, end)` of every chunk, in document order.
    fn spans(&self, text: &str, bounds: &[usize]) -> Vec<(usize, usize)> {
        let total = bounds.len() - 1;
        // A zero size would never make progress
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap;

        if total <= size {
            return vec![(0, total)];
        }

        // Keep every split past the overlap so the next chunk starts further on
        let min_len = overlap.min(size - 1) + 1;

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let limit = (start + size).min(total);
            let end = if limit == total {
                total
            } else {
                let window = &text[bounds[start]..bounds[limit]];
                let tail = &text[bounds[start]..];
                start + find_split(window, tail, min_len, SEPARATORS)
            };

            spans.push((start, end));
            if end == total {
                break;
            }

            let next = end.saturating_sub(overlap);
            start = if next > start {
                snap_to_word(text, bounds, next, end)
            } else {
                start + 1
            };
        }

        spans
    }
}

/// Split `text` into overlapping chunks of at most `size` characters.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    Chunker::new(ChunkerConfig {
        chunk_size: size,
        chunk_overlap: overlap,
    })
    .chunk_text("", text)
    .into_iter()
    .map(|chunk| chunk.text)
    .collect()
}

/// Byte offset of every char, plus the end of the string.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Length in characters of the chunk cut from `window`. Tries each separator
/// in turn; the separator stays with the left chunk.
fn find_split(window: &str, tail: &str, min_len: usize, separators: &[&str]) -> usize {
    let Some((sep, rest)) = separators.split_first() else {
        return grapheme_split(window, tail);
    };

    if let Some(pos) = window.rfind(sep) {
        let cut = window[..pos + sep.len()].chars().count();
        if cut >= min_len {
            return cut;
        }
    }

    find_split(window, tail, min_len, rest)
}

fn grapheme_split(window: &str, tail: &str) -> usize {
    let size = window.chars().count();
    let mut taken = 0;
    for grapheme in tail.graphemes(true) {
        let n = grapheme.chars().count();
        if taken + n > size {
            break;
        }
        taken += n;
    }
    // A single grapheme longer than the window gets cut anyway
    if taken == 0 { size } else { taken }
}

/// Move an overlap start forward to the next word, without reaching `end`.
fn snap_to_word(text: &str, bounds: &[usize], start: usize, end: usize) -> usize {
    if start == 0 || text[bounds[start - 1]..bounds[start]].chars().all(char::is_whitespace) {
        return start;
    }
    let region = &text[bounds[start]..bounds[end]];
    match region.find(char::is_whitespace) {
        Some(pos) => {
            let skip = region[..pos].chars().count() + 1;
            if start + skip < end { start + skip } else { start }
        }
        None => start,
    }
}

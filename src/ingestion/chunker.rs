//! Deterministic text chunking with offset tracking
//!
//! Splitting is a pure function of `(text, chunk_size, overlap)`, so
//! re-ingesting identical text always reproduces identical chunk
//! boundaries. Offsets are recorded so that de-overlapping by offset
//! reconstructs the original text exactly.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Upper bound on how far back from the hard cut a whitespace break is
/// searched for.
const MAX_LOOKBACK: usize = 64;

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive chunks
    overlap: usize,
    /// Whitespace lookback window before the hard cut
    lookback: usize,
}

impl TextChunker {
    /// Create a new chunker. Requires `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        // The lookback is capped so every chunk still advances the cursor.
        let lookback = overlap.min(MAX_LOOKBACK).min(chunk_size - overlap - 1);
        Ok(Self {
            chunk_size,
            overlap,
            lookback,
        })
    }

    /// Split `text` into overlapping chunks. Text shorter than the chunk
    /// size yields exactly one chunk spanning the whole text; empty text
    /// yields none.
    pub fn chunk(&self, document_id: Uuid, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        if text.is_empty() {
            return chunks;
        }

        let len = text.len();
        let mut start = 0usize;
        let mut sequence_index = 0usize;

        loop {
            if len - start <= self.chunk_size {
                chunks.push(Chunk::new(
                    document_id,
                    sequence_index,
                    text[start..].to_string(),
                    start,
                    len,
                ));
                break;
            }

            let hard_end = floor_char_boundary(text, start + self.chunk_size);
            let end = self.soft_break(text, start, hard_end);
            chunks.push(Chunk::new(
                document_id,
                sequence_index,
                text[start..end].to_string(),
                start,
                end,
            ));
            sequence_index += 1;

            let mut next = floor_char_boundary(text, end - self.overlap);
            if next <= start {
                // only reachable with degenerate multi-byte boundaries
                next = end;
            }
            start = next;
        }

        chunks
    }

    /// Prefer breaking just after a whitespace character within the
    /// lookback window; fall back to the hard cut when none is found.
    fn soft_break(&self, text: &str, start: usize, hard_end: usize) -> usize {
        if self.lookback == 0 {
            return hard_end;
        }
        let window_start = floor_char_boundary(text, hard_end.saturating_sub(self.lookback));
        if window_start <= start {
            return hard_end;
        }
        match text[window_start..hard_end].rfind(char::is_whitespace) {
            Some(pos) => {
                let ws_start = window_start + pos;
                let ws_len = text[ws_start..].chars().next().map_or(1, |c| c.len_utf8());
                ws_start + ws_len
            }
            None => hard_end,
        }
    }
}

/// Largest index `<= i` that lies on a UTF-8 character boundary
fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_id() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = TextChunker::new(512, 50).unwrap();
        let chunks = chunker.chunk(doc_id(), "just a short note");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, 17);
        assert_eq!(chunks[0].text, "just a short note");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(512, 50).unwrap();
        assert!(chunker.chunk(doc_id(), "").is_empty());
    }

    #[test]
    fn hard_cut_offsets_match_size_and_overlap() {
        // 1000 chars without any whitespace: every cut is a hard cut.
        let text = "x".repeat(1000);
        let chunker = TextChunker::new(512, 50).unwrap();
        let chunks = chunker.chunk(doc_id(), &text);

        let offsets: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
        assert_eq!(offsets, vec![(0, 512), (462, 974), (924, 1000)]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(TextChunker::new(100, 100), Err(Error::Config(_))));
        assert!(matches!(TextChunker::new(0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "alpha beta gamma delta ".repeat(60);
        let chunker = TextChunker::new(128, 32).unwrap();
        let a = chunker.chunk(Uuid::nil(), &text);
        let b = chunker.chunk(Uuid::nil(), &text);
        let bounds_a: Vec<_> = a.iter().map(|c| (c.char_start, c.char_end)).collect();
        let bounds_b: Vec<_> = b.iter().map(|c| (c.char_start, c.char_end)).collect();
        assert_eq!(bounds_a, bounds_b);
    }

    #[test]
    fn prefers_whitespace_break_within_lookback() {
        let text = "word ".repeat(300);
        let chunker = TextChunker::new(128, 32).unwrap();
        let chunks = chunker.chunk(doc_id(), &text);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.char_end - chunk.char_start <= 128);
            assert!(
                chunk.text.ends_with(' '),
                "expected whitespace break, got {:?}",
                &chunk.text[chunk.text.len().saturating_sub(8)..]
            );
        }
    }

    #[test]
    fn offsets_reconstruct_original_text() {
        let text =
            "The quick brown fox jumps over the lazy dog. Pack my box with five dozen liquor jugs. "
                .repeat(40);
        let chunker = TextChunker::new(200, 40).unwrap();
        let chunks = chunker.chunk(doc_id(), &text);
        assert!(chunks.len() > 2);

        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for chunk in &chunks {
            assert!(chunk.char_start <= covered, "gap between chunks");
            rebuilt.push_str(&chunk.text[(covered - chunk.char_start)..]);
            covered = chunk.char_end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text = "z".repeat(2000);
        let chunker = TextChunker::new(300, 60).unwrap();
        let chunks = chunker.chunk(doc_id(), &text);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].char_end - pair[1].char_start, 60);
        }
    }

    #[test]
    fn respects_utf8_boundaries() {
        let text = "héllo wörld ünïcödé ".repeat(50);
        let chunker = TextChunker::new(100, 20).unwrap();
        let chunks = chunker.chunk(doc_id(), &text);
        // slicing would have panicked on a bad boundary; verify coverage too
        assert_eq!(chunks.last().map(|c| c.char_end), Some(text.len()));
    }
}

//! Append-only chunk log backing a recording session.
//!
//! Offsets are counted in chars (Unicode scalar values) of the concatenated
//! output, so a resume position can fall anywhere inside a chunk.

use std::sync::Arc;

/// One contiguous span of output appended in a single call.
///
/// The text is shared, so handing a chunk to many readers never copies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    start: usize,
    len: usize,
    text: Arc<str>,
}

impl Chunk {
    fn new(start: usize, text: Arc<str>) -> Self {
        let len = text.chars().count();
        Self { start, len, text }
    }

    /// Offset of the first char of this chunk.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset one past the last char of this chunk.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the chunk holds no text.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The chunk's text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the chunk's text.
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// The part of this chunk starting at absolute offset `position`.
    ///
    /// `position` must lie in `[start, end)`.
    fn suffix_from(&self, position: usize) -> Chunk {
        debug_assert!(position >= self.start && position < self.end());
        let skip = position - self.start;
        if skip == 0 {
            return self.clone();
        }
        let byte_idx = self
            .text
            .char_indices()
            .nth(skip)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len());
        Chunk {
            start: position,
            len: self.len - skip,
            text: Arc::from(&self.text[byte_idx..]),
        }
    }
}

/// Ordered, contiguous sequence of chunks.
#[derive(Debug, Default)]
pub struct ChunkLog {
    chunks: Vec<Chunk>,
    total_len: usize,
}

impl ChunkLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length in chars.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Length in chars that `text` would add.
    pub fn measure(text: &str) -> usize {
        text.chars().count()
    }

    /// Appends `text` as the next chunk. Empty text appends nothing.
    pub fn push(&mut self, text: &str) -> Option<Chunk> {
        if text.is_empty() {
            return None;
        }
        let chunk = Chunk::new(self.total_len, Arc::from(text));
        self.total_len = chunk.end();
        self.chunks.push(chunk.clone());
        Some(chunk)
    }

    /// Chunks covering `[position, total_len)`, splitting the first one when
    /// `position` falls inside it. Returns nothing when `position` is at or
    /// past the end.
    pub fn suffix_from(&self, position: usize) -> Vec<Chunk> {
        if position >= self.total_len {
            return Vec::new();
        }
        let first = self.chunks.partition_point(|c| c.end() <= position);
        let mut out = Vec::with_capacity(self.chunks.len() - first);
        for (i, chunk) in self.chunks[first..].iter().enumerate() {
            if i == 0 {
                out.push(chunk.suffix_from(position));
            } else {
                out.push(chunk.clone());
            }
        }
        out
    }

    /// The full concatenated output.
    pub fn concat(&self) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            out.push_str(chunk.text());
        }
        out
    }
}

//! Splitting extracted text into chunks.
//!
//! [`RecursiveChunker`] tries paragraph breaks first, then line breaks, then
//! spaces, and finally individual characters, merging neighbouring pieces back
//! together until a chunk would exceed `chunk_size` characters. Consecutive
//! chunks share up to `chunk_overlap` characters of trailing context.

use std::collections::VecDeque;

use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s numbered `0..n` by `doc_id` with no
/// embeddings; the pipeline attaches embeddings later.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks. Empty or whitespace-only text yields none.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Hierarchical character splitter.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(1000, 50)
    }
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
        } else {
            text.split(separator).filter(|piece| !piece.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    /// Greedily join small pieces, carrying overlap into the next chunk.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);
                loop {
                    let joiner = if window.is_empty() { 0 } else { sep_len };
                    let too_long = total > 0 && total + len + joiner > self.chunk_size;
                    if total <= self.chunk_overlap && !too_long {
                        break;
                    }
                    let Some(front) = window.pop_front() else { break };
                    let trailing = if window.is_empty() { 0 } else { sep_len };
                    total -= char_len(front) + trailing;
                }
            }
            let joiner = if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
            total += len + joiner;
        }
        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(doc_id, text)| Chunk::new(&document.id, doc_id, text))
            .collect()
    }
}

//! Recursive character text splitter
//!
//! Splits on the coarsest separator present (paragraphs, then lines, then
//! sentences, then clauses, then words) and recurses into any piece that is
//! still longer than `chunk_size`. Adjacent pieces are packed back into
//! chunks, each carrying up to `chunk_overlap` characters of the previous one.

use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitterError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                overlap: chunk_overlap,
                size: chunk_size,
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| text[span].to_string())
            .collect()
    }

    /// Byte ranges of the chunks in `text`, in order and trimmed of
    /// surrounding whitespace.
    ///
    /// A chunk that starts before the previous one ends shares exactly the
    /// carried-over overlap with it; nothing else is ever repeated.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.split_with(text, 0..text.len(), DEFAULT_SEPARATORS)
    }

    fn split_with(&self, text: &str, span: Range<usize>, separators: &[&str]) -> Vec<Range<usize>> {
        let slice = &text[span.clone()];

        // First separator that occurs in the text; "" always matches
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || slice.contains(sep))
            .unwrap_or(separators.len());

        let (separator, rest) = match separators.get(position) {
            Some(sep) => (*sep, &separators[position + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<Range<usize>> = Vec::new();

        for piece in split_keeping_separator(slice, separator) {
            let piece = piece.start + span.start..piece.end + span.start;

            if char_len(&text[piece.clone()]) <= self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(text, &pending));
                pending.clear();
            }

            if rest.is_empty() {
                chunks.extend(trim_span(text, piece));
            } else {
                chunks.extend(self.split_with(text, piece, rest));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(text, &pending));
        }

        chunks
    }

    /// Pack consecutive small pieces into chunks no longer than `chunk_size`
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: Vec<Range<usize>> = Vec::new();
        let mut window_len = 0;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);

            if window_len + len > self.chunk_size && !window.is_empty() {
                chunks.extend(window_span(text, &window));

                // Keep a tail of the window as overlap for the next chunk
                while window_len > self.chunk_overlap
                    || (window_len + len > self.chunk_size && window_len > 0)
                {
                    let first = window.remove(0);
                    window_len -= char_len(&text[first]);
                }
            }

            window.push(piece.clone());
            window_len += len;
        }

        chunks.extend(window_span(text, &window));
        chunks
    }
}

fn window_span(text: &str, window: &[Range<usize>]) -> Option<Range<usize>> {
    let (first, last) = (window.first()?, window.last()?);
    trim_span(text, first.start..last.end)
}

fn trim_span(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[span.clone()];
    let without_leading = slice.trim_start();
    let start = span.start + (slice.len() - without_leading.len());
    let end = start + without_leading.trim_end().len();
    (start < end).then_some(start..end)
}

/// Split after every separator; the ranges tile the whole text
fn split_keeping_separator(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(idx, c)| idx..idx + c.len_utf8())
            .collect();
    }

    let mut offset = 0;
    text.split_inclusive(separator)
        .map(|piece| {
            let start = offset;
            offset += piece.len();
            start..offset
        })
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

use std::collections::VecDeque;

use anyhow::{Result, anyhow};

/// Separator priority for documentation text: fenced code blocks, paragraph
/// breaks, line breaks, words, then single characters as a last resort.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["```", "\n\n", "\n", " ", ""];

pub trait Chunker: Send + Sync {
    /// Splits one document's text into ordered, bounded chunks.
    fn chunk(&self, content: &str) -> Result<Vec<String>>;
}

/// Recursive separator-priority splitter with bounded chunk size and
/// overlapping windows.
///
/// The highest-priority separator found in the text is tried first; pieces
/// still exceeding the bound are re-split with the remaining separators.
/// Lengths are counted in `char`s so a split never lands inside a UTF-8
/// sequence.
pub struct RecursiveChunker {
    max_chars: usize,
    overlap_chars: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(max_chars: usize, overlap_chars: usize, separators: Vec<String>) -> Result<Self> {
        if max_chars == 0 {
            return Err(anyhow!("chunk size must be non-zero"));
        }
        if overlap_chars >= max_chars {
            return Err(anyhow!(
                "chunk_overlap ({overlap_chars}) must be smaller than chunk_size ({max_chars})"
            ));
        }
        if separators.is_empty() {
            return Err(anyhow!("separator list cannot be empty"));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
            separators,
        })
    }

    pub fn with_defaults(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        Self::new(
            max_chars,
            overlap_chars,
            DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator that actually occurs in the text wins; the last
        // entry is the unconditional fallback.
        let mut sep_index = separators.len() - 1;
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep.as_str()) {
                sep_index = i;
                break;
            }
        }
        let separator = &separators[sep_index];
        let remaining = &separators[sep_index + 1..];

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator.as_str()).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) <= self.max_chars {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge_splits(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                // An atomic unit larger than the bound is kept whole rather
                // than corrupted mid-token.
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge_splits(&fitting, separator));
        }
        chunks
    }

    /// Greedily packs adjacent splits into chunks up to the size bound,
    /// sliding the window so consecutive chunks share up to `overlap_chars`
    /// of trailing context.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let piece_len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + piece_len + joiner > self.max_chars && !window.is_empty() {
                push_doc(&mut docs, &window, separator);
                while total > self.overlap_chars
                    || (total + piece_len + if window.is_empty() { 0 } else { sep_len }
                        > self.max_chars
                        && total > 0)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    let joiner = if window.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(char_len(front) + joiner);
                }
            }

            window.push_back(piece);
            total += piece_len + if window.len() > 1 { sep_len } else { 0 };
        }

        push_doc(&mut docs, &window, separator);
        docs
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str) -> Result<Vec<String>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        // A document already within the bound passes through unsplit.
        if char_len(content) <= self.max_chars {
            return Ok(vec![content.to_string()]);
        }
        Ok(self.split_recursive(content, &self.separators))
    }
}

fn push_doc(docs: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    if window.is_empty() {
        return;
    }
    let joined = window
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

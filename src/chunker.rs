//! Sentence-boundary-aware text chunker.
//!
//! Splits document text into overlapping chunks bounded by a token budget.
//! Tokens are whitespace-delimited words — an approximation of a model
//! tokenizer in the same spirit as a chars-per-token ratio, but exact to
//! count and deterministic. Splitting prefers sentence boundaries nearest
//! the budget over mid-sentence breaks; a sentence longer than the budget
//! is hard-split on word boundaries.
//!
//! Overlap is the number of trailing tokens of one chunk repeated at the
//! start of the next. Chunk text joins tokens with single spaces, so
//! intra-chunk whitespace is normalized.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::models::{Node, SourceDocument};

#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceSplitter {
    /// Build a splitter. Fails if `chunk_overlap >= chunk_size` or the
    /// size is zero.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split text into overlapping chunks. Empty text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let bodies = self.pack_bodies(text);
        let mut chunks = Vec::with_capacity(bodies.len());
        let mut prev: Option<&Vec<&str>> = None;

        for body in &bodies {
            let mut tokens: Vec<&str> = Vec::with_capacity(self.chunk_size);
            if let Some(prev) = prev {
                let start = prev.len().saturating_sub(self.chunk_overlap);
                tokens.extend_from_slice(&prev[start..]);
            }
            tokens.extend_from_slice(body);
            chunks.push(tokens.join(" "));
            prev = Some(body);
        }

        chunks
    }

    /// Chunk every document in order. Documents are processed
    /// independently; each node inherits its document's metadata
    /// unchanged and `position` counts from 0 within the document.
    pub fn chunk_documents(&self, documents: &[SourceDocument]) -> Vec<Node> {
        let mut nodes = Vec::new();
        for document in documents {
            for (position, text) in self.split(&document.text).into_iter().enumerate() {
                nodes.push(Node {
                    id: Uuid::new_v4().to_string(),
                    text,
                    position,
                    metadata: document.metadata.clone(),
                });
            }
        }
        nodes
    }

    /// Partition the token stream into consecutive "bodies" of fresh
    /// (non-overlap) tokens. Each body fits `chunk_size - chunk_overlap`
    /// so the carried overlap never pushes a chunk past `chunk_size`.
    fn pack_bodies<'a>(&self, text: &'a str) -> Vec<Vec<&'a str>> {
        let budget = self.chunk_size - self.chunk_overlap;
        let mut bodies: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for sentence in sentences(text) {
            let tokens: Vec<&str> = sentence.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            if tokens.len() > budget {
                if !current.is_empty() {
                    bodies.push(std::mem::take(&mut current));
                }
                let mut start = 0;
                while start < tokens.len() {
                    let end = (start + budget).min(tokens.len());
                    bodies.push(tokens[start..end].to_vec());
                    start = end;
                }
            } else if current.len() + tokens.len() > budget {
                bodies.push(std::mem::take(&mut current));
                current = tokens;
            } else {
                current.extend(tokens);
            }
        }

        if !current.is_empty() {
            bodies.push(current);
        }
        bodies
    }
}

/// Split text into sentences: a sentence ends at `.`/`!`/`?` followed by
/// whitespace (or end of text), or at a blank line.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_newline = false;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        let next_is_ws = chars.peek().map_or(true, |&(_, c)| c.is_whitespace());
        let boundary = match ch {
            '.' | '!' | '?' => next_is_ws,
            '\n' => prev_newline,
            _ => false,
        };
        prev_newline = ch == '\n';

        if boundary {
            let end = i + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMetadata;
    use std::collections::BTreeMap;

    fn token_count(s: &str) -> usize {
        s.split_whitespace().count()
    }

    fn doc(name: &str, text: &str) -> SourceDocument {
        SourceDocument {
            text: text.to_string(),
            metadata: DocMetadata {
                source: name.to_string(),
                file_path: name.into(),
                file_size: 0,
                file_type: "pdf".to_string(),
                has_layout_analysis: false,
                extra: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn small_text_single_chunk() {
        let splitter = SentenceSplitter::new(512, 50).unwrap();
        let chunks = splitter.split("Hello, world. A short document.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Hello, world. A short document.");
    }

    #[test]
    fn empty_text_no_chunks() {
        let splitter = SentenceSplitter::new(512, 50).unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n  ").is_empty());
    }

    #[test]
    fn overlap_must_be_below_size() {
        assert!(SentenceSplitter::new(10, 10).is_err());
        assert!(SentenceSplitter::new(0, 0).is_err());
        assert!(SentenceSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn chunks_respect_token_budget() {
        let splitter = SentenceSplitter::new(12, 4).unwrap();
        let text = "One two three four five. Six seven eight nine ten. \
                    Eleven twelve thirteen. Fourteen fifteen sixteen seventeen.";
        for chunk in splitter.split(text) {
            assert!(
                token_count(&chunk) <= 12,
                "chunk over budget: {:?}",
                chunk
            );
        }
    }

    #[test]
    fn breaks_prefer_sentence_boundaries() {
        let splitter = SentenceSplitter::new(10, 0).unwrap();
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa.";
        let chunks = splitter.split(text);
        // Every chunk ends where a sentence ends, not mid-sentence.
        for chunk in &chunks {
            assert!(chunk.ends_with('.'), "mid-sentence break: {:?}", chunk);
        }
    }

    #[test]
    fn overlap_repeats_previous_tail() {
        let splitter = SentenceSplitter::new(8, 3).unwrap();
        let text = "a b c d e. f g h i j. k l m n o. p q r s t.";
        let chunks = splitter.split(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split_whitespace().collect();
            let next: Vec<&str> = pair[1].split_whitespace().collect();
            let tail = &prev[prev.len().saturating_sub(3)..];
            assert_eq!(&next[..tail.len()], tail, "overlap not carried");
        }
    }

    #[test]
    fn long_sentence_hard_split() {
        let splitter = SentenceSplitter::new(6, 2).unwrap();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = splitter.split(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(token_count(chunk) <= 6);
        }
    }

    #[test]
    fn reconstruction_removes_overlap_exactly() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs. \
                    How vexingly quick daft zebras jump! \
                    Sphinx of black quartz, judge my vow. \
                    The five boxing wizards jump quickly.";
        let source_tokens: Vec<&str> = text.split_whitespace().collect();

        for (size, overlap) in [(8, 0), (8, 3), (12, 5), (40, 10), (5, 4)] {
            let splitter = SentenceSplitter::new(size, overlap).unwrap();
            let chunks = splitter.split(text);

            let mut rebuilt: Vec<String> = Vec::new();
            let mut prev_body_len = 0usize;
            for (i, chunk) in chunks.iter().enumerate() {
                let tokens: Vec<&str> = chunk.split_whitespace().collect();
                let carried = if i == 0 { 0 } else { overlap.min(prev_body_len) };
                let body = &tokens[carried..];
                prev_body_len = body.len();
                rebuilt.extend(body.iter().map(|t| t.to_string()));
            }

            assert_eq!(
                rebuilt, source_tokens,
                "reconstruction failed for size={} overlap={}",
                size, overlap
            );
        }
    }

    #[test]
    fn deterministic() {
        let splitter = SentenceSplitter::new(10, 3).unwrap();
        let text = "First point. Second point. Third point. Fourth point here.";
        assert_eq!(splitter.split(text), splitter.split(text));
    }

    #[test]
    fn nodes_inherit_metadata_and_positions() {
        let splitter = SentenceSplitter::new(6, 2).unwrap();
        let docs = vec![
            doc("a.pdf", "alpha beta gamma delta. epsilon zeta eta theta iota."),
            doc("b.pdf", "one two three."),
        ];
        let nodes = splitter.chunk_documents(&docs);

        assert!(nodes.len() >= 3);
        // a.pdf nodes come first, positions restart per document.
        let b_start = nodes.iter().position(|n| n.metadata.source == "b.pdf").unwrap();
        for (i, node) in nodes[..b_start].iter().enumerate() {
            assert_eq!(node.metadata.source, "a.pdf");
            assert_eq!(node.position, i);
        }
        assert_eq!(nodes[b_start].position, 0);
        assert!(nodes.iter().all(|n| !n.id.is_empty()));
    }
}

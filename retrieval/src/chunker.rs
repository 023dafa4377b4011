//! Line-based document chunking.
//!
//! Every non-blank line of the extracted text becomes one chunk. This is
//! coarse (a sentence wrapped across two lines lands in two chunks) but it is
//! the granularity the index is built and evaluated on.

use serde::{Deserialize, Serialize};

/// A chunk of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the document, and the key to its embedding.
    pub index: usize,

    /// Trimmed, non-empty text.
    pub text: String,
}

/// Split text into chunks, one per non-blank line, in source order.
pub fn chunk_text(text: &str) -> Vec<Chunk> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| Chunk {
            index,
            text: line.to_string(),
        })
        .collect()
}

/// Concatenate extracted pages the way the extractor hands them over:
/// each page followed by a newline.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for page in pages {
        text.push_str(page.as_ref());
        text.push('\n');
    }
    text
}

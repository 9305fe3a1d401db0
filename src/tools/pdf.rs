//! # PDF Pipeline
//!
//! Download a paper, extract its text and (optionally) split it into chunks
//! for the vector index.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PdfError;

/// Total time allowed for a single PDF download
const DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Size cap applied in lightweight mode
const LIGHTWEIGHT_MAX_BYTES: usize = 3 * 1024 * 1024;

/// Pages read per paper in lightweight mode
const LIGHTWEIGHT_MAX_PAGES: usize = 15;

/// Separators tried in order by the recursive splitter
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Extracted paper text.
#[derive(Debug, Clone, Default)]
pub struct ParsedPaper {
    /// Full extracted text
    pub text: String,

    /// Chunks for indexing; empty when chunking was skipped
    pub chunks: Vec<String>,

    /// Character count of `text`
    pub char_count: usize,
}

/// PDF-to-text collaborator.
#[async_trait]
pub trait PdfPipeline: Send + Sync {
    /// Download and extract a paper. `skip_chunks` avoids chunking work when
    /// nothing will be indexed.
    async fn fetch_and_extract(&self, url: &str, skip_chunks: bool) -> Result<ParsedPaper, PdfError>;
}

// =============================================================================
// TEXT SPLITTER
// =============================================================================
/// Recursive character splitter.
///
/// Splits on the coarsest separator present, merges the pieces back into
/// chunks of at most `chunk_size` characters, and recurses with finer
/// separators into pieces that are still too long. Consecutive chunks share
/// up to `chunk_overlap` characters.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }

        chunks
    }

    /// Greedily join small pieces into chunks, carrying an overlap tail.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = if window.is_empty() { len } else { total + sep_len + len };

            if joined_len > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);

                // Drop from the front until the tail fits the overlap budget
                // and the next piece fits alongside it.
                while let Some(&first) = window.front() {
                    let fits_next = total + sep_len + len <= self.chunk_size;
                    if total <= self.chunk_overlap && fits_next {
                        break;
                    }
                    window.pop_front();
                    total -= char_len(first);
                    if !window.is_empty() {
                        total -= sep_len;
                    }
                }
            }

            if !window.is_empty() {
                total += sep_len;
            }
            window.push_back(piece);
            total += len;
        }

        if !window.is_empty() {
            push_chunk(&mut chunks, &window, separator);
        }

        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &std::collections::VecDeque<&str>, separator: &str) {
    let chunk = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// PDF PARSER
// =============================================================================
/// reqwest download + `pdf-extract` text extraction.
pub struct PdfParser {
    client: reqwest::Client,
    splitter: TextSplitter,
    max_bytes: Option<usize>,
    max_pages: Option<usize>,
}

impl PdfParser {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, PdfError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("scholarflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            splitter: TextSplitter::new(chunk_size, chunk_overlap),
            max_bytes: None,
            max_pages: None,
        })
    }

    /// Reject PDFs larger than 3 MB and read only the first 15 pages
    /// (resource-constrained deployments)
    pub fn lightweight(mut self, enabled: bool) -> Self {
        self.max_bytes = enabled.then_some(LIGHTWEIGHT_MAX_BYTES);
        self.max_pages = enabled.then_some(LIGHTWEIGHT_MAX_PAGES);
        self
    }

    /// Download a PDF, enforcing the size cap if one is set.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, PdfError> {
        info!(url = %url, "Downloading PDF");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PdfError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);

        if let Some(max) = self.max_bytes {
            if bytes.len() > max {
                warn!(size_mb, "PDF exceeds lightweight size limit");
                return Err(PdfError::TooLarge { size_mb });
            }
        }

        debug!(bytes = bytes.len(), "Downloaded PDF");
        Ok(bytes.to_vec())
    }

    /// Extract text on a blocking thread; PDF decoding is CPU bound.
    pub async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, PdfError> {
        let pages =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
                .await
                .map_err(|e| PdfError::Extraction(e.to_string()))?
                .map_err(|e| PdfError::Extraction(e.to_string()))?;

        let page_count = pages.len();
        let text = join_pages(pages, self.max_pages);
        info!(pages = page_count, chars = text.chars().count(), "Extracted text from PDF");
        Ok(text)
    }
}

/// Concatenate page texts, keeping at most `max_pages` leading pages.
fn join_pages(pages: Vec<String>, max_pages: Option<usize>) -> String {
    let keep = max_pages.unwrap_or(pages.len());
    if pages.len() > keep {
        debug!(pages = pages.len(), kept = keep, "Truncating PDF to page limit");
    }
    pages.into_iter().take(keep).collect::<Vec<_>>().join("\n\n")
}

#[async_trait]
impl PdfPipeline for PdfParser {
    async fn fetch_and_extract(&self, url: &str, skip_chunks: bool) -> Result<ParsedPaper, PdfError> {
        let bytes = self.download(url).await?;
        let text = self.extract_text(bytes).await?;

        let chunks = if skip_chunks {
            Vec::new()
        } else {
            let chunks = self.splitter.split_text(&text);
            debug!(count = chunks.len(), "Split text into chunks");
            chunks
        };

        Ok(ParsedPaper {
            char_count: char_len(&text),
            text,
            chunks,
        })
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 20);
        assert_eq!(splitter.split_text("hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(50, 10);
        let text = "lorem ipsum dolor sit amet ".repeat(40);

        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_paragraphs_split_before_words() {
        let splitter = TextSplitter::new(30, 0);
        let text = "first paragraph here\n\nsecond paragraph here";

        let chunks = splitter.split_text(text);
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(20, 8);
        let text = "aaa bbb ccc ddd eee fff ggg hhh iii jjj";

        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word), "{:?}", pair);
            assert!(pair[1].chars().count() <= 20);
        }
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(10, 0);
        let chunks = splitter.split_text(&"x".repeat(25));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn test_splitter_handles_multibyte_text() {
        let splitter = TextSplitter::new(4, 1);
        let chunks = splitter.split_text("ünïcödé wörds ärë fïnë");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn test_join_pages_respects_page_limit() {
        let pages: Vec<String> = (1..=20).map(|n| format!("page {}", n)).collect();

        let capped = join_pages(pages.clone(), Some(LIGHTWEIGHT_MAX_PAGES));
        assert!(capped.starts_with("page 1\n\npage 2"));
        assert!(capped.ends_with("page 15"));
        assert!(!capped.contains("page 16"));

        let full = join_pages(pages, None);
        assert!(full.ends_with("page 20"));
    }

    #[test]
    fn test_lightweight_sets_both_caps() {
        let parser = PdfParser::new(1000, 200).unwrap().lightweight(true);
        assert_eq!(parser.max_bytes, Some(LIGHTWEIGHT_MAX_BYTES));
        assert_eq!(parser.max_pages, Some(LIGHTWEIGHT_MAX_PAGES));

        let parser = parser.lightweight(false);
        assert!(parser.max_bytes.is_none() && parser.max_pages.is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}

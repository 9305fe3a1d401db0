//! External research tools: paper search and PDF processing.

pub mod arxiv;
pub mod pdf;

pub use arxiv::{ArxivSearcher, Paper, PaperSearch};
pub use pdf::{truncate_chars, ParsedPaper, PdfParser, PdfPipeline, TextSplitter};

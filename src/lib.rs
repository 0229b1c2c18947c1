//! # pdfgloss
//!
//! Annotates academic papers with the help of a language model.
//!
//! The text layer of a PDF is extracted with positions, grouped into chunks
//! sent to a chat-completion endpoint, and the model's key points, term
//! translations and paragraph summaries are written back onto the original
//! pages as highlight and note annotations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use pdfgloss::{CancelFlag, Config, NoProgress, OpenAiBackend, Pipeline};
//!
//! # async fn run() -> pdfgloss::Result<()> {
//! let config = Config::load(None)?;
//! let backend = OpenAiBackend::new(config.openai_settings()?)?;
//! let pipeline = Pipeline::new(config, backend)?;
//!
//! let summary = pipeline
//!     .run(
//!         Path::new("paper.pdf"),
//!         Path::new("paper_annotated.pdf"),
//!         &NoProgress,
//!         &CancelFlag::new(),
//!     )
//!     .await?;
//! println!(
//!     "{} annotations, {} chunks skipped",
//!     summary.annotations_written, summary.chunks_skipped
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! - [`parser`]: positioned text blocks per page, two-column aware
//! - [`chunk`]: order-preserving chunks under a token ceiling
//! - [`analysis`]: prompt, completion call with retry, JSON parsing
//! - [`resolve`]: quotes mapped back to per-line bounding boxes
//! - [`annotate`]: highlight, popup and sticky-note annotations

pub mod analysis;
pub mod annotate;
pub mod chunk;
pub mod config;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod resolve;

// Re-export commonly used types
pub use analysis::{
    AnalysisClient, AnalysisSettings, CallOutcome, CompletionBackend, CompletionRequest,
    OpenAiBackend, OpenAiSettings, RetryPolicy, TermAggressiveness,
};
pub use annotate::{AnnotationStyle, Annotator, HighlightColors};
pub use chunk::{estimate_tokens, Chunk, Chunker};
pub use config::Config;
pub use detect::{pdf_version_from_bytes, pdf_version_from_path};
pub use error::{Error, Result};
pub use model::{
    AnnotationKind, AnnotationRequest, BBox, BlockRef, ExtractedDocument, ExtractedPage,
    ResolvedSpan, Rgb, TextBlock, TextLine, TextRun,
};
pub use parser::{ErrorMode, ExtractOptions, PageSelection, PdfParser};
pub use pipeline::{default_output_path, CancelFlag, NoProgress, Pipeline, ProgressSink, RunSummary};

use std::path::Path;

/// Extract the text layer of a PDF file.
///
/// # Example
///
/// ```no_run
/// use pdfgloss::extract_file;
///
/// let doc = extract_file("paper.pdf").unwrap();
/// for (_, block) in doc.blocks() {
///     println!("p{} {:?}: {}", block.page_index + 1, block.bbox, block.text);
/// }
/// ```
pub fn extract_file<P: AsRef<Path>>(path: P) -> Result<ExtractedDocument> {
    PdfParser::open(path)?.extract()
}

/// Extract the text layer of a PDF file with custom options.
pub fn extract_file_with_options<P: AsRef<Path>>(
    path: P,
    options: ExtractOptions,
) -> Result<ExtractedDocument> {
    PdfParser::open_with_options(path, options)?.extract()
}

/// Extract the text layer of a PDF held in memory.
pub fn extract_bytes(data: &[u8]) -> Result<ExtractedDocument> {
    PdfParser::from_bytes(data)?.extract()
}

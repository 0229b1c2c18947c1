//! End-to-end run: extract, chunk, analyze, resolve, annotate.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::analysis::{AnalysisClient, CompletionBackend};
use crate::annotate::{same_file, Annotator};
use crate::chunk::{Chunk, Chunker};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{AnnotationKind, ExtractedDocument, ResolvedSpan};
use crate::parser::{ExtractOptions, PdfParser};
use crate::resolve::resolve;

pub use crate::analysis::CancelFlag;

/// Receives progress while chunks are analyzed.
pub trait ProgressSink: Send + Sync {
    /// Called once before analysis starts.
    fn chunks_planned(&self, _total: usize) {}

    /// Called after each analyzed or skipped chunk, from any worker.
    fn chunk_finished(&self, done: usize, total: usize);
}

/// A sink that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn chunk_finished(&self, _done: usize, _total: usize) {}
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Pages extracted
    pub pages: usize,
    pub blocks: usize,
    pub chunks: usize,
    pub chunks_analyzed: usize,
    /// Chunks whose analysis failed (upstream, rejected or malformed)
    pub chunks_skipped: usize,
    /// Chunks never sent because the run was interrupted
    pub chunks_not_sent: usize,
    pub key_points: usize,
    pub terms: usize,
    pub summaries: usize,
    /// Requests whose quote was not found on the page
    pub unresolved: usize,
    pub annotations_written: usize,
    pub interrupted: bool,
}

enum ChunkOutcome {
    Analyzed(Vec<ResolvedSpan>),
    Skipped,
    NotSent,
}

/// The annotation pipeline over a completion backend.
pub struct Pipeline<B> {
    config: Config,
    extract: ExtractOptions,
    client: AnalysisClient<B>,
}

impl<B: CompletionBackend> Pipeline<B> {
    /// Validate `config` and build a pipeline around `backend`.
    pub fn new(config: Config, backend: B) -> Result<Self> {
        config.validate()?;
        let client =
            AnalysisClient::new(backend, config.analysis_settings(), config.retry_policy());
        let extract = ExtractOptions::new()
            .lenient()
            .with_min_block_chars(config.min_block_chars);
        Ok(Self {
            config,
            extract,
            client,
        })
    }

    /// Replace the extraction options (page selection, error mode).
    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Annotate `input` and write the result to `output`.
    ///
    /// Only unreadable input, unwritable output and configuration problems
    /// are errors; failed chunks and unresolved quotes are counted in the
    /// returned summary.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<RunSummary> {
        if same_file(input, output) {
            return Err(Error::WriteError(format!(
                "output {} would overwrite the input",
                output.display()
            )));
        }

        log::info!("extracting text from {}", input.display());
        let doc = PdfParser::open_with_options(input, self.extract.clone())?.extract()?;

        let chunks = Chunker::new(self.config.max_tokens_per_chunk)?.chunk(&doc);
        log::info!(
            "{} block(s) on {} page(s) in {} chunk(s)",
            doc.block_count(),
            doc.pages.len(),
            chunks.len()
        );

        let mut summary = RunSummary {
            pages: doc.pages.len(),
            blocks: doc.block_count(),
            chunks: chunks.len(),
            ..RunSummary::default()
        };

        let outcomes = self.analyze_chunks(&doc, &chunks, progress, cancel).await;

        // (page, chunk, request) order
        let mut spans: Vec<(usize, usize, ResolvedSpan)> = Vec::new();
        for (chunk_id, outcome) in outcomes {
            match outcome {
                ChunkOutcome::Analyzed(resolved) => {
                    summary.chunks_analyzed += 1;
                    spans.extend(
                        resolved
                            .into_iter()
                            .enumerate()
                            .map(|(i, span)| (chunk_id, i, span)),
                    );
                }
                ChunkOutcome::Skipped => summary.chunks_skipped += 1,
                ChunkOutcome::NotSent => summary.chunks_not_sent += 1,
            }
        }
        spans.sort_by_key(|(chunk_id, i, span)| (span.page_index, *chunk_id, *i));

        let mut annotator = Annotator::open(input, self.config.annotation_style())?;
        for (_, _, span) in &spans {
            match span.request.kind() {
                AnnotationKind::KeyPoint => summary.key_points += 1,
                AnnotationKind::Term => summary.terms += 1,
                AnnotationKind::ParagraphSummary => summary.summaries += 1,
            }
            if !span.is_resolved() {
                summary.unresolved += 1;
                log::warn!(
                    "Could not locate {:?} quote on the page: {:?}",
                    span.request.kind(),
                    preview(span.request.quote())
                );
                continue;
            }
            annotator.add(span);
        }

        summary.annotations_written = annotator.save(output)?;
        summary.interrupted = cancel.is_cancelled();
        Ok(summary)
    }

    /// Analyze and resolve chunks with at most `workers` requests in flight.
    ///
    /// Returns outcomes sorted by chunk id.
    async fn analyze_chunks(
        &self,
        doc: &ExtractedDocument,
        chunks: &[Chunk],
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Vec<(usize, ChunkOutcome)> {
        let total = chunks.len();
        let done = AtomicUsize::new(0);
        progress.chunks_planned(total);

        let done = &done;
        let mut outcomes: Vec<(usize, ChunkOutcome)> = stream::iter(chunks)
            .map(|chunk| async move {
                if cancel.is_cancelled() {
                    return (chunk.chunk_id, ChunkOutcome::NotSent);
                }

                let outcome = match self.client.analyze(&chunk.text(doc), cancel).await {
                    Ok(requests) => {
                        log::debug!(
                            "chunk {}: {} request(s)",
                            chunk.chunk_id,
                            requests.len()
                        );
                        ChunkOutcome::Analyzed(
                            requests
                                .into_iter()
                                .map(|request| resolve(doc, chunk, request))
                                .collect(),
                        )
                    }
                    Err(Error::Cancelled) => return (chunk.chunk_id, ChunkOutcome::NotSent),
                    Err(e) => {
                        log::warn!("Skipping chunk {}: {}", chunk.chunk_id + 1, e);
                        ChunkOutcome::Skipped
                    }
                };

                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress.chunk_finished(finished, total);
                (chunk.chunk_id, outcome)
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        outcomes.sort_by_key(|(chunk_id, _)| *chunk_id);
        outcomes
    }
}

/// First few words of a quote, for log lines.
fn preview(quote: &str) -> String {
    const MAX_CHARS: usize = 60;
    match quote.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &quote[..idx]),
        None => quote.to_string(),
    }
}

/// `<stem>_annotated.pdf` next to the input.
pub fn default_output_path(input: &Path) -> std::path::PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_annotated.pdf"))
}

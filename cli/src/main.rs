//! pdfgloss CLI - annotate academic PDFs with a language model

use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pdfgloss::{
    default_output_path, CancelFlag, Config, Error, ExtractOptions, OpenAiBackend, PageSelection,
    Pipeline, ProgressSink, RunSummary,
};

#[derive(Parser)]
#[command(name = "pdfgloss")]
#[command(author = "iyulab")]
#[command(version)]
#[command(
    about = "Highlight key points, translate terms and summarise paragraphs of academic PDFs",
    long_about = None
)]
struct Cli {
    /// Input PDF file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (default: <input>_annotated.pdf)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY and the config file)
    #[arg(long, value_name = "KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Config file (default: ./pdfgloss.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Token ceiling per chunk
    #[arg(long, value_name = "N")]
    max_tokens: Option<usize>,

    /// Concurrent model requests
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Page range (e.g., "1-10", "1,3,5")
    #[arg(long)]
    pages: Option<String>,

    /// Verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
}

/// Progress bar over analyzed chunks.
struct ChunkProgress {
    bar: ProgressBar,
}

impl ChunkProgress {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressSink for ChunkProgress {
    fn chunks_planned(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("analyzing...");
    }

    fn chunk_finished(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let quiet = cli.quiet;
    match run(cli).await {
        Ok((summary, output)) => {
            if !quiet {
                print_summary(&summary, &output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(RunSummary, PathBuf), Error> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(key) = cli.api_key {
        config.api_key = Some(key);
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(url) = cli.base_url {
        config.api_base_url = url;
    }
    if let Some(n) = cli.max_tokens {
        config.max_tokens_per_chunk = n;
    }
    if let Some(n) = cli.workers {
        config.workers = n;
    }
    config.validate()?;
    log::debug!("{:?}", config);

    let mut extract = ExtractOptions::new()
        .lenient()
        .with_min_block_chars(config.min_block_chars);
    if let Some(pages) = cli.pages.as_deref() {
        extract = extract.with_pages(PageSelection::parse(pages).map_err(Error::Config)?);
    }

    let output = cli.output.unwrap_or_else(|| default_output_path(&cli.input));

    let backend = OpenAiBackend::new(config.openai_settings()?)?;
    let model = backend.model().to_string();
    let pipeline = Pipeline::new(config, backend)?.with_extract_options(extract);

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    if !cli.quiet {
        println!(
            "{} {} {}",
            "Annotating".green().bold(),
            cli.input.display(),
            format!("with {model}").dimmed()
        );
    }

    let progress = ChunkProgress::new(cli.quiet);
    let result = pipeline.run(&cli.input, &output, &progress, &cancel).await;
    progress.bar.finish_and_clear();

    Ok((result?, output))
}

/// First Ctrl-C stops new requests; a second one exits at once.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            "Interrupted: writing partial output (Ctrl-C again to abort)".yellow()
        );
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn print_summary(summary: &RunSummary, output: &Path) {
    println!("\n{} {}", "Saved to".green().bold(), output.display());
    println!(
        "  {} {} pages, {} blocks, {} chunks",
        "├─".dimmed(),
        summary.pages,
        summary.blocks,
        summary.chunks
    );
    println!(
        "  {} {} key points, {} terms, {} summaries",
        "├─".dimmed(),
        summary.key_points,
        summary.terms,
        summary.summaries
    );
    println!(
        "  {} {} annotations written",
        "├─".dimmed(),
        summary.annotations_written
    );

    let skipped = format!("{} chunks skipped", summary.chunks_skipped);
    let unresolved = format!("{} quotes not found on the page", summary.unresolved);
    println!(
        "  {} {}",
        "├─".dimmed(),
        if summary.chunks_skipped > 0 {
            skipped.yellow()
        } else {
            skipped.normal()
        }
    );
    println!(
        "  {} {}",
        "└─".dimmed(),
        if summary.unresolved > 0 {
            unresolved.yellow()
        } else {
            unresolved.normal()
        }
    );

    if summary.interrupted {
        println!(
            "\n{} {} chunks were not sent",
            "Interrupted:".yellow().bold(),
            summary.chunks_not_sent
        );
    }
}

//! `narrative-extract`: pull control-narrative entities out of one document
//! and print them as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use extract::{ExtractionConfig, Extractor, PromptStrategy, render_output};
use ingest::FileReader;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "narrative-extract",
    version,
    about = "Extract equipment, parameters, variables, conditions and actions from a control narrative"
)]
struct Cli {
    /// Plain-text or markdown document.
    path: PathBuf,

    /// JSON config file; flags below override it.
    #[arg(long, env = "NARRATIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Start from a built-in preset instead of the defaults.
    #[arg(long, value_enum, conflicts_with = "config")]
    preset: Option<Preset>,

    /// unified or per_category.
    #[arg(long, env = "NARRATIVE_STRATEGY")]
    strategy: Option<PromptStrategy>,

    /// Maximum chunk length in characters.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared between consecutive chunks.
    #[arg(long)]
    overlap: Option<usize>,

    /// Ollama model name.
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Ollama base URL.
    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Also collect category lists nested below the top level.
    #[arg(long)]
    flatten_nested: bool,

    /// Write the JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Preset {
    Fast,
    Accurate,
}

impl Cli {
    fn extraction_config(&self) -> Result<ExtractionConfig> {
        let mut config = match (&self.config, self.preset) {
            (Some(path), _) => ExtractionConfig::from_file(path)?,
            (None, Some(Preset::Fast)) => ExtractionConfig::fast(),
            (None, Some(Preset::Accurate)) => ExtractionConfig::accurate(),
            (None, None) => ExtractionConfig::default(),
        };

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(size) = self.chunk_size {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = self.overlap {
            config.chunking.chunk_overlap = overlap;
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.model.base_url = url.clone();
        }
        if self.flatten_nested {
            config.flatten_nested = true;
        }

        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.extraction_config()?;
    info!(
        strategy = %config.strategy,
        model = %config.model.model,
        chunk_size = config.chunking.chunk_size,
        overlap = config.chunking.chunk_overlap,
        "Configured extraction"
    );

    // Ctrl-C finishes the current chunk and returns what was found so far
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current chunk");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let extractor = Extractor::from_config(config)?.with_cancel_flag(cancel);
    let outcome = extractor.extract_document(&FileReader, &cli.path).await;

    let rendered = serde_json::to_string_pretty(&render_output(&outcome))?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote result");
        }
        None => println!("{rendered}"),
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rowembed_core::config::{Config, DevicePreference, PipelineConfig};
use rowembed_core::traits::Embedder;
use rowembed_embed::load_embedder;
use rowembed_pipeline::{Pipeline, PipelineOptions};

#[derive(Parser, Debug)]
#[command(name = "rowembed", about = "Embed the text column of a CSV file and write one JSON object per row")]
struct Cli {
    /// Input CSV (overrides `input_path`)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output JSONL, truncated if it exists (overrides `output_path`)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Model identifier on the hub (overrides `model.id`)
    #[arg(long)]
    model: Option<String>,

    /// Column holding the text to embed (overrides `text_field`)
    #[arg(long)]
    text_field: Option<String>,

    /// Records per embedding batch (overrides `batch_size`)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Force CPU even when an accelerator is available
    #[arg(long, default_value_t = false)]
    cpu: bool,

    /// Disable the progress spinner
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(m) = &self.model { cfg.model.id.clone_from(m); }
        if let Some(f) = &self.text_field { cfg.text_field.clone_from(f); }
        if let Some(b) = self.batch_size { cfg.batch_size = b; }
        if self.cpu { cfg.model.device = DevicePreference::Cpu; }
    }

    /// Input and output paths. Flag values arrive already shell-expanded and
    /// are only joined to `base`; config values get `~`/`$VAR` expansion.
    fn paths(&self, cfg: &PipelineConfig, base: &Path) -> (PathBuf, PathBuf) {
        let input = self.input.as_ref().map_or_else(|| cfg.input_path(base), |p| base.join(p));
        let output = self.output.as_ref().map_or_else(|| cfg.output_path(base), |p| base.join(p));
        (input, output)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load().pipeline().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    cli.apply(&mut cfg);
    cfg.validate()?;

    let base = std::env::current_dir()?;
    let (input, output) = cli.paths(&cfg, &base);
    info!("Input CSV: {}", input.display());
    info!("Output JSONL: {}", output.display());
    info!("Model: {}", cfg.model.id);
    info!("Text column: {} -> {}", cfg.text_field, cfg.vector_field());
    info!("Batch size: {} (sub-batch {})", cfg.batch_size, cfg.encode_batch_size);

    let (embedder, device) = load_embedder(&cfg.model).context("failed to load embedding model")?;
    info!(%device, dim = embedder.dim(), "Embedding model ready");

    let progress = if cli.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} rows read, {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    };

    let mut pipeline = Pipeline::new(PipelineOptions::from(&cfg), embedder).with_progress(progress);
    let summary = pipeline.run(&input, &output).with_context(|| format!("converting {}", input.display()))?;

    println!("\n✅ Processing complete.");
    println!("📊 Total rows read: {}", summary.rows_read);
    println!("📊 Rows skipped (no text): {}", summary.rows_skipped);
    println!("📊 Rows truncated: {}", summary.rows_truncated);
    println!("📊 Rows with text processed: {} in {} batches", summary.rows_processed, summary.batches);
    println!("💾 Output saved to {}", summary.output_path.display());
    Ok(())
}

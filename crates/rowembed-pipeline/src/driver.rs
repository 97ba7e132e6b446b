use std::io::{Read, Write};
use std::path::Path;

use indicatif::ProgressBar;
use rowembed_core::config::PipelineConfig;
use rowembed_core::error::{BatchFailure, Error, Result};
use rowembed_core::traits::Embedder;
use rowembed_core::types::RunSummary;
use tracing::{debug, error, info};

use crate::batch::{Batch, Batcher};
use crate::enrich::enrich;
use crate::invoke::EmbeddingInvoker;
use crate::sink::JsonlSink;
use crate::source::RecordSource;
use crate::validate::{TextValidator, Validation};

/// Rows dumped at debug level when a run starts.
const PREVIEW_ROWS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    BatchFailed,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub text_field: String,
    pub vector_field: String,
    pub batch_size: usize,
    pub encode_batch_size: usize,
    pub max_text_chars: usize,
    pub delimiter: u8,
}

impl Default for PipelineOptions {
    fn default() -> Self { Self::from(&PipelineConfig::default()) }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            text_field: cfg.text_field.clone(),
            vector_field: cfg.vector_field(),
            batch_size: cfg.batch_size,
            encode_batch_size: cfg.encode_batch_size,
            max_text_chars: cfg.max_text_chars,
            delimiter: cfg.delimiter_byte(),
        }
    }
}

/// Drives one conversion run, batch by batch.
///
/// A failing batch is neither retried nor skipped: the run stops in
/// `BatchFailed` and returns `Error::Batch` with the batch's context. Lines
/// from earlier batches are already flushed and stay on disk.
pub struct Pipeline<E: Embedder> {
    options: PipelineOptions,
    embedder: E,
    validator: TextValidator,
    progress: ProgressBar,
    state: RunState,
}

impl<E: Embedder> Pipeline<E> {
    pub fn new(options: PipelineOptions, embedder: E) -> Self {
        let validator = TextValidator::new(options.text_field.clone(), options.max_text_chars);
        Self { options, embedder, validator, progress: ProgressBar::hidden(), state: RunState::Idle }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self { self.progress = progress; self }

    pub fn state(&self) -> RunState { self.state }

    pub fn embedder(&self) -> &E { &self.embedder }

    /// Convert `input` into `output`. The input is opened first, so a missing
    /// input never creates an output file.
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<RunSummary> {
        let source = RecordSource::open(input, self.options.delimiter)?;
        let mut sink = JsonlSink::create(output)?;
        info!("Processing {} in batches of {} into {}", input.display(), self.options.batch_size, output.display());
        let mut summary = self.run_with(source, &mut sink)?;
        summary.output_path = output.to_path_buf();
        Ok(summary)
    }

    pub fn run_with<R: Read, W: Write>(&mut self, source: RecordSource<R>, sink: &mut JsonlSink<W>) -> Result<RunSummary> {
        self.transition(RunState::Running);
        let mut summary = RunSummary::default();
        let mut batcher = Batcher::new(self.options.batch_size);

        for item in source {
            let (row, record) = match item {
                Ok(item) => item,
                Err(e) => return Err(self.abort(e)),
            };
            summary.rows_read += 1;
            self.progress.set_position(summary.rows_read);
            if row <= PREVIEW_ROWS { debug!(row, "Row preview: {}", serde_json::Value::Object(record.clone())); }

            match self.validator.validate(row, record) {
                Validation::Skip { .. } => summary.rows_skipped += 1,
                Validation::Keep { record, truncated_from } => {
                    if truncated_from.is_some() { summary.rows_truncated += 1; }
                    if let Some(batch) = batcher.push(row, record) {
                        self.process(batch, sink, &mut summary)?;
                        info!("Processed {} of {} rows", summary.rows_processed, summary.rows_read);
                    }
                }
            }
        }

        if let Some(batch) = batcher.finish() {
            let size = batch.len();
            self.process(batch, sink, &mut summary)?;
            info!("Processed final batch: {} rows", size);
        }

        self.transition(RunState::Completed);
        self.progress.finish_with_message("done");
        info!(
            rows_read = summary.rows_read,
            rows_skipped = summary.rows_skipped,
            rows_truncated = summary.rows_truncated,
            rows_processed = summary.rows_processed,
            batches = summary.batches,
            "Processing complete"
        );
        Ok(summary)
    }

    fn process<W: Write>(&mut self, batch: Batch, sink: &mut JsonlSink<W>, summary: &mut RunSummary) -> Result<()> {
        let (index, size) = (batch.index, batch.len());
        let rows = batch.rows.clone();
        let text_lengths = batch.text_lengths(&self.options.text_field);
        debug!(batch = index, "Processing batch of {} texts", size);

        match self.embed_and_write(batch, sink) {
            Ok(written) => {
                summary.rows_processed += written as u64;
                summary.batches += 1;
                self.progress.set_message(format!("{} rows written", summary.rows_processed));
                Ok(())
            }
            Err(source) => {
                error!(batch = index, size, "Error processing batch: {}", source);
                for (i, (row, len)) in rows.iter().zip(&text_lengths).enumerate() {
                    error!(batch = index, "  Batch item {}: row {}, text length {}", i, row, len);
                }
                Err(self.abort(Error::Batch(Box::new(BatchFailure { index, size, rows, text_lengths, source }))))
            }
        }
    }

    fn embed_and_write<W: Write>(&self, batch: Batch, sink: &mut JsonlSink<W>) -> Result<usize> {
        let invoker = EmbeddingInvoker::new(&self.embedder, &self.options.text_field, self.options.encode_batch_size);
        let vectors = invoker.invoke(&batch)?;
        let enriched = enrich(batch.records, vectors, &self.options.vector_field)?;
        sink.write_batch(&enriched)
    }

    /// Ends the run in `BatchFailed`; pending records are not written.
    fn abort(&mut self, err: Error) -> Error {
        self.transition(RunState::BatchFailed);
        match &err {
            Error::Batch(ctx) => self.progress.abandon_with_message(format!("batch {} failed", ctx.index)),
            other => {
                error!("Stopping run: {}", other);
                self.progress.abandon_with_message("input error");
            }
        }
        err
    }

    fn transition(&mut self, next: RunState) {
        debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

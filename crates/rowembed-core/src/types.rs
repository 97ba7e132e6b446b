//! Domain types shared by the embedder backends and the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One input row: field name to value, in header order.
///
/// Values read from a delimited file are always strings; `Null` is accepted
/// and treated like an absent field by validation.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Where the embedding model runs. Logged, otherwise opaque to the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Accelerator,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Accelerator => f.write_str("accelerator"),
        }
    }
}

/// Counters reported by a completed run.
///
/// - `rows_read`: data rows pulled from the source (header excluded)
/// - `rows_skipped`: rows dropped because the text field was absent or blank
/// - `rows_truncated`: kept rows whose text was cut to the length cap
/// - `rows_processed`: rows embedded and written (one output line each)
/// - `batches`: embedding invocations that completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub rows_truncated: u64,
    pub rows_processed: u64,
    pub batches: u64,
    pub output_path: PathBuf,
}

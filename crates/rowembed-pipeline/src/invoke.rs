use rowembed_core::error::{Error, Result};
use rowembed_core::traits::Embedder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::batch::Batch;

/// Runs the embedder over one batch, in sub-chunks of at most `sub_batch`.
///
/// Output is positional: vector `i` belongs to `batch.records[i]`.
pub struct EmbeddingInvoker<'a> {
    embedder: &'a dyn Embedder,
    text_field: &'a str,
    sub_batch: usize,
}

impl<'a> EmbeddingInvoker<'a> {
    pub fn new(embedder: &'a dyn Embedder, text_field: &'a str, sub_batch: usize) -> Self {
        Self { embedder, text_field, sub_batch: sub_batch.max(1) }
    }

    /// The batch's texts in order. Anything that is not a string is
    /// stringified and reported, never dropped.
    pub fn texts(&self, batch: &Batch) -> Vec<String> {
        batch.records.iter().enumerate().map(|(i, record)| {
            let text = match record.get(self.text_field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    warn!(batch = batch.index, "Missing text at index {}, embedding empty string", i);
                    String::new()
                }
                Some(other) => {
                    warn!(batch = batch.index, "Non-string text at index {}: {}", i, other);
                    other.to_string()
                }
            };
            if text.trim().is_empty() { warn!(batch = batch.index, "Empty text at index {}", i); }
            text
        }).collect()
    }

    pub fn invoke(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() { return Ok(Vec::new()); }
        let texts = self.texts(batch);
        let dim = self.embedder.dim();
        let chunk = self.sub_batch.min(texts.len());
        debug!(batch = batch.index, "Generating embeddings for {} texts (sub-batch {})", texts.len(), chunk);

        let mut vectors = Vec::with_capacity(texts.len());
        for (n, group) in texts.chunks(chunk).enumerate() {
            let out = self.embedder.embed_batch(group).map_err(|e| Error::EmbeddingFailure(format!("{e:#}")))?;
            if out.len() != group.len() {
                return Err(Error::EmbeddingFailure(format!("sub-batch {} returned {} vectors for {} texts", n + 1, out.len(), group.len())));
            }
            vectors.extend(out);
        }

        for (i, v) in vectors.iter().enumerate() {
            if v.is_empty() { return Err(Error::EmbeddingFailure(format!("empty vector at index {i}"))); }
            if v.len() != dim {
                return Err(Error::EmbeddingFailure(format!("vector at index {i} has dimension {} (expected {dim})", v.len())));
            }
        }
        debug!(batch = batch.index, "Generated {} embeddings of dimension {}", vectors.len(), dim);
        Ok(vectors)
    }
}

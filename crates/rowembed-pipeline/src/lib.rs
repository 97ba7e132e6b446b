//! Streaming CSV → embedding → JSONL conversion.
//!
//! Records flow `source → validate → batch → invoke → enrich → sink`, one
//! batch at a time, driven by [`driver::Pipeline`]. Every batch is written
//! and flushed before the next one is read, so an aborted run leaves a
//! prefix of complete lines.
pub mod batch;
pub mod driver;
pub mod enrich;
pub mod invoke;
pub mod sink;
pub mod source;
pub mod validate;

pub use batch::{Batch, Batcher};
pub use driver::{Pipeline, PipelineOptions, RunState};
pub use enrich::{enrich, EnrichedRecord};
pub use invoke::EmbeddingInvoker;
pub use sink::JsonlSink;
pub use source::RecordSource;
pub use validate::{SkipReason, TextValidator, Validation};

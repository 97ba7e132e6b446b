use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use rowembed_core::error::{Error, Result};

use crate::enrich::EnrichedRecord;

/// Line-delimited JSON writer.
///
/// A batch is encoded in full before any byte reaches the output, then written
/// and flushed in one go: a batch that fails to encode leaves no trace.
pub struct JsonlSink<W: Write> {
    out: W,
    buf: Vec<u8>,
    lines: u64,
}

impl JsonlSink<File> {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) { fs::create_dir_all(parent)?; }
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(out: W) -> Self { Self { out, buf: Vec::new(), lines: 0 } }

    pub fn lines_written(&self) -> u64 { self.lines }

    pub fn get_ref(&self) -> &W { &self.out }

    pub fn into_inner(self) -> W { self.out }

    /// Append one record as a JSON line to `buf`.
    pub fn encode(record: &EnrichedRecord, buf: &mut Vec<u8>) -> Result<()> {
        if let Some(i) = record.vector.iter().position(|x| !x.is_finite()) {
            return Err(Error::SerializationFailure(format!("'{}' has non-finite value {} at position {}", record.vector_field, record.vector[i], i)));
        }
        serde_json::to_writer(&mut *buf, record).map_err(|e| Error::SerializationFailure(e.to_string()))?;
        buf.push(b'\n');
        Ok(())
    }

    pub fn write_batch(&mut self, records: &[EnrichedRecord]) -> Result<usize> {
        self.buf.clear();
        for record in records { Self::encode(record, &mut self.buf)?; }
        self.out.write_all(&self.buf)?;
        self.out.flush()?;
        self.lines += records.len() as u64;
        Ok(records.len())
    }
}

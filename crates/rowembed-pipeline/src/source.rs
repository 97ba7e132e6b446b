use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use rowembed_core::error::{Error, Result};
use rowembed_core::types::Record;
use serde_json::Value;

/// Lazy reader of delimited rows keyed by the header row.
///
/// Yields `(row, record)` where `row` is the 1-based data row number. Stops
/// after the first error; a source can only be restarted by reopening it.
pub struct RecordSource<R: Read = File> {
    headers: StringRecord,
    rows: StringRecordsIntoIter<R>,
    row: u64,
    done: bool,
}

impl RecordSource<File> {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::InputNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::from_reader(file, delimiter)
    }
}

impl<R: Read> RecordSource<R> {
    pub fn from_reader(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new().delimiter(delimiter).has_headers(true).from_reader(reader);
        let headers = reader.headers().map_err(|e| classify(0, e))?.clone();
        Ok(Self { headers, rows: reader.into_records(), row: 0, done: false })
    }

    pub fn headers(&self) -> &StringRecord { &self.headers }

    fn to_record(&self, row: &StringRecord) -> Record {
        self.headers.iter().zip(row.iter()).map(|(k, v)| (k.to_string(), Value::String(v.to_string()))).collect()
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Result<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done { return None; }
        let Some(next) = self.rows.next() else { self.done = true; return None; };
        self.row += 1;
        match next {
            Ok(raw) => Some(Ok((self.row, self.to_record(&raw)))),
            Err(e) => { self.done = true; Some(Err(classify(self.row, e))) }
        }
    }
}

fn classify(row: u64, err: csv::Error) -> Error {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => Error::Io(e),
        _ => Error::MalformedInput { row, message },
    }
}

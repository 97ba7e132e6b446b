use rowembed_core::types::Record;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Field absent or null.
    Missing,
    /// Field present but empty after trimming.
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Keep { record: Record, truncated_from: Option<usize> },
    Skip { record: Record, reason: SkipReason },
}

impl Validation {
    pub fn keep(&self) -> bool { matches!(self, Self::Keep { .. }) }

    pub fn into_record(self) -> Record {
        match self { Self::Keep { record, .. } | Self::Skip { record, .. } => record }
    }
}

/// Filters rows without usable text and caps text length.
///
/// Text that is kept untouched is not rewritten; only truncation replaces the
/// stored value (with the trimmed, capped text). Lengths are in chars.
#[derive(Debug, Clone)]
pub struct TextValidator {
    field: String,
    max_chars: usize,
}

impl TextValidator {
    pub fn new(field: impl Into<String>, max_chars: usize) -> Self { Self { field: field.into(), max_chars } }

    pub fn validate(&self, row: u64, mut record: Record) -> Validation {
        let found = match record.get(&self.field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some((s.clone(), false)),
            Some(other) => Some((other.to_string(), true)),
        };
        let Some((text, coerced)) = found else {
            warn!(row, field = %self.field, "No text content, skipping row");
            return Validation::Skip { record, reason: SkipReason::Missing };
        };
        if coerced {
            warn!(row, field = %self.field, "Non-string text coerced to {:?}", text);
            record.insert(self.field.clone(), Value::String(text.clone()));
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(row, field = %self.field, "Blank text content, skipping row");
            return Validation::Skip { record, reason: SkipReason::Blank };
        }

        let len = trimmed.chars().count();
        if len <= self.max_chars { return Validation::Keep { record, truncated_from: None }; }
        warn!(row, "Very long text ({} chars), truncating to {}", len, self.max_chars);
        let capped: String = trimmed.chars().take(self.max_chars).collect();
        record.insert(self.field.clone(), Value::String(capped));
        Validation::Keep { record, truncated_from: Some(len) }
    }
}

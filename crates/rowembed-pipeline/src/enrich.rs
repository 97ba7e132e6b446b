use rowembed_core::error::{Error, Result};
use rowembed_core::types::Record;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A record with its embedding attached under `vector_field`.
///
/// Serializes as one flat JSON object: the original fields in order, with the
/// vector replacing a same-named column in place or appended last.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub fields: Record,
    pub vector_field: String,
    pub vector: Vec<f32>,
}

impl Serialize for EnrichedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let replaces = self.fields.contains_key(&self.vector_field);
        let len = self.fields.len() + usize::from(!replaces);
        let mut map = serializer.serialize_map(Some(len))?;
        for (key, value) in &self.fields {
            if *key == self.vector_field { map.serialize_entry(key, &self.vector)?; } else { map.serialize_entry(key, value)?; }
        }
        if !replaces { map.serialize_entry(&self.vector_field, &self.vector)?; }
        map.end()
    }
}

/// Pair record `i` with vector `i`.
pub fn enrich(records: Vec<Record>, vectors: Vec<Vec<f32>>, vector_field: &str) -> Result<Vec<EnrichedRecord>> {
    if records.len() != vectors.len() {
        return Err(Error::ShapeMismatch { records: records.len(), vectors: vectors.len() });
    }
    Ok(records.into_iter().zip(vectors).map(|(fields, vector)| EnrichedRecord { fields, vector_field: vector_field.to_string(), vector }).collect())
}

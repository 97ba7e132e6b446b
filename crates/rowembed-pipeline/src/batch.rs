use rowembed_core::types::Record;
use serde_json::Value;

/// An ordered group of validated records, consumed as a unit.
///
/// `rows[i]` is the source row of `records[i]`. `index` is 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub rows: Vec<u64>,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Character length of each record's text field (0 when not a string).
    pub fn text_lengths(&self, field: &str) -> Vec<usize> {
        self.records.iter().map(|r| match r.get(field) { Some(Value::String(s)) => s.chars().count(), Some(Value::Null) | None => 0, Some(other) => other.to_string().chars().count() }).collect()
    }
}

/// Accumulates records in arrival order and cuts a batch every `capacity`.
pub struct Batcher {
    capacity: usize,
    next_index: usize,
    rows: Vec<u64>,
    records: Vec<Record>,
}

impl Batcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, next_index: 1, rows: Vec::with_capacity(capacity), records: Vec::with_capacity(capacity) }
    }

    pub fn pending(&self) -> usize { self.records.len() }

    pub fn push(&mut self, row: u64, record: Record) -> Option<Batch> {
        self.rows.push(row);
        self.records.push(record);
        if self.records.len() >= self.capacity { Some(self.cut()) } else { None }
    }

    /// The residual batch, if any records are pending.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.records.is_empty() { None } else { Some(self.cut()) }
    }

    fn cut(&mut self) -> Batch {
        let index = self.next_index;
        self.next_index += 1;
        Batch {
            index,
            rows: std::mem::replace(&mut self.rows, Vec::with_capacity(self.capacity)),
            records: std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(i: u64) -> Record {
        let mut r = Record::new();
        r.insert("id".into(), Value::String(i.to_string()));
        r
    }

    #[test]
    fn cuts_full_batches_then_residual() {
        let mut b = Batcher::new(2);
        assert!(b.push(1, rec(1)).is_none());
        let first = b.push(2, rec(2)).expect("full batch");
        assert_eq!(first.index, 1);
        assert_eq!(first.rows, vec![1, 2]);
        assert!(b.push(5, rec(5)).is_none());
        assert_eq!(b.pending(), 1);
        let last = b.finish().expect("residual");
        assert_eq!((last.index, last.rows.clone()), (2, vec![5]));
        assert!(b.finish().is_none(), "nothing pending after finish");
    }

    #[test]
    fn zero_capacity_behaves_as_one() {
        let mut b = Batcher::new(0);
        assert_eq!(b.push(1, rec(1)).map(|x| x.len()), Some(1));
    }
}

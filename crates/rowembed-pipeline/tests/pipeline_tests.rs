use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rowembed_core::error::Error;
use rowembed_core::traits::Embedder;
use rowembed_pipeline::{JsonlSink, Pipeline, PipelineOptions, RecordSource, RunState};
use rowembed_embed::FakeEmbedder;
use serde_json::Value;

/// Vector = [char count, first char code point]; lets tests check which text
/// produced which vector.
#[derive(Default)]
struct EchoEmbedder {
    calls: AtomicUsize,
    sizes: Mutex<Vec<usize>>,
}

impl Embedder for EchoEmbedder {
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| vec![t.chars().count() as f32, t.chars().next().map_or(0.0, |c| c as u32 as f32)]).collect())
    }
}

/// Returns one vector short on the `fail_on`-th call (1-based).
struct ShortEmbedder { fail_on: usize, calls: AtomicUsize }

impl Embedder for ShortEmbedder {
    fn dim(&self) -> usize { 3 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let n = if call == self.fail_on { texts.len() - 1 } else { texts.len() };
        Ok(vec![vec![0.5, 0.25, 0.125]; n])
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize { 3 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { anyhow::bail!("device lost") }
}

struct NanEmbedder;

impl Embedder for NanEmbedder {
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { Ok(vec![vec![1.0, f32::NAN]; texts.len()]) }
}

struct EmptyVectorEmbedder;

impl Embedder for EmptyVectorEmbedder {
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { Ok(vec![Vec::new(); texts.len()]) }
}

fn csv_input(rows: &[(&str, &str)]) -> String {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["id", "full_text"]).unwrap();
    for (id, text) in rows { w.write_record([*id, *text]).unwrap(); }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

fn options(batch_size: usize) -> PipelineOptions {
    PipelineOptions { batch_size, ..PipelineOptions::default() }
}

fn run<E: Embedder>(pipeline: &mut Pipeline<E>, input: &str) -> (Result<rowembed_core::types::RunSummary, Error>, Vec<Value>) {
    let source = RecordSource::from_reader(Cursor::new(input.as_bytes().to_vec()), b',').unwrap();
    let mut sink = JsonlSink::new(Vec::new());
    let result = pipeline.run_with(source, &mut sink);
    let text = String::from_utf8(sink.into_inner()).unwrap();
    let lines = text.lines().map(|l| serde_json::from_str(l).expect("every line is valid JSON")).collect();
    (result, lines)
}

#[test]
fn blank_and_overlong_rows_scenario() {
    let long = "x".repeat(12_000);
    let input = csv_input(&[("1", "hello world"), ("2", "   "), ("3", &long)]);
    let mut pipeline = Pipeline::new(options(2), EchoEmbedder::default());
    let (result, lines) = run(&mut pipeline, &input);
    let summary = result.expect("run completes");

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], "1");
    assert_eq!(lines[1]["id"], "3");
    assert_eq!(lines[1]["full_text"].as_str().unwrap().chars().count(), 10_000);
    // Batches hold validated records: rows 1 and 3 fill one batch of two.
    assert_eq!(pipeline.embedder().calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.rows_truncated, 1);
    assert_eq!(summary.rows_processed, 2);
    assert_eq!(pipeline.state(), RunState::Completed);
}

#[test]
fn batch_count_is_ceiling_of_valid_rows() {
    let rows: Vec<(String, String)> = (1..=7).map(|i| (i.to_string(), format!("text number {i}"))).collect();
    let borrowed: Vec<(&str, &str)> = rows.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let mut pipeline = Pipeline::new(options(3), EchoEmbedder::default());
    let (result, lines) = run(&mut pipeline, &csv_input(&borrowed));
    let summary = result.unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(lines.len(), 7);
    assert_eq!(*pipeline.embedder().sizes.lock().unwrap(), vec![3, 3, 1]);
}

#[test]
fn vectors_stay_attached_to_their_records() {
    let input = csv_input(&[("a", "alpha"), ("b", "bb"), ("c", "  "), ("d", "delta delta"), ("e", "e")]);
    let mut pipeline = Pipeline::new(options(2), EchoEmbedder::default());
    let (result, lines) = run(&mut pipeline, &input);
    result.unwrap();
    let ids: Vec<&str> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "d", "e"], "source order survives batching");
    for line in &lines {
        let text = line["full_text"].as_str().unwrap();
        let v = line["full_text_vector"].as_array().unwrap();
        assert_eq!(v[0].as_f64().unwrap() as usize, text.chars().count());
        assert_eq!(v[1].as_f64().unwrap() as u32, text.chars().next().unwrap() as u32);
    }
}

#[test]
fn sub_batching_preserves_positions() {
    let rows: Vec<(String, String)> = (0..10).map(|i| (i.to_string(), "y".repeat(i + 1))).collect();
    let borrowed: Vec<(&str, &str)> = rows.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let opts = PipelineOptions { batch_size: 10, encode_batch_size: 4, ..PipelineOptions::default() };
    let mut pipeline = Pipeline::new(opts, EchoEmbedder::default());
    let (result, lines) = run(&mut pipeline, &csv_input(&borrowed));
    assert_eq!(result.unwrap().batches, 1);
    assert_eq!(*pipeline.embedder().sizes.lock().unwrap(), vec![4, 4, 2]);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["full_text_vector"][0].as_f64().unwrap() as usize, i + 1);
    }
}

#[test]
fn short_embedding_aborts_and_keeps_prior_batches() {
    let input = csv_input(&[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")]);
    let mut pipeline = Pipeline::new(options(2), ShortEmbedder { fail_on: 2, calls: AtomicUsize::new(0) });
    let (result, lines) = run(&mut pipeline, &input);

    let err = result.expect_err("second batch is short");
    assert!(matches!(err.root_cause(), Error::EmbeddingFailure(_)), "got {err:?}");
    let ctx = err.batch().expect("batch context");
    assert_eq!((ctx.index, ctx.size), (2, 2));
    assert_eq!(ctx.rows, vec![3, 4]);
    assert_eq!(ctx.text_lengths, vec![1, 1]);
    assert_eq!(pipeline.state(), RunState::BatchFailed);

    let ids: Vec<&str> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["1", "2"], "only batch 1 reached the output");
    assert_eq!(pipeline.embedder().calls.load(Ordering::SeqCst), 2, "no retry, no later batches");
}

#[test]
fn embedder_error_is_an_embedding_failure() {
    let input = csv_input(&[("1", "a")]);
    let mut pipeline = Pipeline::new(options(4), FailingEmbedder);
    let (result, lines) = run(&mut pipeline, &input);
    let err = result.unwrap_err();
    match err.root_cause() {
        Error::EmbeddingFailure(msg) => assert!(msg.contains("device lost"), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(lines.is_empty());
}

#[test]
fn empty_vectors_are_rejected() {
    let mut pipeline = Pipeline::new(options(4), EmptyVectorEmbedder);
    let (result, lines) = run(&mut pipeline, &csv_input(&[("1", "a")]));
    assert!(matches!(result.unwrap_err().root_cause(), Error::EmbeddingFailure(_)));
    assert!(lines.is_empty());
}

#[test]
fn non_finite_vectors_fail_serialization_without_partial_lines() {
    let input = csv_input(&[("1", "a"), ("2", "b")]);
    let mut pipeline = Pipeline::new(options(2), NanEmbedder);
    let (result, lines) = run(&mut pipeline, &input);
    assert!(matches!(result.unwrap_err().root_cause(), Error::SerializationFailure(_)));
    assert!(lines.is_empty());
}

#[test]
fn malformed_row_is_fatal() {
    let input = "id,full_text\n1,hello\n2,too,many,fields\n3,later\n";
    let mut pipeline = Pipeline::new(options(10), EchoEmbedder::default());
    assert_eq!(pipeline.state(), RunState::Idle);
    let (result, lines) = run(&mut pipeline, input);
    match result.unwrap_err() {
        Error::MalformedInput { row, .. } => assert_eq!(row, 2),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(pipeline.state(), RunState::BatchFailed, "a source error ends the run");
    assert!(lines.is_empty(), "pending records are not flushed");
    assert_eq!(pipeline.embedder().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn round_trip_keeps_fields_and_order() {
    let input = "user,full_text,lang\nann,\"hi, there\",en\nbob,bonjour,fr\n";
    let mut pipeline = Pipeline::new(options(8), FakeEmbedder::new(16));
    let source = RecordSource::from_reader(Cursor::new(input.as_bytes().to_vec()), b',').unwrap();
    let mut sink = JsonlSink::new(Vec::new());
    pipeline.run_with(source, &mut sink).unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();

    let first = text.lines().next().unwrap();
    assert!(first.starts_with(r#"{"user":"ann","full_text":"hi, there","lang":"en","full_text_vector":["#), "{first}");
    for line in text.lines() {
        let obj: serde_json::Map<String, Value> = serde_json::from_str(line).unwrap();
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["user", "full_text", "lang", "full_text_vector"]);
        let v: Vec<f32> = serde_json::from_value(obj["full_text_vector"].clone()).unwrap();
        assert_eq!(v.len(), 16);
    }
}

#[test]
fn custom_delimiter_and_fields() {
    let input = "id;body\n1;semi colon separated\n2;\n";
    let opts = PipelineOptions {
        text_field: "body".into(),
        vector_field: "embedding".into(),
        delimiter: b';',
        ..options(4)
    };
    let mut pipeline = Pipeline::new(opts, EchoEmbedder::default());
    let source = RecordSource::from_reader(Cursor::new(input.as_bytes().to_vec()), b';').unwrap();
    let mut sink = JsonlSink::new(Vec::new());
    let summary = pipeline.run_with(source, &mut sink).unwrap();
    assert_eq!((summary.rows_read, summary.rows_processed, summary.rows_skipped), (2, 1, 1));
    let line: Value = serde_json::from_slice(sink.get_ref().split(|b| *b == b'\n').next().unwrap()).unwrap();
    assert_eq!(line["embedding"][0], 20.0);
    assert!(line.get("body_vector").is_none());
}

#[test]
fn empty_input_completes_without_embedding() {
    let mut pipeline = Pipeline::new(options(4), EchoEmbedder::default());
    let (result, lines) = run(&mut pipeline, "id,full_text\n");
    let summary = result.unwrap();
    assert_eq!(summary.rows_read, 0);
    assert_eq!(summary.batches, 0);
    assert!(lines.is_empty());
    assert_eq!(pipeline.embedder().calls.load(Ordering::SeqCst), 0);
}

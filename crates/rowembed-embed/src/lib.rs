//! Sentence embedding backends for the conversion pipeline.
//!
//! `BertEmbedder` runs a BERT-family sentence-transformer (default
//! all-MiniLM-L6-v2) on candle with masked mean pooling and L2
//! normalization. `FakeEmbedder` produces deterministic hash-based vectors
//! and is selected with `APP_USE_FAKE_EMBEDDINGS=1`.
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use rowembed_core::config::ModelConfig;
use rowembed_core::traits::Embedder;
use rowembed_core::types::ComputeDevice;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::{compute_device, select_device};
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

/// Dimensionality of all-MiniLM-L6-v2, also used by the fake embedder.
pub const MINILM_DIM: usize = 384;

/// Paths to the three files a BERT checkpoint needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let weights = ["model.safetensors", "pytorch_model.bin"].iter().map(|f| dir.join(f)).find(|p| p.exists())
            .ok_or_else(|| anyhow!("No model.safetensors or pytorch_model.bin in {}", dir.display()))?;
        Ok(Self { config: dir.join("config.json"), tokenizer: dir.join("tokenizer.json"), weights })
    }

    pub fn from_hub(model_id: &str, revision: &str) -> Result<Self> {
        info!("Fetching '{}' ({}) from the hub", model_id, revision);
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string()));
        let config = repo.get("config.json")?;
        let tokenizer = repo.get("tokenizer.json")?;
        let weights = repo.get("model.safetensors").or_else(|_| {
            debug!("model.safetensors not found, trying pytorch_model.bin");
            repo.get("pytorch_model.bin")
        })?;
        Ok(Self { config, tokenizer, weights })
    }
}

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(config: &ModelConfig, device: Device) -> Result<Self> {
        let files = resolve_model_files(config)?;
        Self::from_files(&files, config.max_seq_len, device)
    }

    pub fn from_files(files: &ModelFiles, max_seq_len: usize, device: Device) -> Result<Self> {
        info!("Loading tokenizer from {}", files.tokenizer.display());
        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", files.tokenizer.display(), e))?;
        // Padding and truncation are applied per batch against `max_seq_len`.
        tokenizer.with_padding(None);
        tokenizer.with_truncation(None).map_err(|e| anyhow!("Failed to reset tokenizer truncation: {}", e))?;

        let raw = std::fs::read_to_string(&files.config).with_context(|| format!("reading {}", files.config.display()))?;
        let model_config: BertConfig = serde_json::from_str(&raw).context("parsing BERT config")?;
        let meta: serde_json::Value = serde_json::from_str(&raw)?;
        let dim = meta.get("hidden_size").and_then(serde_json::Value::as_u64).ok_or_else(|| anyhow!("config.json has no hidden_size"))?;
        let positions = meta.get("max_position_embeddings").and_then(serde_json::Value::as_u64).unwrap_or(512);
        let dim = usize::try_from(dim)?;
        let max_len = max_seq_len.min(usize::try_from(positions)?);

        info!("Loading model weights from {}", files.weights.display());
        let is_safetensors = files.weights.extension().is_some_and(|e| e == "safetensors");
        let vb = if is_safetensors {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights.clone()], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(&files.weights, DTYPE, &device)?
        };
        let model = BertModel::load(vb, &model_config)?;
        info!("Model loaded: max sequence length {}, embedding dimension {}", max_len, dim);
        Ok(Self { model, tokenizer, device, dim, max_len })
    }
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, token_type_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_dtype(DType::F32)?.to_device(&Device::Cpu)?.to_vec2()?;
        debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(out)
    }
}

/// Deterministic bag-of-tokens hashing embedder, L2-normalized.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        if v.is_empty() { return v; }
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            #[allow(clippy::cast_precision_loss)]
            let val = ((h >> 32) as f32) / (u32::MAX as f32);
            #[allow(clippy::cast_precision_loss)]
            let jitter = (i % 3) as f32 * 0.01;
            v[idx] += val + jitter;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_text(t)).collect()) }
}

pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Load the configured embedder and report the device it runs on.
pub fn load_embedder(config: &ModelConfig) -> Result<(Box<dyn Embedder>, ComputeDevice)> {
    if fake_embeddings_requested() {
        warn!("Using FakeEmbedder (APP_USE_FAKE_EMBEDDINGS); vectors carry no semantics");
        return Ok((Box::new(FakeEmbedder::new(MINILM_DIM)), ComputeDevice::Cpu));
    }
    let device = select_device(config.device);
    let kind = compute_device(&device);
    info!("Loading model '{}'", config.id);
    let embedder = BertEmbedder::load(config, device)?;
    Ok((Box::new(embedder), kind))
}

/// Local directory first (config, then `APP_MODEL_DIR`/`MODEL_DIR`), hub otherwise.
fn resolve_model_files(config: &ModelConfig) -> Result<ModelFiles> {
    let local = config.dir.clone().or_else(|| std::env::var("APP_MODEL_DIR").ok()).or_else(|| std::env::var("MODEL_DIR").ok());
    if let Some(dir) = local {
        let p = rowembed_core::config::expand_path(&dir);
        if p.exists() { info!("Using model dir: {}", p.display()); return ModelFiles::from_dir(&p); }
        warn!("Model dir {} does not exist, falling back to the hub", p.display());
    }
    ModelFiles::from_hub(&config.id, &config.revision)
}

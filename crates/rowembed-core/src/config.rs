//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys split on `__`, e.g. `APP_MODEL__ID`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_TEXT_FIELD: &str = "full_text";
pub const DEFAULT_BATCH_SIZE: usize = 256;
pub const DEFAULT_ENCODE_BATCH_SIZE: usize = 32;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Layers for the environment named by `RUST_ENV` (default `dev`).
    pub fn load() -> Self {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Self {
        let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the typed pipeline settings.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let config: PipelineConfig = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is compiled in and present.
    #[default]
    Auto,
    Cpu,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub identifier, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub id: String,
    pub revision: String,
    /// Local directory with `config.json`, `tokenizer.json` and weights.
    /// Takes precedence over the hub download.
    pub dir: Option<String>,
    pub max_seq_len: usize,
    pub device: DevicePreference,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            dir: None,
            max_seq_len: 256,
            device: DevicePreference::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_path: String,
    pub output_path: String,
    pub text_field: String,
    /// Name of the added field; `<text_field>_vector` when unset.
    pub vector_field: Option<String>,
    /// Records per embedding invocation and per output flush.
    pub batch_size: usize,
    /// Sub-chunk size handed to the model within one batch.
    pub encode_batch_size: usize,
    pub max_text_chars: usize,
    pub delimiter: char,
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: "post.csv".to_string(),
            output_path: "posts_with_vectors.jsonl".to_string(),
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            vector_field: None,
            batch_size: DEFAULT_BATCH_SIZE,
            encode_batch_size: DEFAULT_ENCODE_BATCH_SIZE,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            delimiter: ',',
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.text_field.trim().is_empty() { return Err(Error::InvalidConfig("text_field must not be empty".into())); }
        if self.batch_size == 0 { return Err(Error::InvalidConfig("batch_size must be at least 1".into())); }
        if self.encode_batch_size == 0 { return Err(Error::InvalidConfig("encode_batch_size must be at least 1".into())); }
        if self.max_text_chars == 0 { return Err(Error::InvalidConfig("max_text_chars must be at least 1".into())); }
        if self.model.max_seq_len == 0 { return Err(Error::InvalidConfig("model.max_seq_len must be at least 1".into())); }
        if !self.delimiter.is_ascii() {
            return Err(Error::InvalidConfig(format!("delimiter must be a single ASCII character, got {:?}", self.delimiter)));
        }
        if self.vector_field() == self.text_field {
            return Err(Error::InvalidConfig(format!("vector_field must differ from text_field ({})", self.text_field)));
        }
        Ok(())
    }

    pub fn vector_field(&self) -> String {
        self.vector_field.clone().unwrap_or_else(|| format!("{}_vector", self.text_field))
    }

    /// Only meaningful after `validate` has accepted the delimiter.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }

    pub fn input_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.input_path) }

    pub fn output_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.output_path) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

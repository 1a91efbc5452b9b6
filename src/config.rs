//! Layered configuration: defaults, optional TOML file, then environment
//!
//! Environment overrides use the `DOCS_SUMMARIZER__SECTION__KEY` form, e.g.
//! `DOCS_SUMMARIZER__RAG__TOP_K=3`. A `.env` file is loaded first if present.

use crate::error::{PipelineError, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DOCS_SUMMARIZER";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model provider table and client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base backoff between retries in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: default_provider(),
        url: "https://api.openai.com/v1".to_string(),
        api_key_env: Some("OPENAI_API_KEY".to_string()),
        models: vec![
            ModelConfig {
                name: "gpt-4".to_string(),
                context_window_size: 8192,
                response_token_limit: 512,
            },
            ModelConfig {
                name: "gpt-3.5-turbo".to_string(),
                context_window_size: 4096,
                response_token_limit: 512,
            },
        ],
    }]
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            providers: default_providers(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// One model provider (an OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    /// Base URL, e.g. `https://api.openai.com/v1`
    pub url: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<SecretString> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().map(SecretString::new)
    }
}

/// Window sizes for a single model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub context_window_size: usize,
    pub response_token_limit: usize,
}

/// Retrieval and budgeting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Passages requested from the index per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_minimum_context_limit")]
    pub minimum_context_limit: usize,

    /// Passages scoring below this end the context
    #[serde(default)]
    pub similarity_cutoff: Option<f32>,

    #[serde(default)]
    pub vector_db: Option<VectorDbConfig>,

    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
}

fn default_top_k() -> usize {
    1
}

fn default_minimum_context_limit() -> usize {
    crate::context::DEFAULT_MINIMUM_CONTEXT_LIMIT
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            minimum_context_limit: default_minimum_context_limit(),
            similarity_cutoff: None,
            vector_db: None,
            embedding: None,
        }
    }
}

/// Qdrant collection holding the document chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    #[serde(default = "default_vector_db_url")]
    pub url: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Payload field with the chunk text
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Payload field with the document reference
    #[serde(default = "default_source_field")]
    pub source_field: String,

    #[serde(default)]
    pub score_threshold: Option<f32>,
}

fn default_vector_db_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection_name() -> String {
    "product_docs".to_string()
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_source_field() -> String {
    "docs_url".to_string()
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            url: default_vector_db_url(),
            collection_name: default_collection_name(),
            text_field: default_text_field(),
            source_field: default_source_field(),
            score_threshold: None,
        }
    }
}

/// Query embedding endpoint (OpenAI-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_endpoint() -> String {
    "http://localhost:8080/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "BAAI/bge-base-en-v1.5".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key_env: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Option<SecretString> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().map(SecretString::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    crate::context::DEFAULT_ENCODING.to_string()
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(env_source())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            "Configuration loaded: {} providers, default {}/{}",
            config.llm.providers.len(),
            config.llm.default_provider,
            config.llm.default_model
        );
        Ok(config)
    }

    /// Load from a TOML file with environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Parse TOML text, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that every model has usable window sizes
    pub fn validate(&self) -> Result<()> {
        if self.rag.top_k == 0 {
            return Err(PipelineError::configuration("rag.top_k must be positive"));
        }

        for provider in &self.llm.providers {
            if provider.name.is_empty() {
                return Err(PipelineError::configuration("provider name must not be empty"));
            }
            for model in &provider.models {
                if model.context_window_size == 0 || model.response_token_limit == 0 {
                    return Err(PipelineError::configuration(format!(
                        "{}/{}: window sizes must be positive",
                        provider.name, model.name
                    )));
                }
                if model.response_token_limit >= model.context_window_size {
                    return Err(PipelineError::configuration(format!(
                        "{}/{}: response token limit {} must be below context window {}",
                        provider.name,
                        model.name,
                        model.response_token_limit,
                        model.context_window_size
                    )));
                }
            }
        }

        Ok(())
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Window sizes for a (provider, model) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub context_window_size: usize,
    pub response_token_limit: usize,
}

/// Read-only lookup of model window sizes
pub trait ModelLimitsProvider: Send + Sync {
    fn model_limits(&self, provider: &str, model: &str) -> Result<ModelLimits>;
}

impl ModelLimitsProvider for Config {
    fn model_limits(&self, provider: &str, model: &str) -> Result<ModelLimits> {
        let provider_config = self
            .llm
            .provider(provider)
            .ok_or_else(|| {
                PipelineError::configuration(format!("unknown provider: {}", provider))
            })?;

        let model_config = provider_config.model(model).ok_or_else(|| {
            PipelineError::configuration(format!(
                "no window configuration for model {} of provider {}",
                model, provider
            ))
        })?;

        Ok(ModelLimits {
            context_window_size: model_config.context_window_size,
            response_token_limit: model_config.response_token_limit,
        })
    }
}

/// Process-wide configuration that can be reloaded.
///
/// Readers take an `Arc` snapshot; a reload replaces the whole snapshot, so
/// in-flight requests keep the configuration they started with.
pub struct SharedConfig {
    current: RwLock<Arc<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and install a new configuration, returning the previous one
    pub fn swap(&self, config: Config) -> Result<Arc<Config>> {
        config.validate()?;
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, Arc::new(config));
        info!("Configuration reloaded");
        Ok(previous)
    }
}

impl ModelLimitsProvider for SharedConfig {
    fn model_limits(&self, provider: &str, model: &str) -> Result<ModelLimits> {
        self.snapshot().model_limits(provider, model)
    }
}

//! Token counting using tiktoken

use crate::error::{PipelineError, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Encoding used when a model has no known tokenizer
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Tokenizer trait for different tokenization strategies
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token ids
    fn tokens(&self, text: &str) -> Vec<usize>;

    /// Number of tokens in the given text
    fn token_count(&self, text: &str) -> usize {
        self.tokens(text).len()
    }

    /// Count tokens for multiple texts
    fn token_count_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.token_count(t)).collect()
    }

    /// Name of the encoding, for logs
    fn name(&self) -> &str;
}

/// Tiktoken-based tokenizer (cl100k_base by default)
#[derive(Clone)]
pub struct TiktokenTokenizer {
    bpe: Arc<CoreBPE>,
    encoding: String,
}

impl TiktokenTokenizer {
    /// Create a tokenizer for a named encoding
    pub fn from_encoding(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(PipelineError::configuration(format!(
                    "unsupported encoding: {}",
                    other
                )))
            }
        }
        .map_err(|e| {
            PipelineError::configuration(format!("failed to load encoding {}: {}", encoding, e))
        })?;

        Ok(Self {
            bpe: Arc::new(bpe),
            encoding: encoding.to_string(),
        })
    }

    /// Create a tokenizer with the encoding tiktoken associates with a model
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            PipelineError::configuration(format!("no tokenizer for model {}: {}", model, e))
        })?;

        Ok(Self {
            bpe: Arc::new(bpe),
            encoding: format!("model:{}", model),
        })
    }

    /// Like [`TiktokenTokenizer::for_model`], falling back to the default encoding
    pub fn for_model_or_default(model: &str) -> Result<Self> {
        Self::for_model(model).or_else(|e| {
            warn!("{}, falling back to {}", e, DEFAULT_ENCODING);
            Self::from_encoding(DEFAULT_ENCODING)
        })
    }

    /// Create with default encoding (cl100k_base)
    pub fn cl100k() -> Result<Self> {
        Self::from_encoding(DEFAULT_ENCODING)
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn tokens(&self, text: &str) -> Vec<usize> {
        if text.is_empty() {
            return Vec::new();
        }
        self.bpe.encode_with_special_tokens(text)
    }

    fn name(&self) -> &str {
        &self.encoding
    }
}

/// One token per whitespace-delimited word.
///
/// Needs no vocabulary, so it is always available; ids are an FNV-1a hash of
/// the word and therefore stable across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    fn word_id(word: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash as usize
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokens(&self, text: &str) -> Vec<usize> {
        text.split_whitespace().map(Self::word_id).collect()
    }

    fn token_count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

//! Configuration loading from files and the environment

use docs_summarizer::{Config, ModelLimits, ModelLimitsProvider, PipelineError, SharedConfig};
use std::path::PathBuf;

const CONFIG: &str = r#"
[llm]
default_provider = "local"
default_model = "granite-13b"
max_retries = 1

[[llm.providers]]
name = "local"
url = "http://localhost:8000/v1"
api_key_env = "LOCAL_LLM_KEY"

[[llm.providers.models]]
name = "granite-13b"
context_window_size = 8000
response_token_limit = 500

[rag]
top_k = 3
minimum_context_limit = 3

[rag.vector_db]
url = "http://qdrant:6334"
collection_name = "ocp_docs"

[logging]
level = "debug"
json = true
"#;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_from_file() {
    let path = write_config("docs-summarizer-file", CONFIG);
    let config = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.llm.default_provider, "local");
    assert_eq!(config.llm.max_retries, 1);
    assert_eq!(config.rag.minimum_context_limit, 3);
    assert!(config.logging.json);

    let vector_db = config.rag.vector_db.unwrap();
    assert_eq!(vector_db.collection_name, "ocp_docs");
    assert_eq!(vector_db.text_field, "text");
}

#[test]
fn test_environment_overrides_file() {
    std::env::set_var("DOCS_SUMMARIZER__TOKENIZER__ENCODING", "p50k_base");
    let path = write_config("docs-summarizer-env", CONFIG);
    let config = Config::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).ok();
    std::env::remove_var("DOCS_SUMMARIZER__TOKENIZER__ENCODING");

    assert_eq!(config.tokenizer.encoding, "p50k_base");
    assert_eq!(config.rag.top_k, 3);
}

#[test]
fn test_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("docs-summarizer-does-not-exist.toml");
    assert!(matches!(
        Config::from_file(&path),
        Err(PipelineError::Configuration(_))
    ));
}

#[test]
fn test_limits_from_loaded_config() {
    let shared = SharedConfig::new(Config::from_toml_str(CONFIG).unwrap()).unwrap();

    assert_eq!(
        shared.model_limits("local", "granite-13b").unwrap(),
        ModelLimits {
            context_window_size: 8000,
            response_token_limit: 500,
        }
    );
    assert!(shared.model_limits("openai", "gpt-4").is_err());
}

#[test]
fn test_response_limit_must_fit_window() {
    let invalid = CONFIG.replace("response_token_limit = 500", "response_token_limit = 8000");
    assert!(Config::from_toml_str(&invalid).is_err());
}

//! Metrics collection for observability

use crate::context::BudgetedContext;
use crate::llm::TokenUsage;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Histogram, IntCounter, IntCounterVec, Opts, Registry,
};
use std::sync::Arc;
use tracing::debug;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Model call metrics
    pub llm_calls: IntCounterVec,
    pub llm_tokens_sent: IntCounterVec,
    pub llm_tokens_received: IntCounterVec,

    // Context budget metrics
    pub context_tokens: Histogram,
    pub context_passages: IntCounterVec,
    pub empty_contexts: IntCounter,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let llm_calls = register_int_counter_vec_with_registry!(
            Opts::new("llm_calls_total", "Total model calls"),
            &["provider", "model", "status"],
            registry
        )?;

        let llm_tokens_sent = register_int_counter_vec_with_registry!(
            Opts::new("llm_token_sent_total", "Prompt tokens sent to the model"),
            &["provider", "model"],
            registry
        )?;

        let llm_tokens_received = register_int_counter_vec_with_registry!(
            Opts::new("llm_token_received_total", "Completion tokens received from the model"),
            &["provider", "model"],
            registry
        )?;

        let context_tokens = register_histogram_with_registry!(
            "rag_context_tokens",
            "Retrieved-context tokens admitted per request",
            registry
        )?;

        let context_passages = register_int_counter_vec_with_registry!(
            Opts::new("rag_context_passages_total", "Retrieved passages by budgeting outcome"),
            &["outcome"],
            registry
        )?;

        let empty_contexts = register_int_counter_with_registry!(
            Opts::new("rag_empty_context_total", "Requests answered without reference content"),
            registry
        )?;

        Ok(Self {
            registry,
            llm_calls,
            llm_tokens_sent,
            llm_tokens_received,
            context_tokens,
            context_passages,
            empty_contexts,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record how a request's context was assembled
    pub fn record_context_budget(&self, context: &BudgetedContext) {
        self.context_tokens.observe(context.tokens_used as f64);

        let truncated = u64::from(context.truncated);
        let whole = context.passages.len() as u64 - truncated;
        self.context_passages.with_label_values(&["whole"]).inc_by(whole);
        self.context_passages.with_label_values(&["truncated"]).inc_by(truncated);
        self.context_passages
            .with_label_values(&["skipped"])
            .inc_by(context.skipped as u64);
    }

    /// Record a response produced without reference content
    pub fn record_empty_context(&self) {
        self.empty_contexts.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Scoped recorder around one model call.
///
/// Created before the call; counters are updated when it is dropped, so
/// errors, early returns and cancelled futures are all recorded. Calls that
/// never reach [`TokenUsageRecorder::record_success`] count as errors with the
/// estimated prompt tokens as sent.
pub struct TokenUsageRecorder {
    metrics: Arc<Metrics>,
    provider: String,
    model: String,
    estimated_prompt_tokens: usize,
    usage: Option<TokenUsage>,
}

impl TokenUsageRecorder {
    pub fn start(
        metrics: Arc<Metrics>,
        provider: &str,
        model: &str,
        estimated_prompt_tokens: usize,
    ) -> Self {
        Self {
            metrics,
            provider: provider.to_string(),
            model: model.to_string(),
            estimated_prompt_tokens,
            usage: None,
        }
    }

    pub fn record_success(&mut self, usage: TokenUsage) {
        self.usage = Some(usage);
    }
}

impl Drop for TokenUsageRecorder {
    fn drop(&mut self) {
        let labels = [self.provider.as_str(), self.model.as_str()];
        let (status, sent, received) = match &self.usage {
            Some(usage) => ("success", usage.prompt_tokens, usage.completion_tokens),
            None => ("error", self.estimated_prompt_tokens, 0),
        };

        self.metrics
            .llm_calls
            .with_label_values(&[labels[0], labels[1], status])
            .inc();
        self.metrics
            .llm_tokens_sent
            .with_label_values(&labels)
            .inc_by(sent as u64);
        self.metrics
            .llm_tokens_received
            .with_label_values(&labels)
            .inc_by(received as u64);

        debug!(
            "Model call {}/{} finished with {}: {} tokens sent, {} received",
            self.provider, self.model, status, sent, received
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BudgetedPassage;

    fn counter(vec: &IntCounterVec, labels: &[&str]) -> u64 {
        vec.with_label_values(labels).get()
    }

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_recorder_success() {
        let metrics = Arc::new(Metrics::new().unwrap());
        {
            let mut recorder = TokenUsageRecorder::start(metrics.clone(), "openai", "gpt-4", 120);
            recorder.record_success(TokenUsage {
                prompt_tokens: 118,
                completion_tokens: 42,
            });
        }

        assert_eq!(counter(&metrics.llm_calls, &["openai", "gpt-4", "success"]), 1);
        assert_eq!(counter(&metrics.llm_calls, &["openai", "gpt-4", "error"]), 0);
        assert_eq!(counter(&metrics.llm_tokens_sent, &["openai", "gpt-4"]), 118);
        assert_eq!(counter(&metrics.llm_tokens_received, &["openai", "gpt-4"]), 42);
    }

    #[test]
    fn test_recorder_records_on_failure_path() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let failing = || -> Result<(), String> {
            let _recorder = TokenUsageRecorder::start(metrics.clone(), "openai", "gpt-4", 75);
            Err("upstream unavailable".to_string())
        };
        assert!(failing().is_err());

        assert_eq!(counter(&metrics.llm_calls, &["openai", "gpt-4", "error"]), 1);
        assert_eq!(counter(&metrics.llm_tokens_sent, &["openai", "gpt-4"]), 75);
        assert_eq!(counter(&metrics.llm_tokens_received, &["openai", "gpt-4"]), 0);
    }

    #[test]
    fn test_record_context_budget() {
        let metrics = Metrics::new().unwrap();
        let context = BudgetedContext {
            passages: vec![
                BudgetedPassage {
                    text: "a".into(),
                    source_id: "doc1".into(),
                },
                BudgetedPassage {
                    text: "b".into(),
                    source_id: "doc2".into(),
                },
            ],
            tokens_used: 7,
            remaining: 0,
            truncated: true,
            skipped: 1,
        };
        metrics.record_context_budget(&context);

        assert_eq!(counter(&metrics.context_passages, &["whole"]), 1);
        assert_eq!(counter(&metrics.context_passages, &["truncated"]), 1);
        assert_eq!(counter(&metrics.context_passages, &["skipped"]), 1);
        assert_eq!(metrics.context_tokens.get_sample_count(), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = Metrics::new().unwrap();
        metrics.record_empty_context();
        let exported = metrics.export_prometheus();
        assert!(exported.contains("rag_empty_context_total 1"));
    }
}

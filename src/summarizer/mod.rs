//! Documentation summarizer: retrieval, context budgeting and generation
//!
//! One `summarize` call runs the whole chain for a query:
//! retrieve -> budget -> format -> model call. Dropping the returned future
//! cancels whichever collaborator call is in flight.

use crate::config::{Config, ModelLimits, ModelLimitsProvider, RagConfig, SharedConfig};
use crate::context::{BudgetedContext, ContextBudgeter, TiktokenTokenizer, TokenBudget, Tokenizer};
use crate::error::Result;
use crate::llm::{ChatModel, ChatModelConfig, OpenAiChatModel, PromptTemplate, TokenUsage};
use crate::metrics::{Metrics, TokenUsageRecorder, METRICS};
use crate::retrieval::Retriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prepended to answers produced without retrieved content
pub const NO_REFERENCE_DISCLAIMER: &str =
    "The following response was generated without access to reference content:\n\n";

/// Per-call options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizeOptions {
    /// Log the fully rendered prompt
    #[serde(default)]
    pub verbose: bool,
}

/// Answer plus the documents it was grounded in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub response: String,
    /// In context order; a document contributing several passages appears once per passage
    pub referenced_documents: Vec<String>,
    /// Conversation history is never truncated yet, so this is always false
    pub history_truncated: bool,
}

/// Retrieval-augmented summarizer bound to one provider/model
pub struct DocsSummarizer {
    provider: String,
    model: String,
    llm: Arc<dyn ChatModel>,
    limits: Arc<dyn ModelLimitsProvider>,
    budgeter: ContextBudgeter,
    top_k: usize,
    metrics: Arc<Metrics>,
}

impl DocsSummarizer {
    /// Create a summarizer with default retrieval settings
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        llm: Arc<dyn ChatModel>,
        limits: Arc<dyn ModelLimitsProvider>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let rag = RagConfig::default();
        Self {
            provider: provider.into(),
            model: model.into(),
            llm,
            limits,
            budgeter: ContextBudgeter::new(tokenizer)
                .with_minimum_context_limit(rag.minimum_context_limit)
                .with_similarity_cutoff(rag.similarity_cutoff),
            top_k: rag.top_k,
            metrics: METRICS.clone(),
        }
    }

    /// Wire everything from configuration: tokenizer, OpenAI-compatible model
    /// and retrieval settings. `None` selects the configured defaults.
    pub fn from_config(
        shared: Arc<SharedConfig>,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Self> {
        let config: Arc<Config> = shared.snapshot();
        let provider = provider.unwrap_or(config.llm.default_provider.as_str()).to_string();
        let model = model.unwrap_or(config.llm.default_model.as_str()).to_string();

        // fail fast on an unknown provider/model
        shared.model_limits(&provider, &model)?;

        let tokenizer = Arc::new(TiktokenTokenizer::from_encoding(&config.tokenizer.encoding)?);
        let chat_config = ChatModelConfig::from_config(&config, &provider, &model)?;
        let llm = Arc::new(OpenAiChatModel::new(chat_config, PromptTemplate::default())?);

        info!("Summarizer ready for {}/{} ({})", provider, model, tokenizer.name());

        Ok(Self::new(provider, model, llm, shared, tokenizer).with_rag_config(&config.rag))
    }

    pub fn with_rag_config(mut self, rag: &RagConfig) -> Self {
        self.budgeter = self
            .budgeter
            .with_minimum_context_limit(rag.minimum_context_limit)
            .with_similarity_cutoff(rag.similarity_cutoff);
        self.top_k = rag.top_k;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `query`, grounded in passages from `vector_index` when one is given
    pub async fn summarize(
        &self,
        conversation_id: &str,
        query: &str,
        vector_index: Option<&dyn Retriever>,
        history: Option<&str>,
        options: &SummarizeOptions,
    ) -> Result<SummaryResult> {
        info!(
            "{} call settings: query: {}, provider: {}, model: {}, verbose: {}",
            conversation_id, query, self.provider, self.model, options.verbose
        );
        if let Some(history) = history {
            debug!(
                "{} history of {} bytes is not added to the prompt",
                conversation_id,
                history.len()
            );
        }

        let limits = self.limits.model_limits(&self.provider, &self.model)?;
        info!(
            "context_window_size: {}, response_token_limit: {}",
            limits.context_window_size, limits.response_token_limit
        );

        let context = match vector_index {
            Some(index) => self.rag_context(index, query, limits).await?,
            None => {
                warn!("Proceeding without RAG content. Check start up messages.");
                BudgetedContext::default()
            }
        };

        let (rag_context, referenced_documents) = context.format();
        let template = self.llm.prompt_template();
        let prompt = template.render(&rag_context, query);
        let tokenizer = self.budgeter.tokenizer();
        let prompt_tokens = tokenizer.token_count(&prompt);

        if options.verbose {
            info!("{} prompt ({} tokens):\n{}", conversation_id, prompt_tokens, prompt);
        }

        let completion = {
            let mut recorder = TokenUsageRecorder::start(
                self.metrics.clone(),
                &self.provider,
                &self.model,
                prompt_tokens,
            );
            let completion = self.llm.invoke(&rag_context, query).await?;
            recorder.record_success(completion.usage.unwrap_or_else(|| TokenUsage {
                prompt_tokens,
                completion_tokens: tokenizer.token_count(&completion.text),
            }));
            completion
        };

        let mut response = completion.text;
        if rag_context.is_empty() {
            info!("Using llm to answer the query without reference content");
            self.metrics.record_empty_context();
            response = format!("{}{}", NO_REFERENCE_DISCLAIMER, response);
        }

        info!("{} Summary response: {}", conversation_id, response);
        info!("{} Referenced documents: {:?}", conversation_id, referenced_documents);

        Ok(SummaryResult {
            response,
            referenced_documents,
            history_truncated: false,
        })
    }

    /// Retrieve and fit passages into what the window leaves for context
    async fn rag_context(
        &self,
        index: &dyn Retriever,
        query: &str,
        limits: ModelLimits,
    ) -> Result<BudgetedContext> {
        let passages = index.retrieve(query, self.top_k).await?;

        let interim_prompt = self.llm.prompt_template().render("", query);
        let prompt_overhead = self.budgeter.tokenizer().token_count(&interim_prompt);
        let budget = TokenBudget::compute(
            limits.context_window_size,
            limits.response_token_limit,
            prompt_overhead,
        );
        debug!(
            "Prompt overhead {} tokens, {} tokens available for {} passages",
            prompt_overhead,
            budget.tokens(),
            passages.len()
        );

        let context = self.budgeter.fit(&passages, budget);
        self.metrics.record_context_budget(&context);
        info!(
            "Context: {} passages, {} tokens, truncated: {}",
            context.passages.len(),
            context.tokens_used,
            context.truncated
        );

        Ok(context)
    }
}

//! Prompt template with `{context}` and `{query}` slots

use crate::error::{PipelineError, Result};

pub const DEFAULT_CHAT_PROMPT: &str = "Instructions:
- You are a helpful assistant.
- You are an expert in Kubernetes and OpenShift.
- Respond to questions about topics other than Kubernetes and OpenShift with: \"I can only answer questions about Kubernetes and OpenShift\"
- Refuse to participate in anything that could harm a human.
- Provide the user with a concise answer based on the context below.
- If the context does not contain the answer, say so rather than guessing.

Context:
{context}

Question:
{query}

Response:
";

/// Prompt rendered once per model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Both `{context}` and `{query}` must appear in `template`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in ["{context}", "{query}"] {
            if !template.contains(slot) {
                return Err(PipelineError::configuration(format!(
                    "prompt template is missing {}",
                    slot
                )));
            }
        }
        Ok(Self { template })
    }

    /// Fill both slots in a single pass, so braces inside the context or
    /// query are never re-expanded
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{query}") {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_CHAT_PROMPT.to_string(),
        }
    }
}

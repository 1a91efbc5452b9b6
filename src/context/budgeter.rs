//! Greedy, rank-ordered context budgeting
//!
//! Passages arrive sorted by descending relevance. Each is admitted whole while
//! it fits; the first one that does not fit is cut down to the longest
//! whole-word prefix that does, and emission stops there. If the remaining
//! budget is below the minimum context limit, nothing more is emitted.

use super::models::{BudgetedContext, BudgetedPassage, RetrievedPassage, TokenBudget};
use super::tokenizer::Tokenizer;
use std::sync::Arc;
use tracing::{debug, info};

/// Smallest remaining budget still worth filling with a truncated passage
pub const DEFAULT_MINIMUM_CONTEXT_LIMIT: usize = 1;

/// Fits ranked passages into a token budget
#[derive(Clone)]
pub struct ContextBudgeter {
    tokenizer: Arc<dyn Tokenizer>,
    minimum_context_limit: usize,
    similarity_cutoff: Option<f32>,
}

impl ContextBudgeter {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            minimum_context_limit: DEFAULT_MINIMUM_CONTEXT_LIMIT,
            similarity_cutoff: None,
        }
    }

    pub fn with_minimum_context_limit(mut self, limit: usize) -> Self {
        self.minimum_context_limit = limit;
        self
    }

    /// Stop at the first passage scoring below `cutoff`
    pub fn with_similarity_cutoff(mut self, cutoff: Option<f32>) -> Self {
        self.similarity_cutoff = cutoff;
        self
    }

    pub fn minimum_context_limit(&self) -> usize {
        self.minimum_context_limit
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Select and truncate passages so their total token count fits `budget`
    pub fn fit(&self, passages: &[RetrievedPassage], budget: TokenBudget) -> BudgetedContext {
        let mut context = BudgetedContext {
            skipped: passages.len(),
            ..Default::default()
        };

        if budget.is_exhausted() || passages.is_empty() {
            debug!(
                "Nothing to budget: {} passages, budget {}",
                passages.len(),
                budget.tokens()
            );
            return context;
        }

        let mut remaining = budget.available();

        for passage in passages {
            if let Some(cutoff) = self.similarity_cutoff {
                if passage.relevance_score < cutoff {
                    debug!(
                        "Passage from {} scored {} below cutoff {}, stopping",
                        passage.source_id, passage.relevance_score, cutoff
                    );
                    break;
                }
            }

            let cost = self.tokenizer.token_count(&passage.text);
            debug!(
                "Passage from {}: {} tokens, {} remaining",
                passage.source_id, cost, remaining
            );

            if cost <= remaining {
                context.passages.push(BudgetedPassage::from(passage));
                context.tokens_used += cost;
                remaining -= cost;
                continue;
            }

            if remaining < self.minimum_context_limit {
                debug!(
                    "Remaining budget {} below minimum context limit {}, stopping",
                    remaining, self.minimum_context_limit
                );
                break;
            }

            if let Some((text, used)) = self.truncate_to_fit(&passage.text, remaining) {
                info!(
                    "Truncated passage from {} to {} of {} tokens",
                    passage.source_id, used, cost
                );
                context.passages.push(BudgetedPassage {
                    text,
                    source_id: passage.source_id.clone(),
                });
                context.tokens_used += used;
                context.truncated = true;
            }
            remaining = 0;
            break;
        }

        context.remaining = remaining;
        context.skipped = passages.len() - context.passages.len();
        context
    }

    /// Longest whole-word prefix of `text` costing at most `limit` tokens.
    ///
    /// Subword tokenizers are not linear in word count, so each candidate
    /// prefix is re-counted. The prefix is a slice of the original text.
    fn truncate_to_fit(&self, text: &str, limit: usize) -> Option<(String, usize)> {
        let mut best: Option<(usize, usize)> = None;

        for end in word_ends(text) {
            let cost = self.tokenizer.token_count(&text[..end]);
            if cost > limit {
                break;
            }
            best = Some((end, cost));
        }

        best.map(|(end, cost)| (text[..end].to_string(), cost))
    }
}

/// Byte offsets just past each whitespace-delimited word
fn word_ends(text: &str) -> impl Iterator<Item = usize> + '_ {
    let mut in_word = false;
    text.char_indices()
        .filter_map(move |(idx, ch)| {
            let was_in_word = in_word;
            in_word = !ch.is_whitespace();
            (was_in_word && !in_word).then_some(idx)
        })
        .chain(
            text.chars()
                .next_back()
                .filter(|ch| !ch.is_whitespace())
                .map(|_| text.len()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tokenizer::{TiktokenTokenizer, WhitespaceTokenizer};

    fn passages(texts: &[&str]) -> Vec<RetrievedPassage> {
        texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                RetrievedPassage::new(
                    *text,
                    0.9 - idx as f32 * 0.1,
                    format!("data/doc{}.pdf", idx + 1),
                )
            })
            .collect()
    }

    fn five_word_passages(n: usize) -> Vec<RetrievedPassage> {
        let texts = [
            "a text text text text",
            "b text text text text",
            "c text text text text",
            "d text text text text",
        ];
        passages(&texts[..n])
    }

    fn budgeter() -> ContextBudgeter {
        ContextBudgeter::new(Arc::new(WhitespaceTokenizer))
    }

    fn total_tokens(budgeter: &ContextBudgeter, context: &BudgetedContext) -> usize {
        context
            .passages
            .iter()
            .map(|p| budgeter.tokenizer().token_count(&p.text))
            .sum()
    }

    #[test]
    fn test_word_ends() {
        assert_eq!(word_ends("ab cd  e").collect::<Vec<_>>(), vec![2, 5, 8]);
        assert_eq!(word_ends("  lead trail  ").collect::<Vec<_>>(), vec![6, 12]);
        assert_eq!(word_ends("").count(), 0);
        assert_eq!(word_ends("naïve café").collect::<Vec<_>>(), vec![6, 12]);
    }

    #[test]
    fn test_everything_fits_unmodified() {
        let budgeter = budgeter();
        let input = five_word_passages(3);
        let context = budgeter.fit(&input, TokenBudget::new(500));

        assert_eq!(context.passages.len(), 3);
        for (out, original) in context.passages.iter().zip(&input) {
            assert_eq!(out.text, original.text);
            assert_eq!(out.source_id, original.source_id);
        }
        assert!(!context.truncated);
        assert_eq!(context.tokens_used, 15);
        assert_eq!(context.remaining, 485);
        assert_eq!(context.skipped, 0);
    }

    #[test]
    fn test_stops_when_remaining_below_minimum() {
        let budgeter = budgeter().with_minimum_context_limit(3);
        let context = budgeter.fit(&five_word_passages(3), TokenBudget::new(7));

        assert_eq!(context.passages.len(), 1);
        assert_eq!(context.remaining, 2);
        assert_eq!(context.skipped, 2);
        assert!(!context.truncated);
    }

    #[test]
    fn test_two_whole_passages_then_stop() {
        let budgeter = budgeter().with_minimum_context_limit(3);
        let context = budgeter.fit(&five_word_passages(4), TokenBudget::new(12));

        assert_eq!(context.passages.len(), 2);
        assert_eq!(context.tokens_used, 10);
        assert!(!context.truncated);
    }

    #[test]
    fn test_truncates_on_word_boundary_then_stops() {
        let budgeter = budgeter();
        let input = five_word_passages(3);
        let context = budgeter.fit(&input, TokenBudget::new(7));

        assert_eq!(context.passages.len(), 2);
        assert_eq!(context.passages[1].text, "b text");
        assert_eq!(
            context.passages[1].text.split_whitespace().collect::<Vec<_>>(),
            input[1].text.split_whitespace().take(2).collect::<Vec<_>>()
        );
        assert!(context.truncated);
        assert_eq!(context.tokens_used, 7);
        assert_eq!(context.remaining, 0);
        assert_eq!(context.skipped, 1);
    }

    #[test]
    fn test_exact_fit_stops_cleanly() {
        let budgeter = budgeter();
        let context = budgeter.fit(&five_word_passages(3), TokenBudget::new(5));

        assert_eq!(context.passages.len(), 1);
        assert_eq!(context.passages[0].text, "a text text text text");
        assert_eq!(context.remaining, 0);
        assert!(!context.truncated);
    }

    #[test]
    fn test_empty_inputs() {
        let budgeter = budgeter();
        assert!(budgeter.fit(&[], TokenBudget::new(5)).is_empty());
        assert!(budgeter.fit(&five_word_passages(2), TokenBudget::new(0)).is_empty());

        let negative = budgeter.fit(&five_word_passages(2), TokenBudget::new(-40));
        assert!(negative.is_empty());
        assert_eq!(negative.skipped, 2);
    }

    #[test]
    fn test_first_word_too_large_emits_nothing() {
        let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
        let budgeter = ContextBudgeter::new(tokenizer);
        let input = vec![RetrievedPassage::new(
            "antidisestablishmentarianism is long",
            0.9,
            "doc1",
        )];
        let context = budgeter.fit(&input, TokenBudget::new(1));

        assert!(context.is_empty());
        assert_eq!(context.remaining, 0);
    }

    #[test]
    fn test_truncation_preserves_original_spacing() {
        let budgeter = budgeter();
        let input = vec![RetrievedPassage::new("alpha  beta\n\tgamma delta", 0.9, "doc1")];
        let context = budgeter.fit(&input, TokenBudget::new(3));

        assert_eq!(context.passages[0].text, "alpha  beta\n\tgamma");
        assert!(input[0].text.starts_with(&context.passages[0].text));
    }

    #[test]
    fn test_similarity_cutoff_stops_iteration() {
        let budgeter = budgeter().with_similarity_cutoff(Some(0.75));
        let input = five_word_passages(4);
        let context = budgeter.fit(&input, TokenBudget::new(500));

        assert_eq!(context.passages.len(), 2);
        assert_eq!(context.passages[1].source_id, "data/doc2.pdf");
    }

    #[test]
    fn test_budget_respected_with_subword_tokenizer() {
        let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
        let budgeter = ContextBudgeter::new(tokenizer);
        let input = passages(&[
            "Kubernetes deployments manage replica sets declaratively.",
            "A StatefulSet maintains a sticky identity for each of its pods.",
            "ConfigMaps decouple configuration artifacts from image content.",
        ]);

        for budget in 0..40 {
            let context = budgeter.fit(&input, TokenBudget::new(budget));
            assert!(total_tokens(&budgeter, &context) <= budget as usize);
            assert_eq!(total_tokens(&budgeter, &context), context.tokens_used);

            // order-preserving prefix of the input
            for (out, original) in context.passages.iter().zip(&input) {
                assert_eq!(out.source_id, original.source_id);
                assert!(original.text.starts_with(&out.text));
            }
            // only the last passage may be cut
            let whole = context.passages.len().saturating_sub(1);
            for (out, original) in context.passages.iter().zip(&input).take(whole) {
                assert_eq!(out.text, original.text);
            }
        }
    }
}

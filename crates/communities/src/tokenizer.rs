use tiktoken_rs::CoreBPE;

use crate::error::TokenizationError;

/// Counts tokens the way the target model will see them.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizationError>;
}

/// BPE token counts from tiktoken.
///
/// The encoding is resolved once from the model name. Unknown models (local
/// Ollama models, for instance) fall back to `cl100k_base`, which is close
/// enough for budgeting requests.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn for_model(model: &str) -> Result<Self, TokenizationError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base().map_err(|e| TokenizationError {
                model: model.to_string(),
                reason: e.to_string(),
            })?,
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str, _model: &str) -> Result<usize, TokenizationError> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Rough estimate: 1.3 tokens per word. Needs no vocabulary and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordEstimateCounter;

impl TokenCounter for WordEstimateCounter {
    fn count(&self, text: &str, _model: &str) -> Result<usize, TokenizationError> {
        let word_count = text.split_whitespace().count();
        Ok((word_count as f64 * 1.3) as usize)
    }
}

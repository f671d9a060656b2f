//! Token counting for budget display against model context limits.

use anyhow::{Context, Result};
use tiktoken_rs::CoreBPE;

use crate::model::chat::Chat;

/// Counting is pluggable so surfaces can swap tokenizers without
/// touching the chat model.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Tokens in the full rendered conversation, tools included.
    fn count_chat(&self, chat: &Chat) -> usize {
        self.count(&chat.to_prompt_string())
    }
}

pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Looks up the encoding registered for `model` (e.g. "gpt-4o").
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .with_context(|| format!("no tokenizer registered for model `{}`", model))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

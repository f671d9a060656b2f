use anyhow::Result;
use serde_json::json;
use std::path::Path;

use crate::core::AppConfig;
use crate::model::Dataset;
use crate::tokens::{TiktokenCounter, TokenCounter};

pub fn run(input: &Path, tokens: bool) -> Result<()> {
    let dataset = Dataset::load(input)?;

    let counter = if tokens {
        let config = AppConfig::default();
        Some(TiktokenCounter::for_model(&config.tokenizer_model)?)
    } else {
        None
    };

    let chats: Vec<_> = dataset
        .iter()
        .map(|chat| {
            let mut record = json!({
                "name": chat.name(),
                "lang": chat.language().as_str(),
                "tags": chat.tags(),
                "messages": chat.message_count(),
                "tools": chat.tools().len(),
            });
            if let Some(counter) = &counter {
                record["tokens"] = json!(counter.count_chat(chat));
            }
            record
        })
        .collect();

    println!(
        "{}",
        json!({
            "file": input.display().to_string(),
            "chats": chats.len(),
            "fingerprint": dataset.fingerprint()?,
            "detail": chats,
        })
    );
    Ok(())
}

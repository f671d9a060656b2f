use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::core::{ApiKind, AppConfig};
use crate::generate::{GenerationMode, Generator};
use crate::model::Dataset;
use crate::openai::OpenAiClient;

pub async fn run(input: &Path, chat_index: usize, output: &Path) -> Result<()> {
    let config = AppConfig::default();
    let mut dataset = Dataset::load(input)?;

    let chat = dataset.get_chat(chat_index)?;
    let target = chat.message_count();
    let mode = match config.api_kind {
        ApiKind::Chat => GenerationMode::Chat,
        ApiKind::Completion => GenerationMode::Completion {
            before: String::new(),
            after: String::new(),
        },
    };

    let provider = Arc::new(OpenAiClient::from_config(&config));
    let generator = Generator::new(provider);
    let mut handle = generator.start(chat_index, chat, target, mode)?;

    // Redraw the partial reply as coalesced snapshots arrive
    let mut shown = 0;
    while let Some(snapshot) = handle.next_snapshot().await {
        print!("{}", &snapshot.text[shown..]);
        std::io::stdout().flush()?;
        shown = snapshot.text.len();
    }
    println!();

    let snapshot = handle.finish().await?;
    if snapshot.incomplete {
        anyhow::bail!("generation was interrupted; dataset left unchanged");
    }
    let tool_call = snapshot.tool_call()?;

    dataset
        .get_chat_mut(chat_index)?
        .apply_generated(target, &snapshot.text, tool_call)?;
    dataset.save(output)?;
    println!("Saved to {}", output.display());
    Ok(())
}

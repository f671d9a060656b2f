use anyhow::Result;
use std::path::Path;

use crate::model::Dataset;

pub fn run(input: &Path, output: &Path) -> Result<()> {
    let dataset = Dataset::load(input)?;
    dataset.export_openai_jsonl(output)?;
    println!(
        "Exported {} training records to {}",
        dataset.len(),
        output.display()
    );
    Ok(())
}

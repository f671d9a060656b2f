use anyhow::Result;
use std::path::Path;

use crate::model::Dataset;

pub fn run(input: &Path, output: &Path) -> Result<()> {
    let dataset = Dataset::load(input)?;
    dataset.save(output)?;
    println!(
        "Wrote {} chats to {}",
        dataset.len(),
        output.display()
    );
    Ok(())
}

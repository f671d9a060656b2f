use anyhow::Result;
use curator::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}

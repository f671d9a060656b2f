use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod convert;
pub mod export;
pub mod generate;
pub mod stats;

#[derive(Subcommand)]
enum Command {
    /// Convert a dataset between jsonl and csv containers
    Convert {
        /// Source dataset file (.jsonl or .csv)
        #[arg(long)]
        input: PathBuf,
        /// Destination file; the extension picks the format
        #[arg(long)]
        output: PathBuf,
    },
    /// Export a dataset as OpenAI fine-tuning records
    Export {
        /// Source dataset file (.jsonl or .csv)
        #[arg(long)]
        input: PathBuf,
        /// Destination jsonl file of request payloads
        #[arg(long)]
        output: PathBuf,
    },
    /// Print per-chat and dataset-wide statistics
    Stats {
        /// Source dataset file (.jsonl or .csv)
        #[arg(long)]
        input: PathBuf,
        /// Count tokens for each chat as well
        #[arg(long, action, default_value = "false")]
        tokens: bool,
    },
    /// Stream a generated assistant reply into a chat
    Generate {
        /// Source dataset file (.jsonl or .csv)
        #[arg(long)]
        input: PathBuf,
        /// Index of the chat to extend
        #[arg(long, default_value = "0")]
        chat: usize,
        /// Write the updated dataset back to this file (defaults to input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Handle each sub command
    match args.command {
        Some(Command::Convert { input, output }) => {
            convert::run(&input, &output)?;
        }
        Some(Command::Export { input, output }) => {
            export::run(&input, &output)?;
        }
        Some(Command::Stats { input, tokens }) => {
            stats::run(&input, tokens)?;
        }
        Some(Command::Generate {
            input,
            chat,
            output,
        }) => {
            let output = output.unwrap_or_else(|| input.clone());
            generate::run(&input, chat, &output).await?;
        }
        None => {}
    }

    Ok(())
}

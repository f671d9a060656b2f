//! Error types for model operations and stream finalization.
//!
//! Model-level operations fail fast and synchronously since they guard
//! data integrity. The streaming side instead surfaces partial results
//! with an explicit incomplete flag (see `assembler`), reserving hard
//! errors for unusable final states like a half-written tool call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("duplicate tool: {name}")]
    DuplicateTool { name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("index {index} out of range for {kind} of length {len}")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("tool message must follow an assistant message with a tool call")]
    PrecedingToolCallMissing,

    #[error("invalid {0}")]
    SchemaValidation(String),

    #[error("tool call arguments are not valid JSON: {0}")]
    MalformedToolArguments(#[source] serde_json::Error),

    #[error("a generation is already in progress for chat {chat}, message {slot}")]
    GenerationAlreadyInProgress { chat: usize, slot: usize },

    #[error("failed to parse dataset line {line}: {reason}")]
    ImportParse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn import_parse(line: usize, err: impl std::fmt::Display) -> Self {
        ModelError::ImportParse {
            line,
            reason: err.to_string(),
        }
    }
}

pub mod core;

pub use core::{
    CompletionProvider, EventStream, OpenAiClient, StreamEvent, completion_prompt,
};

pub mod assembler;
pub mod cli;
pub mod core;
pub mod error;
pub mod generate;
pub mod model;
pub mod openai;
pub mod tokens;

pub mod config;

pub use config::{ApiKind, AppConfig};

pub mod chat;
pub mod dataset;
pub mod message;
pub mod tool;

pub use chat::{Chat, Language};
pub use dataset::Dataset;
pub use message::{Message, Role, ToolCallData};
pub use tool::{Parameter, Tool};

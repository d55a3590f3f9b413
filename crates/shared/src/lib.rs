pub mod db;
pub mod events;
pub mod models;
pub mod sse;

pub use rusqlite;
pub use events::StreamFrame;
pub use models::{Chat, ChatStatus, ChatSummary, Message, Role, TokenUsage, User};

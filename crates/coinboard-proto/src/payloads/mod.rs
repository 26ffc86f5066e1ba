//! JSON payloads carried in frame bodies and HTTP responses.

pub mod chat;
pub mod credential;
pub mod history;

pub use chat::{ChatMessage, ChatOutbound};
pub use credential::Credential;
pub use history::HistoryRequest;

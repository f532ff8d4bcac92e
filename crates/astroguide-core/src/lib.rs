pub mod api;
pub mod config;
pub mod error;
pub mod links;
pub mod state;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use api::{BackendStatus, ChatBackend, ChatClient, ChatReply, ChatRequest, HISTORY_LIMIT};
pub use config::Config;
pub use error::{RequestError, StorageError};
pub use links::display_domain;
pub use state::{ChatMessage, ChatRole, HistoryTurn, Level, Session, Theme};
pub use storage::{FileStore, KeyValueStore, MemoryStore, CHAT_STORAGE_KEY, THEME_STORAGE_KEY};
pub use store::{ChatStore, BACKEND_ERROR_MESSAGE};

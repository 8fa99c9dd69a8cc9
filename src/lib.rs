pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod panels;
pub mod persist;
pub mod providers;

pub use catalog::ModelCatalog;
pub use dispatch::{save_edit, submit_all, ERROR_RESPONSE};
pub use error::ArenaError;
pub use panels::{ChatPanel, ConversationTurn, EditSession, PanelBoard, PanelPolicy};
pub use persist::{SavePayload, SaveQueue, UserSession};
pub use providers::{Completion, CompletionBackend, CompletionUsage, Provider};

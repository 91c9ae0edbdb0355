//! Phoenix Chat - conversation log for tool-calling LLM sessions
//!
//! Holds the ordered message log of a conversation, resolves pending tool
//! calls through a caller-supplied handler, and persists conversations to a
//! blob store without leaking per-message metadata into the provider-facing
//! message format.

pub mod config;
pub mod conversation;
pub mod error;
pub mod message;
pub mod storage;
pub mod tools;

pub use config::ChatConfig;
pub use conversation::Conversation;
pub use error::{ChatError, ChatErrorKind, ChatResult};
pub use message::{
    Content, ImageUrl, Message, Part, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER,
};
pub use storage::{
    BlobStore, ConversationStore, FileStore, LoggingStore, MemoryStore, Options, StoreError,
};
pub use tools::{Function, Tool, ToolCall, ToolCallContext, ToolCatalog};

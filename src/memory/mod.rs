//! 记忆层：对话消息与会话检查点

pub mod checkpoint;
pub mod conversation;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore, ThreadGuard, ThreadLocks};
pub use conversation::{Message, Role, ToolCallMeta};

//! 会话检查点：按线程 ID 保存 ConversationState
//!
//! 两种后端：进程内（RwLock<HashMap>）与 SQLite（checkpoints 表，JSON 序列化）。
//! 同一线程的并发请求由 ThreadLocks 串行化；不同线程互不影响。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::core::AgentError;
use crate::graph::ConversationState;
use crate::store::{Database, StoreError};

/// 检查点存储
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, AgentError>;

    async fn save(&self, state: &ConversationState) -> Result<(), AgentError>;
}

/// 进程内检查点
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, AgentError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), AgentError> {
        self.states
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

/// SQLite 检查点（与号源库可共用同一个 Database）
pub struct SqliteCheckpointStore {
    db: Database,
}

impl SqliteCheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, AgentError> {
        let thread_id = thread_id.to_string();
        let raw: Option<String> = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state FROM checkpoints WHERE thread_id = ?1",
                        params![thread_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| AgentError::Checkpoint(e.to_string())))
            .transpose()
    }

    async fn save(&self, state: &ConversationState) -> Result<(), AgentError> {
        let json = serde_json::to_string(state).map_err(|e| AgentError::Checkpoint(e.to_string()))?;
        let thread_id = state.thread_id.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(thread_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                    params![thread_id, json, now],
                )
                .map_err(StoreError::from)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// 每线程一把异步锁：同一线程的轮次依次执行；没有持有者或等待者时移除该线程的锁
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        ThreadGuard {
            owner: self,
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release(&self, thread_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // 只剩表内一份引用：没有其他持有者或排队者
        if locks.get(thread_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(thread_id);
        }
    }
}

/// 线程锁的持有凭证
pub struct ThreadGuard<'a> {
    owner: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner.release(&self.thread_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::Message;
    use crate::store::PatientId;

    fn sample() -> ConversationState {
        let mut state = ConversationState::new("1234567", PatientId::new(1234567));
        state.begin_turn("hello");
        state.push(Message::user("hello"));
        state
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("1234567").await.unwrap().is_none());
        store.save(&sample()).await.unwrap();
        let loaded = store.load("1234567").await.unwrap().unwrap();
        assert_eq!(loaded.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::new(Database::open(dir.path().join("cp.db")).unwrap());
        let mut state = sample();
        store.save(&state).await.unwrap();
        state.push(Message::assistant("hi there"));
        store.save(&state).await.unwrap();
        let loaded = store.load("1234567").await.unwrap().unwrap();
        assert_eq!(loaded.messages().len(), 2);
        assert_eq!(loaded.turns, 1);
    }

    #[tokio::test]
    async fn test_thread_locks_serialize_same_thread() {
        let locks = Arc::new(ThreadLocks::new());
        let guard = locks.acquire("a").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("a").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        // 不同线程不受影响
        let _b = locks.acquire("b").await;
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_thread_lock_removed_after_last_release() {
        let locks = Arc::new(ThreadLocks::new());
        let first = locks.acquire("a").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("a").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        // 仍有排队者，锁保留到它释放
        waiter.await.unwrap();
        assert!(locks.locks.lock().unwrap().is_empty());

        let _b = locks.acquire("b").await;
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}

//! SQLite 连接封装
//!
//! rusqlite 是同步 API：连接放在 `Arc<Mutex<_>>` 中，每次调用经 `spawn_blocking` 执行，
//! 避免在 async 上下文中阻塞运行时线程。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::store::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS doctor_availability (
    doctor_name TEXT NOT NULL COLLATE NOCASE,
    specialization TEXT NOT NULL COLLATE NOCASE,
    date_slot TEXT NOT NULL,
    is_available INTEGER NOT NULL DEFAULT 1,
    patient_to_attend INTEGER,
    PRIMARY KEY (doctor_name, date_slot),
    CHECK ((is_available = 1 AND patient_to_attend IS NULL)
        OR (is_available = 0 AND patient_to_attend IS NOT NULL))
);
CREATE INDEX IF NOT EXISTS idx_availability_specialization
    ON doctor_availability(specialization);

CREATE TABLE IF NOT EXISTS patients (
    patient_id INTEGER PRIMARY KEY,
    fullname TEXT NOT NULL,
    email TEXT
);

CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// 共享数据库句柄，可廉价 clone
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// 打开（或创建）数据库文件并初始化表结构；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // 多进程共享同一文件时，写锁冲突等待而不是立即失败
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::init(conn)
    }

    /// 内存数据库（测试与 mock 部署）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池中持有连接执行 f
    pub async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_check_constraint_rejects_inconsistent_row() {
        let db = Database::open_in_memory().unwrap();
        let result = db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO doctor_availability VALUES ('sharma', 'cardiologist', '16-06-2025 10:00', 1, 1234567)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clinic.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }
}

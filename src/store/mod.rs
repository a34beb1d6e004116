//! 号源存储：SQLite 上的医生号源表、患者表
//!
//! - **db**: 共享连接与阻塞调用封装（spawn_blocking）
//! - **slot**: 号源记录、患者 ID、时间格式工具
//! - **slots**: 号源查询与原子占用 / 释放 / 改约
//! - **patients**: 患者通讯录（通知收件人）
//! - **seed**: 从 CSV 导入初始号源

pub mod db;
pub mod patients;
pub mod seed;
pub mod slot;
pub mod slots;

use thiserror::Error;

pub use db::Database;
pub use patients::{PatientDirectory, PatientRecord};
pub use seed::{import_csv, parse_csv};
pub use slot::{to_am_pm, PatientId, SlotRecord};
pub use slots::{BookOutcome, CancelOutcome, RescheduleOutcome, SlotStore};

/// 存储层错误：SQLite、种子数据解析、阻塞任务失败
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("seed line {line}: {reason}")]
    Seed { line: usize, reason: String },

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error("connection lock poisoned")]
    Poisoned,
}

//! DocuBot - 诊所预约助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与恢复策略
//! - **graph**: 分类器、路由器、处理器与编排状态机
//! - **identity**: 患者身份来源与凭证解析
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息与会话检查点
//! - **notify**: 预约变更通知
//! - **observability**: 日志初始化
//! - **store**: SQLite 号源表与患者通讯录
//! - **stream**: 事件 → NDJSON 记录
//! - **tools**: 领域工具（查询号源、预约、取消、改约）与执行器

pub mod config;
pub mod core;
pub mod graph;
pub mod identity;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod observability;
pub mod store;
pub mod stream;
pub mod tools;

pub use graph::{build_from_config, Orchestrator, TurnRequest};
pub use stream::StreamRecord;

//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / Abort。
//! 业务上的否定结果（号源已被占用、预约不存在）不是错误，它们作为工具的文本结果返回。

use thiserror::Error;

use crate::store::StoreError;

/// 一次对话回合中可能出现的错误（LLM 调用、决策解析、工具、存储、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// 决策结构合法但内容不满足约定（如 next 不在枚举内）
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一次决策调用，让 LLM 重新输出合法 JSON
    RetryWithPrompt(String),
    /// 终止当前回合，向调用方输出错误记录
    Abort,
}

//! 错误恢复引擎
//!
//! 决策类调用（分类器 / 路由）只对「输出格式错误」重试一次；网络或上游失败直接终止，不自动重试。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作；expected_format 为期望的 JSON 形状示例
    pub fn handle(&self, err: &AgentError, expected_format: &str) -> RecoveryAction {
        match err {
            AgentError::JsonParseError(raw) | AgentError::InvalidDecision(raw) => {
                RecoveryAction::RetryWithPrompt(format!(
                    "Your previous output could not be used: {raw}. \
                     Respond with exactly one JSON object and nothing else, shaped like: {expected_format}"
                ))
            }
            _ => RecoveryAction::Abort,
        }
    }
}

//! 对话消息
//!
//! 会话状态中的消息序列只追加、不修改：既是 LLM 上下文，也是一次运行的审计日志。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，另有 Tool 表示工具结果）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 工具调用元数据：挂在发起调用的 assistant 消息和对应的 tool 结果消息上
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMeta {
    pub call_id: String,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// 作者节点名（classifier / router / information / booking / 工具名）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallMeta>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            name: None,
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            name: None,
            content: content.into(),
            tool_call: None,
        }
    }

    /// 工具结果消息，name 为工具名
    pub fn tool(call: ToolCallMeta, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            name: Some(call.tool.clone()),
            content: content.into(),
            tool_call: Some(call),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_call(mut self, call: ToolCallMeta) -> Self {
        self.tool_call = Some(call);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_carries_call_metadata() {
        let call = ToolCallMeta {
            call_id: "call_1".to_string(),
            tool: "book_appointment".to_string(),
            args: serde_json::json!({"doctor_name": "sharma"}),
        };
        let msg = Message::tool(call.clone(), "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.name.as_deref(), Some("book_appointment"));
        assert_eq!(msg.tool_call, Some(call));
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}

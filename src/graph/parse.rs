//! 解析 LLM 输出：提取 JSON 块、区分工具调用与最终回复

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;

/// 处理器一步的输出
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// 最终回复
    Reply(String),
    /// 调用工具
    ToolCall { tool: String, args: Value },
}

#[derive(Deserialize)]
struct RawToolCall {
    #[serde(default)]
    tool: String,
    #[serde(default)]
    args: Value,
}

/// 提取 JSON 块（```json ... ``` 或首个 `{` 到末个 `}`）；没有时返回 None
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 把 JSON 决策解析为 T；找不到 JSON 或字段不符时返回 JsonParseError
pub fn parse_decision<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let json = extract_json(text)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON object in: {}", preview(text))))?;
    serde_json::from_str(json).map_err(|e| AgentError::JsonParseError(format!("{e}: {}", preview(json))))
}

/// 处理器输出：含 `{"tool": ..}` 的 JSON 为工具调用，否则整段为回复
pub fn parse_handler_output(text: &str) -> Result<HandlerOutput, AgentError> {
    let trimmed = text.trim();
    let Some(json) = extract_json(trimmed) else {
        return Ok(HandlerOutput::Reply(trimmed.to_string()));
    };
    let parsed: RawToolCall = match serde_json::from_str(json) {
        Ok(p) => p,
        // 以 JSON 开头却解析失败才算格式错误；正文中偶然出现的花括号按回复处理
        Err(e) if looks_structured(trimmed) => {
            return Err(AgentError::JsonParseError(format!("{e}: {}", preview(json))))
        }
        Err(_) => return Ok(HandlerOutput::Reply(trimmed.to_string())),
    };
    if parsed.tool.trim().is_empty() {
        return Ok(HandlerOutput::Reply(trimmed.to_string()));
    }
    let args = if parsed.args.is_null() {
        Value::Object(Default::default())
    } else {
        parsed.args
    };
    Ok(HandlerOutput::ToolCall {
        tool: parsed.tool.trim().to_string(),
        args,
    })
}

/// 首个非空白字符是 `{` 或反引号：按结构化输出处理（流式时不转发为文本）
pub fn looks_structured(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('`'))
}

fn tool_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""tool"\s*:\s*"([^"]+)""#).ok()).as_ref()
}

/// 在尚未接收完整的输出中探测工具名
pub fn detect_tool_name(partial: &str) -> Option<String> {
    tool_name_re()?
        .captures(partial)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

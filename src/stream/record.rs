//! 对外输出的流记录（每条一行 JSON）

use serde::{Deserialize, Serialize};

/// 外部流中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// 处理器即将使用 / 已使用某个工具
    Tool { tool_name: String },
    /// 回复片段
    Text { content: String },
    /// 处理器级错误；后续记录照常输出
    Error { message: String },
    /// 图级错误；本轮最后一条记录
    FatalError { message: String },
}

impl StreamRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamRecord::FatalError { .. })
    }

    /// 序列化为一行（含结尾换行）
    pub fn to_ndjson_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("{json}\n"),
            // 仅含字符串字段，序列化不会失败
            Err(e) => format!("{{\"type\":\"fatal_error\",\"message\":\"{e}\"}}\n"),
        }
    }
}

//! 处理器（信息 / 预约）
//!
//! 每个处理器持有自己的工具注册表，只能调用绑定的工具。一步 = 一次流式 LLM 调用：
//! 输出以 `{` 或反引号开头视为结构化工具调用，识别出工具名即发出 ToolCallChunk；
//! 否则视为回复正文，逐片段发出 TextChunk。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::graph::events::{EventSink, GraphEvent};
use crate::graph::parse::{detect_tool_name, looks_structured, parse_handler_output, HandlerOutput};
use crate::graph::prompts::render_handler;
use crate::identity::IdentitySource;
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCallMeta};
use crate::tools::{tool_call_schema_json, ToolContext, ToolExecutor, ToolRegistry};

/// 处理器种类（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Information,
    Booking,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 2] = [HandlerKind::Information, HandlerKind::Booking];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Information => "information",
            HandlerKind::Booking => "booking",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HandlerKind::Information => {
                "Provides information about doctor availability, doctors and specializations."
            }
            HandlerKind::Booking => "Books, cancels or reschedules appointments.",
        }
    }
}

/// 处理器回复后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandlerMode {
    /// 回复后回到路由
    #[default]
    MultiHop,
    /// 回复后直接结束本轮
    SingleHop,
}

/// 待执行的工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub tool: String,
    pub args: Value,
}

impl PendingToolCall {
    pub fn meta(&self) -> ToolCallMeta {
        ToolCallMeta {
            call_id: self.call_id.clone(),
            tool: self.tool.clone(),
            args: self.args.clone(),
        }
    }
}

/// 处理器一步的结果
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerStep {
    /// streamed 为 true 表示正文已经以 TextChunk 发出
    Reply { text: String, streamed: bool },
    ToolCall(PendingToolCall),
}

/// 工具名 -> 所属处理器；启动时构建一次，工具集必须互不相交
#[derive(Debug, Clone, Default)]
pub struct ToolOwnership {
    owners: HashMap<String, HandlerKind>,
}

impl ToolOwnership {
    pub fn build<'a>(
        sets: impl IntoIterator<Item = (HandlerKind, &'a ToolRegistry)>,
    ) -> Result<Self, AgentError> {
        let mut owners = HashMap::new();
        for (kind, registry) in sets {
            for name in registry.tool_names() {
                if let Some(prev) = owners.insert(name.clone(), kind) {
                    return Err(AgentError::ConfigError(format!(
                        "tool '{name}' is bound to both {} and {}",
                        prev.as_str(),
                        kind.as_str()
                    )));
                }
            }
        }
        Ok(Self { owners })
    }

    pub fn owner(&self, tool: &str) -> Option<HandlerKind> {
        self.owners.get(tool).copied()
    }
}

/// 一个处理器：LLM + 绑定的工具集 + 渲染好的 system prompt
pub struct Handler {
    kind: HandlerKind,
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    system_prompt: String,
}

impl Handler {
    pub fn new(
        kind: HandlerKind,
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        tool_timeout_secs: u64,
        template: &str,
        identity: IdentitySource,
    ) -> Self {
        let system_prompt = render_handler(
            template,
            &tools.to_schema_json(),
            &tool_call_schema_json(),
            identity,
        );
        Self {
            kind,
            llm,
            executor: ToolExecutor::new(tools, tool_timeout_secs),
            system_prompt,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// 调用一次 LLM（流式），边接收边转发；hint 为格式纠正提示，不写入会话
    pub async fn step(
        &self,
        history: &[Message],
        hint: Option<&str>,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<HandlerStep, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend_from_slice(history);
        if let Some(hint) = hint {
            messages.push(Message::system(hint));
        }

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = self.llm.complete_stream(&messages) => r.map_err(AgentError::LlmError)?,
        };

        let call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
        let source = self.kind.as_str();
        let mut buffer = String::new();
        let mut structured: Option<bool> = None;
        let mut flushed = 0usize;
        // 正文中出现 `{` 或反引号后暂扣其余文本，输出结束后再定夺
        let mut held_from: Option<usize> = None;
        let mut announced = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                n = stream.next() => n,
            };
            let Some(chunk) = next else { break };
            buffer.push_str(&chunk.map_err(AgentError::LlmError)?);

            if structured.is_none() && !buffer.trim().is_empty() {
                let is_structured = looks_structured(&buffer);
                structured = Some(is_structured);
                if !is_structured {
                    // 去掉正文前的空白
                    flushed = buffer.len() - buffer.trim_start().len();
                }
            }
            match structured {
                Some(false) if held_from.is_none() => {
                    held_from = buffer[flushed..]
                        .find(|c: char| c == '{' || c == '`')
                        .map(|at| flushed + at);
                    let end = held_from.unwrap_or(buffer.len());
                    if end > flushed {
                        events.emit(GraphEvent::TextChunk {
                            source: source.to_string(),
                            text: buffer[flushed..end].to_string(),
                        });
                        flushed = end;
                    }
                }
                Some(true) if !announced => {
                    if let Some(tool) = detect_tool_name(&buffer) {
                        events.emit(GraphEvent::ToolCallChunk {
                            call_id: call_id.clone(),
                            handler: self.kind,
                            tool,
                        });
                        announced = true;
                    }
                }
                _ => {}
            }
        }

        match parse_handler_output(&buffer)? {
            HandlerOutput::Reply(text) => {
                if structured == Some(false) {
                    let rest = buffer[flushed..].trim_end();
                    if !rest.is_empty() {
                        events.emit(GraphEvent::TextChunk {
                            source: source.to_string(),
                            text: rest.to_string(),
                        });
                    }
                }
                Ok(HandlerStep::Reply {
                    text,
                    streamed: structured == Some(false),
                })
            }
            // 正文已开始输出后又夹带工具调用：不执行，要求重新作答
            HandlerOutput::ToolCall { tool, .. } if structured == Some(false) => Err(AgentError::InvalidDecision(
                format!("the reply mixed prose with a call to '{tool}'; send either the JSON tool call alone or a plain-text answer"),
            )),
            HandlerOutput::ToolCall { tool, args } => Ok(HandlerStep::ToolCall(PendingToolCall {
                call_id,
                tool,
                args,
            })),
        }
    }

    /// 执行本处理器绑定的工具；失败转为描述文本交还给处理器
    pub async fn execute_tool(&self, call: &PendingToolCall, ctx: &ToolContext) -> (bool, String) {
        match self.executor.execute(&call.tool, call.args.clone(), ctx).await {
            Ok(content) => (true, content),
            Err(e) => (false, format!("Error: {e}")),
        }
    }
}

//! 事件 → 流记录
//!
//! 同一次工具调用可能先以 ToolCallChunk（流式识别出工具名）出现，再以 ToolCallStarted 出现，
//! 按 call_id 去重后只输出一条 `tool` 记录。fatal_error 之后不再输出任何记录。

use std::collections::HashSet;
use std::future;

use futures_util::{Stream, StreamExt};

use crate::graph::GraphEvent;
use crate::stream::StreamRecord;

#[derive(Debug, Default)]
pub struct StreamAdapter {
    announced: HashSet<String>,
    finished: bool,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个事件；不需要对外输出的事件返回 None
    pub fn on_event(&mut self, event: GraphEvent) -> Option<StreamRecord> {
        if self.finished {
            return None;
        }
        let record = match event {
            GraphEvent::ToolCallChunk { call_id, tool, .. } | GraphEvent::ToolCallStarted { call_id, tool, .. } => {
                self.announced
                    .insert(call_id)
                    .then_some(StreamRecord::Tool { tool_name: tool })
            }
            GraphEvent::TextChunk { text, .. } if !text.is_empty() => Some(StreamRecord::Text { content: text }),
            GraphEvent::HandlerFailed { handler, message } => Some(StreamRecord::Error {
                message: format!("{} handler: {message}", handler.as_str()),
            }),
            GraphEvent::Fatal { message } => Some(StreamRecord::FatalError { message }),
            _ => None,
        };
        if record.as_ref().is_some_and(StreamRecord::is_terminal) {
            self.finished = true;
        }
        record
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// 将事件流转换为记录流（保持顺序）
pub fn adapt<S>(events: S) -> impl Stream<Item = StreamRecord>
where
    S: Stream<Item = GraphEvent>,
{
    events
        .scan(StreamAdapter::new(), |adapter, event| {
            let out = if adapter.is_finished() {
                None
            } else {
                Some(adapter.on_event(event))
            };
            future::ready(out)
        })
        .filter_map(future::ready)
}

/// 转换为 NDJSON 行流
pub fn ndjson_lines<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = GraphEvent>,
{
    adapt(events).map(|record| record.to_ndjson_line())
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use serde_json::json;

    use super::*;
    use crate::graph::HandlerKind;

    fn chunk(call_id: &str, tool: &str) -> GraphEvent {
        GraphEvent::ToolCallChunk {
            call_id: call_id.into(),
            handler: HandlerKind::Booking,
            tool: tool.into(),
        }
    }

    fn started(call_id: &str, tool: &str) -> GraphEvent {
        GraphEvent::ToolCallStarted {
            call_id: call_id.into(),
            handler: HandlerKind::Booking,
            tool: tool.into(),
            args: json!({}),
        }
    }

    fn text(s: &str) -> GraphEvent {
        GraphEvent::TextChunk {
            source: "booking".into(),
            text: s.into(),
        }
    }

    #[tokio::test]
    async fn test_tool_notice_deduplicated_per_call() {
        let events = vec![
            GraphEvent::NodeEntered { node: "booking".into() },
            chunk("c1", "book_appointment"),
            started("c1", "book_appointment"),
            GraphEvent::ToolResult {
                call_id: "c1".into(),
                tool: "book_appointment".into(),
                ok: true,
                preview: "done".into(),
            },
            started("c2", "book_appointment"),
            text("Booked."),
        ];
        let records: Vec<_> = adapt(stream::iter(events)).collect().await;
        assert_eq!(
            records,
            vec![
                StreamRecord::Tool {
                    tool_name: "book_appointment".into()
                },
                StreamRecord::Tool {
                    tool_name: "book_appointment".into()
                },
                StreamRecord::Text {
                    content: "Booked.".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_stream() {
        let events = vec![
            GraphEvent::HandlerFailed {
                handler: HandlerKind::Information,
                message: "LLM error: 503".into(),
            },
            text("Sorry, please try again."),
        ];
        let records: Vec<_> = adapt(stream::iter(events)).collect().await;
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], StreamRecord::Error { message } if message.contains("503")));
        assert!(matches!(&records[1], StreamRecord::Text { .. }));
    }

    #[tokio::test]
    async fn test_fatal_is_last_record() {
        let events = vec![
            text("partial"),
            GraphEvent::Fatal {
                message: "LLM error: timeout".into(),
            },
            text("late"),
            GraphEvent::TurnFinished { reason: "x".into() },
        ];
        let lines: Vec<_> = ndjson_lines(stream::iter(events)).collect().await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "{\"type\":\"fatal_error\",\"message\":\"LLM error: timeout\"}\n");
    }
}

//! 编排过程事件：按产生顺序交给流适配器

use serde::Serialize;
use tokio::sync::mpsc;

use crate::graph::HandlerKind;

/// 图运行中产生的内部事件（可序列化，便于调试输出）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// 进入某个节点
    NodeEntered { node: String },
    /// 路由决策
    RouteDecided {
        hop: u32,
        next: String,
        reasoning: String,
    },
    /// 流式输出中识别出工具名（调用参数尚未完整）
    ToolCallChunk {
        call_id: String,
        handler: HandlerKind,
        tool: String,
    },
    /// 工具调用开始执行
    ToolCallStarted {
        call_id: String,
        handler: HandlerKind,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    ToolResult {
        call_id: String,
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 回复片段；source 为 classifier / information / booking / fallback
    TextChunk { source: String, text: String },
    /// 处理器失败；本轮继续
    HandlerFailed { handler: HandlerKind, message: String },
    /// 图级失败；本轮终止
    Fatal { message: String },
    /// 本轮结束
    TurnFinished { reason: String },
}

/// 事件发送端；接收端关闭后发送静默失败
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: GraphEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tag() {
        let ev = GraphEvent::ToolCallChunk {
            call_id: "c1".into(),
            handler: HandlerKind::Booking,
            tool: "book_appointment".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tool_call_chunk");
        assert_eq!(json["handler"], "booking");
    }

    #[tokio::test]
    async fn test_sink_preserves_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(GraphEvent::NodeEntered { node: "classify".into() });
        sink.emit(GraphEvent::NodeEntered { node: "route".into() });
        drop(sink);
        let mut nodes = Vec::new();
        while let Some(GraphEvent::NodeEntered { node }) = rx.recv().await {
            nodes.push(node);
        }
        assert_eq!(nodes, vec!["classify", "route"]);
    }
}

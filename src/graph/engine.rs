//! 编排状态机
//!
//! classify → route → {information, booking} → route … → terminate；处理器发出工具调用时经
//! execute-tool 回到该工具所属的处理器。每次进入 route 跳数加一，路由器在跳数超限时强制结束，
//! 因此任何模型行为下本轮都会终止。
//!
//! 同一线程的轮次由线程锁串行；状态在每轮结束（含失败、取消）时写回检查点。

use std::sync::Arc;

use futures_util::{stream, Stream};
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::graph::classifier::{Classification, Classifier};
use crate::graph::events::{EventSink, GraphEvent};
use crate::graph::handler::{Handler, HandlerKind, HandlerMode, HandlerStep, PendingToolCall, ToolOwnership};
use crate::graph::router::{RouteTarget, Router};
use crate::graph::ConversationState;
use crate::llm::LlmClient;
use crate::memory::{CheckpointStore, Message, ThreadLocks};
use crate::store::PatientId;
use crate::tools::ToolContext;

const TOOL_CALL_FORMAT: &str = r#"{"tool": "<tool name>", "args": {...}} or a plain-text final answer"#;

/// 一次外部请求
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub query: String,
    pub patient_id: Option<PatientId>,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            query: query.into(),
            patient_id: None,
        }
    }

    /// 以患者 ID 作为线程 ID
    pub fn for_patient(patient: PatientId, query: impl Into<String>) -> Self {
        Self {
            thread_id: patient.to_string(),
            query: query.into(),
            patient_id: Some(patient),
        }
    }
}

/// 一轮的结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// 本轮最后一条回复
    pub reply: Option<String>,
    /// 进入路由的次数
    pub hops: u32,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Classify,
    Route,
    Handle(HandlerKind),
    ExecuteTool(HandlerKind),
    Terminate,
}

impl Node {
    fn name(&self) -> &'static str {
        match self {
            Node::Classify => "classify",
            Node::Route => "route",
            Node::Handle(HandlerKind::Information) => "information",
            Node::Handle(HandlerKind::Booking) => "booking",
            Node::ExecuteTool(_) => "execute_tool",
            Node::Terminate => "terminate",
        }
    }
}

/// 单轮内的临时进度（不持久化）
#[derive(Default)]
struct TurnProgress {
    last_reply: Option<String>,
    errored: bool,
    finish_reason: String,
    /// 本次进入处理器后已调用 LLM 的次数
    visit_steps: usize,
    hint: Option<String>,
    pending: Option<PendingToolCall>,
}

/// 编排引擎
pub struct Orchestrator {
    pub(crate) classifier: Classifier,
    pub(crate) router: Router,
    pub(crate) information: Handler,
    pub(crate) booking: Handler,
    pub(crate) ownership: ToolOwnership,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) locks: ThreadLocks,
    pub(crate) mode: HandlerMode,
    pub(crate) max_steps: usize,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) llm: Arc<dyn LlmClient>,
    /// 固定的「今天」（DD-MM-YYYY）；None 时取本地日期
    pub(crate) today: Option<String>,
}

impl Orchestrator {
    fn handler(&self, kind: HandlerKind) -> &Handler {
        match kind {
            HandlerKind::Information => &self.information,
            HandlerKind::Booking => &self.booking,
        }
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    fn today(&self) -> String {
        self.today
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%d-%m-%Y").to_string())
    }

    /// 执行一轮：加载状态、驱动状态机、写回检查点
    pub async fn run_turn(
        &self,
        req: TurnRequest,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let _guard = self.locks.acquire(&req.thread_id).await;

        let mut state = self
            .checkpoints
            .load(&req.thread_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(req.thread_id.clone(), req.patient_id));
        if req.patient_id.is_some() {
            state.patient_id = req.patient_id;
        }
        state.begin_turn(req.query.clone());
        tracing::info!(thread_id = %req.thread_id, turn = state.turns, "turn started");

        let result = self.drive(&mut state, &req.query, events, cancel).await;

        if let Err(e) = self.checkpoints.save(&state).await {
            tracing::error!(thread_id = %req.thread_id, error = %e, "failed to save checkpoint");
            if result.is_ok() {
                return Err(e);
            }
        }
        let (prompt, completion, total) = self.llm.token_usage();
        tracing::debug!(prompt, completion, total, "cumulative token usage");
        result
    }

    async fn drive(
        &self,
        state: &mut ConversationState,
        raw_query: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let mut turn = TurnProgress::default();
        let mut node = Node::Classify;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::debug!(thread_id = %state.thread_id, node = node.name(), hop = state.hop_count, "enter node");
            events.emit(GraphEvent::NodeEntered {
                node: node.name().to_string(),
            });

            node = match node {
                Node::Classify => self.classify(state, raw_query, &mut turn, events, cancel).await?,
                Node::Route => {
                    let decision = self.router.route(state, cancel).await?;
                    events.emit(GraphEvent::RouteDecided {
                        hop: decision.hop,
                        next: decision.next.to_string(),
                        reasoning: decision.reasoning.clone(),
                    });
                    match decision.next {
                        RouteTarget::Handler(kind) => {
                            turn.visit_steps = 0;
                            turn.hint = None;
                            Node::Handle(kind)
                        }
                        RouteTarget::Finish => {
                            turn.finish_reason = decision.reasoning;
                            Node::Terminate
                        }
                    }
                }
                Node::Handle(kind) => self.handle(kind, state, &mut turn, events, cancel).await?,
                Node::ExecuteTool(issuer) => self.execute_tool(issuer, state, &mut turn, events).await,
                Node::Terminate => {
                    if turn.last_reply.is_none() && !turn.errored {
                        let text = fallback_reply(state.last_routing_reason.as_deref());
                        events.emit(GraphEvent::TextChunk {
                            source: "fallback".to_string(),
                            text: text.clone(),
                        });
                        state.push(Message::assistant(text.clone()).with_name("fallback"));
                        turn.last_reply = Some(text);
                    }
                    tracing::info!(
                        thread_id = %state.thread_id,
                        hops = state.hop_count,
                        max_hops = self.router.max_hops(),
                        reason = %turn.finish_reason,
                        "turn finished"
                    );
                    events.emit(GraphEvent::TurnFinished {
                        reason: turn.finish_reason.clone(),
                    });
                    return Ok(TurnOutcome {
                        reply: turn.last_reply,
                        hops: state.hop_count,
                        finish_reason: turn.finish_reason,
                    });
                }
            };
        }
    }

    async fn classify(
        &self,
        state: &mut ConversationState,
        raw_query: &str,
        turn: &mut TurnProgress,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<Node, AgentError> {
        let today = self.today();
        let decision = self.classifier.classify(state, raw_query, &today, cancel).await?;
        state.push(Message::user(raw_query));
        match decision {
            Classification::Terminal { answer } => {
                events.emit(GraphEvent::TextChunk {
                    source: "classifier".to_string(),
                    text: answer.clone(),
                });
                state.push(Message::assistant(answer.clone()).with_name("classifier"));
                turn.last_reply = Some(answer);
                turn.finish_reason = "answered directly".to_string();
                Ok(Node::Terminate)
            }
            Classification::Continue { rewritten_query } => {
                state.push(Message::user(rewritten_query.clone()).with_name("query_rewriter"));
                state.rewritten_query = Some(rewritten_query);
                Ok(Node::Route)
            }
        }
    }

    /// 处理器一步；处理器级失败发出 HandlerFailed 后继续，不终止本轮
    async fn handle(
        &self,
        kind: HandlerKind,
        state: &mut ConversationState,
        turn: &mut TurnProgress,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<Node, AgentError> {
        let handler = self.handler(kind);
        if turn.visit_steps >= self.max_steps {
            let message = format!("{} handler stopped after {} steps", kind.as_str(), self.max_steps);
            return Ok(self.handler_failed(kind, message, state, turn, events));
        }
        turn.visit_steps += 1;

        let hint = turn.hint.take();
        match handler.step(state.messages(), hint.as_deref(), events, cancel).await {
            Ok(HandlerStep::Reply { text, streamed }) => {
                if !text.is_empty() {
                    if !streamed {
                        events.emit(GraphEvent::TextChunk {
                            source: kind.as_str().to_string(),
                            text: text.clone(),
                        });
                    }
                    state.push(Message::assistant(text.clone()).with_name(kind.as_str()));
                    turn.last_reply = Some(text);
                }
                Ok(self.after_reply(kind, turn))
            }
            Ok(HandlerStep::ToolCall(call)) => {
                turn.pending = Some(call);
                Ok(Node::ExecuteTool(kind))
            }
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => match self.recovery.handle(&e, TOOL_CALL_FORMAT) {
                RecoveryAction::RetryWithPrompt(hint) if turn.visit_steps < self.max_steps => {
                    tracing::warn!(handler = kind.as_str(), error = %e, "handler output unusable, retrying");
                    turn.hint = Some(hint);
                    Ok(Node::Handle(kind))
                }
                _ => Ok(self.handler_failed(kind, e.to_string(), state, turn, events)),
            },
        }
    }

    fn after_reply(&self, kind: HandlerKind, turn: &mut TurnProgress) -> Node {
        match self.mode {
            HandlerMode::MultiHop => Node::Route,
            HandlerMode::SingleHop => {
                turn.finish_reason = format!("{} handler replied", kind.as_str());
                Node::Terminate
            }
        }
    }

    fn handler_failed(
        &self,
        kind: HandlerKind,
        message: String,
        state: &mut ConversationState,
        turn: &mut TurnProgress,
        events: &EventSink,
    ) -> Node {
        tracing::error!(thread_id = %state.thread_id, handler = kind.as_str(), error = %message, "handler failed");
        events.emit(GraphEvent::HandlerFailed {
            handler: kind,
            message: message.clone(),
        });
        state.push(Message::assistant(format!("Handler error: {message}")).with_name(kind.as_str()));
        turn.errored = true;
        self.after_reply(kind, turn)
    }

    /// 执行挂起的工具调用，结果写入会话后回到工具所属的处理器
    async fn execute_tool(
        &self,
        issuer: HandlerKind,
        state: &mut ConversationState,
        turn: &mut TurnProgress,
        events: &EventSink,
    ) -> Node {
        let Some(call) = turn.pending.take() else {
            return Node::Handle(issuer);
        };
        events.emit(GraphEvent::ToolCallStarted {
            call_id: call.call_id.clone(),
            handler: issuer,
            tool: call.tool.clone(),
            args: call.args.clone(),
        });

        let ctx = ToolContext::for_patient(state.patient_id);
        let owner = self.ownership.owner(&call.tool);
        let (ok, content) = match owner {
            Some(owner) if owner == issuer => self.handler(owner).execute_tool(&call, &ctx).await,
            Some(owner) => (
                false,
                format!(
                    "Error: {}",
                    AgentError::HallucinatedTool(format!(
                        "'{}' is not available to the {} handler (it belongs to {})",
                        call.tool,
                        issuer.as_str(),
                        owner.as_str()
                    ))
                ),
            ),
            None => (
                false,
                format!(
                    "Error: {}",
                    AgentError::HallucinatedTool(format!(
                        "unknown tool '{}'; available: {}",
                        call.tool,
                        self.handler(issuer).tools().tool_names().join(", ")
                    ))
                ),
            ),
        };

        events.emit(GraphEvent::ToolResult {
            call_id: call.call_id.clone(),
            tool: call.tool.clone(),
            ok,
            preview: preview(&content),
        });
        // 调用与结果成对写入，取消不会留下没有结果的调用
        let request = serde_json::json!({"tool": call.tool, "args": call.args}).to_string();
        state.push(
            Message::assistant(request)
                .with_name(issuer.as_str())
                .with_tool_call(call.meta()),
        );
        state.push(Message::tool(call.meta(), content));

        match owner {
            Some(owner) if owner == issuer => Node::Handle(owner),
            _ => Node::Handle(issuer),
        }
    }

    /// 流式执行一轮：返回事件流；流被丢弃时取消本轮（已提交的号源变更保留）
    pub fn stream_turn(self: &Arc<Self>, req: TurnRequest) -> impl Stream<Item = GraphEvent> + Send + 'static {
        let token = CancellationToken::new();
        let (sink, rx) = EventSink::channel();
        let engine = Arc::clone(self);
        let child = token.clone();
        tokio::spawn(async move {
            match engine.run_turn(req, &sink, &child).await {
                Ok(_) => {}
                Err(AgentError::Cancelled) => tracing::info!("turn cancelled by caller"),
                Err(e) => {
                    tracing::error!(error = %e, "turn failed");
                    sink.emit(GraphEvent::Fatal { message: e.to_string() });
                }
            }
        });
        let guard = token.drop_guard();
        stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|ev| (ev, (rx, guard)))
        })
    }
}

fn fallback_reply(reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("I'm sorry, I couldn't complete your request. {reason}"),
        None => "I'm sorry, I couldn't complete your request.".to_string(),
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 300 {
        format!("{}...", s.chars().take(300).collect::<String>())
    } else {
        s.to_string()
    }
}

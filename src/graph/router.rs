//! 路由器（supervisor）：决定下一个处理器或结束本轮
//!
//! 每次进入都递增跳数；超过上限或历史为空时直接结束，不调用 LLM。
//! 决策理由作为 assistant 消息（name = "router"）写入会话。

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::graph::parse::parse_decision;
use crate::graph::prompts::RoutingPolicy;
use crate::graph::{ConversationState, HandlerKind};
use crate::llm::LlmClient;
use crate::memory::Message;

/// 路由目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Handler(HandlerKind),
    Finish,
}

impl RouteTarget {
    /// 接受 "information" / "information_node" / "finish" / "FINISH" 等写法
    pub fn parse(raw: &str) -> Option<Self> {
        let n = raw.trim().to_ascii_lowercase();
        let n = n.strip_suffix("_node").unwrap_or(&n);
        match n {
            "information" | "info" => Some(RouteTarget::Handler(HandlerKind::Information)),
            "booking" => Some(RouteTarget::Handler(HandlerKind::Booking)),
            "finish" | "end" | "__end__" | "terminate" | "done" => Some(RouteTarget::Finish),
            _ => None,
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Handler(kind) => f.write_str(kind.as_str()),
            RouteTarget::Finish => f.write_str("finish"),
        }
    }
}

/// 一次路由决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub next: RouteTarget,
    pub reasoning: String,
    pub hop: u32,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    next: String,
    #[serde(default)]
    reasoning: String,
}

const DECISION_FORMAT: &str = r#"{"next": "information" | "booking" | "finish", "reasoning": "..."}"#;

pub struct Router {
    llm: Arc<dyn LlmClient>,
    policy: RoutingPolicy,
    recovery: RecoveryEngine,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmClient>, policy: RoutingPolicy) -> Self {
        Self {
            llm,
            policy,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn max_hops(&self) -> u32 {
        self.policy.max_hops
    }

    /// 进入路由：递增跳数，按策略决定去向，并把理由写入会话
    pub async fn route(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<RoutingDecision, AgentError> {
        let hop = state.enter_route();

        if state.messages().is_empty() {
            return Ok(self.finish(state, hop, "No user query found."));
        }
        // 第 max_hops 次进入路由即为终止跳，不再调用模型
        if hop >= self.policy.max_hops {
            tracing::warn!(thread_id = %state.thread_id, hop, max_hops = self.policy.max_hops, "hop ceiling reached");
            return Ok(self.finish(
                state,
                hop,
                &format!("Stopped after {} routing steps.", self.policy.max_hops),
            ));
        }

        let mut messages = vec![Message::system(self.policy.system_prompt())];
        if let Some(pid) = state.patient_id {
            messages.push(Message::user(format!("user's identification number is {pid}")));
        }
        messages.extend_from_slice(state.messages());

        let raw = match self.call(&messages, cancel).await {
            Ok(d) => d,
            Err(e) => match self.recovery.handle(&e, DECISION_FORMAT) {
                RecoveryAction::RetryWithPrompt(hint) => {
                    tracing::warn!(error = %e, hop, "router output unusable, retrying once");
                    messages.push(Message::system(hint));
                    self.call(&messages, cancel).await?
                }
                RecoveryAction::Abort => return Err(e),
            },
        };

        let (next, reasoning) = raw;
        tracing::info!(thread_id = %state.thread_id, hop, next = %next, reasoning = %reasoning, "route");
        state.push(Message::assistant(reasoning.clone()).with_name("router"));
        state.last_routing_reason = Some(reasoning.clone());
        Ok(RoutingDecision { next, reasoning, hop })
    }

    async fn call(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<(RouteTarget, String), AgentError> {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = self.llm.complete(messages) => r.map_err(AgentError::LlmError)?,
        };
        let d: RawDecision = parse_decision(&raw)?;
        let next = RouteTarget::parse(&d.next)
            .ok_or_else(|| AgentError::InvalidDecision(format!("unknown next '{}'", d.next)))?;
        let reasoning = if d.reasoning.trim().is_empty() {
            format!("Routing to {next}.")
        } else {
            d.reasoning.trim().to_string()
        };
        Ok((next, reasoning))
    }

    fn finish(&self, state: &mut ConversationState, hop: u32, reason: &str) -> RoutingDecision {
        state.last_routing_reason = Some(reason.to_string());
        RoutingDecision {
            next: RouteTarget::Finish,
            reasoning: reason.to_string(),
            hop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn router(mock: Arc<MockLlmClient>, max_hops: u32) -> Router {
        Router::new(mock, RoutingPolicy::new("policy", max_hops))
    }

    fn state_with_query() -> ConversationState {
        let mut s = ConversationState::new("t", None);
        s.begin_turn("q");
        s.push(Message::user("Is Dr. Sharma free on 16-06-2025?"));
        s
    }

    #[test]
    fn test_route_target_aliases() {
        assert_eq!(RouteTarget::parse("information_node"), Some(RouteTarget::Handler(HandlerKind::Information)));
        assert_eq!(RouteTarget::parse("BOOKING"), Some(RouteTarget::Handler(HandlerKind::Booking)));
        assert_eq!(RouteTarget::parse("FINISH"), Some(RouteTarget::Finish));
        assert_eq!(RouteTarget::parse("pharmacy"), None);
    }

    #[tokio::test]
    async fn test_empty_history_terminates_without_llm() {
        let mock = Arc::new(MockLlmClient::new());
        let r = router(mock.clone(), 10);
        let mut state = ConversationState::new("t", None);
        let d = r.route(&mut state, &CancellationToken::new()).await.unwrap();
        assert_eq!(d.next, RouteTarget::Finish);
        assert_eq!(d.reasoning, "No user query found.");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_decision_appends_reasoning() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"next": "information_node", "reasoning": "Availability question."}"#,
        ]));
        let r = router(mock, 10);
        let mut state = state_with_query();
        let d = r.route(&mut state, &CancellationToken::new()).await.unwrap();
        assert_eq!(d.next, RouteTarget::Handler(HandlerKind::Information));
        assert_eq!(d.hop, 1);
        let last = state.messages().last().unwrap();
        assert_eq!(last.name.as_deref(), Some("router"));
        assert_eq!(last.content, "Availability question.");
        assert_eq!(state.last_routing_reason.as_deref(), Some("Availability question."));
    }

    #[tokio::test]
    async fn test_hop_ceiling() {
        let mock = Arc::new(MockLlmClient::new().with_responder(|_| {
            Ok(r#"{"next": "booking", "reasoning": "again"}"#.to_string())
        }));
        let r = router(mock.clone(), 3);
        let mut state = state_with_query();
        for _ in 0..2 {
            let d = r.route(&mut state, &CancellationToken::new()).await.unwrap();
            assert_eq!(d.next, RouteTarget::Handler(HandlerKind::Booking));
        }
        let d = r.route(&mut state, &CancellationToken::new()).await.unwrap();
        assert_eq!(d.next, RouteTarget::Finish);
        assert_eq!(d.hop, 3);
        assert_eq!(d.reasoning, "Stopped after 3 routing steps.");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_next_retried_then_fails() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"next": "pharmacy", "reasoning": "x"}"#,
            r#"{"next": "pharmacy", "reasoning": "x"}"#,
        ]));
        let r = router(mock.clone(), 10);
        let err = r
            .route(&mut state_with_query(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidDecision(_)));
        assert_eq!(mock.call_count(), 2);
    }
}

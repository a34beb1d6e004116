//! 轮次分类器：这一轮是否需要进入领域处理
//!
//! 规则快速路径（问候、致谢、身份询问）直接作答，不调用 LLM；其余交给 LLM 输出
//! `{"next": "terminal" | "continue", "direct_answer"?, "rewritten_query"?}`。
//! 格式错误重试一次；决策内容不完整时退化为「继续 + 原始输入」并记录 warn。

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::graph::parse::parse_decision;
use crate::graph::prompts::render_classifier;
use crate::graph::ConversationState;
use crate::identity::IdentitySource;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 直接作答并结束本轮
    Terminal { answer: String },
    /// 以改写后的独立查询进入路由
    Continue { rewritten_query: String },
}

#[derive(Debug, Deserialize)]
struct ClassificationDecision {
    next: String,
    #[serde(default)]
    direct_answer: Option<String>,
    #[serde(default)]
    rewritten_query: Option<String>,
}

const DECISION_FORMAT: &str =
    r#"{"next": "terminal", "direct_answer": "..."} or {"next": "continue", "rewritten_query": "..."}"#;

/// 分类器上下文中最多带几条历史消息
const HISTORY_WINDOW: usize = 20;

const GREETING_ANSWER: &str =
    "Hello! I can help you check doctor availability and book, cancel or reschedule appointments. How can I help you today?";
const THANKS_ANSWER: &str = "You're welcome! Is there anything else I can help you with?";
const IDENTITY_ANSWER: &str =
    "I'm the clinic's appointment assistant. I can check doctor availability and book, cancel or reschedule appointments for you.";

fn normalize(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 规则匹配：只认完整的短句，避免吞掉 "hi, book me with Dr. Sharma" 之类的请求
pub fn fast_match(input: &str) -> Option<&'static str> {
    const GREETINGS: &[&str] = &[
        "hi", "hello", "hey", "hi there", "hello there", "good morning", "good afternoon", "good evening",
    ];
    const THANKS: &[&str] = &["thanks", "thank you", "thank you very much", "thanks a lot", "ok thanks"];
    const IDENTITY: &[&str] = &[
        "who are you",
        "what are you",
        "what can you do",
        "what is your name",
        "what's your name",
    ];
    let n = normalize(input);
    if GREETINGS.contains(&n.as_str()) {
        Some(GREETING_ANSWER)
    } else if THANKS.contains(&n.as_str()) {
        Some(THANKS_ANSWER)
    } else if IDENTITY.contains(&n.as_str()) {
        Some(IDENTITY_ANSWER)
    } else {
        None
    }
}

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    template: String,
    fast_match: bool,
    identity: IdentitySource,
    recovery: RecoveryEngine,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>, fast_match: bool, identity: IdentitySource) -> Self {
        Self {
            llm,
            template: template.into(),
            fast_match,
            identity,
            recovery: RecoveryEngine::new(),
        }
    }

    /// 对本轮原始输入分类；today 为 `DD-MM-YYYY`
    pub async fn classify(
        &self,
        state: &ConversationState,
        raw_query: &str,
        today: &str,
        cancel: &CancellationToken,
    ) -> Result<Classification, AgentError> {
        if self.fast_match {
            if let Some(answer) = fast_match(raw_query) {
                tracing::debug!(thread_id = %state.thread_id, "classifier fast path");
                return Ok(Classification::Terminal {
                    answer: answer.to_string(),
                });
            }
        }

        let mut messages = vec![Message::system(render_classifier(&self.template, today))];
        let history = state.messages();
        messages.extend_from_slice(&history[history.len().saturating_sub(HISTORY_WINDOW)..]);
        messages.push(Message::user(format!("User query: {raw_query}")));
        if let Some(pid) = state.patient_id {
            messages.push(Message::user(format!("patient_id: {pid}")));
        }

        let decision = match self.call(&messages, cancel).await {
            Ok(d) => d,
            Err(e) => match self.recovery.handle(&e, DECISION_FORMAT) {
                RecoveryAction::RetryWithPrompt(hint) => {
                    tracing::warn!(error = %e, "classifier output unusable, retrying once");
                    messages.push(Message::system(hint));
                    match self.call(&messages, cancel).await {
                        Ok(d) => d,
                        Err(AgentError::JsonParseError(raw)) => {
                            tracing::warn!(error = %raw, "classifier output still unusable, continuing with raw query");
                            return Ok(self.continue_with(raw_query, state));
                        }
                        Err(e) => return Err(e),
                    }
                }
                RecoveryAction::Abort => return Err(e),
            },
        };

        Ok(self.interpret(decision, raw_query, state))
    }

    async fn call(&self, messages: &[Message], cancel: &CancellationToken) -> Result<ClassificationDecision, AgentError> {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = self.llm.complete(messages) => r.map_err(AgentError::LlmError)?,
        };
        parse_decision(&raw)
    }

    fn interpret(&self, d: ClassificationDecision, raw_query: &str, state: &ConversationState) -> Classification {
        let answer = d.direct_answer.filter(|s| !s.trim().is_empty());
        let rewritten = d.rewritten_query.filter(|s| !s.trim().is_empty());
        match (d.next.trim().to_ascii_lowercase().as_str(), answer, rewritten) {
            ("terminal" | "finish" | "end", Some(answer), _) => Classification::Terminal {
                answer: answer.trim().to_string(),
            },
            ("continue", _, Some(rewritten)) => self.continue_with(&rewritten, state),
            (next, _, _) => {
                tracing::warn!(next = %next, "incomplete classifier decision, continuing with raw query");
                self.continue_with(raw_query, state)
            }
        }
    }

    /// 参数身份模式下，改写后的查询必须带上患者 ID
    fn continue_with(&self, query: &str, state: &ConversationState) -> Classification {
        let query = query.trim();
        let rewritten_query = match (self.identity, state.patient_id) {
            (IdentitySource::Arguments, Some(pid)) if !query.contains(&pid.to_string()) => {
                format!("{query} (patient_id: {pid})")
            }
            _ => query.to_string(),
        };
        Classification::Continue { rewritten_query }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::store::PatientId;

    fn classifier(mock: Arc<MockLlmClient>, identity: IdentitySource) -> Classifier {
        Classifier::new(mock, "today is {today}", true, identity)
    }

    fn state() -> ConversationState {
        ConversationState::new("1234567", PatientId::new(1234567))
    }

    #[test]
    fn test_fast_match_only_whole_phrases() {
        assert!(fast_match("Hello!").is_some());
        assert!(fast_match("  thank you ").is_some());
        assert!(fast_match("Who are you?").is_some());
        assert!(fast_match("hi, is Dr. Sharma free tomorrow?").is_none());
    }

    #[tokio::test]
    async fn test_greeting_skips_llm() {
        let mock = Arc::new(MockLlmClient::new());
        let c = classifier(mock.clone(), IdentitySource::Session);
        let out = c
            .classify(&state(), "hello", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(out, Classification::Terminal { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_with_rewrite_and_today_in_prompt() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"next": "continue", "rewritten_query": "Is Dr. Sharma available on 16-06-2025?"}"#,
        ]));
        let c = classifier(mock.clone(), IdentitySource::Session);
        let out = c
            .classify(&state(), "Is Dr. Sharma available tomorrow?", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            Classification::Continue {
                rewritten_query: "Is Dr. Sharma available on 16-06-2025?".to_string()
            }
        );
        assert_eq!(mock.calls()[0][0].content, "today is 15-06-2025");
    }

    #[tokio::test]
    async fn test_arguments_mode_embeds_patient_id() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"next": "continue", "rewritten_query": "Book Dr. Sharma at 16-06-2025 10:00"}"#,
        ]));
        let c = classifier(mock, IdentitySource::Arguments);
        let out = c
            .classify(&state(), "book sharma 10am tomorrow", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            Classification::Continue {
                rewritten_query: "Book Dr. Sharma at 16-06-2025 10:00 (patient_id: 1234567)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_terminal_without_answer_degrades() {
        let mock = Arc::new(MockLlmClient::scripted([r#"{"next": "terminal"}"#]));
        let c = classifier(mock, IdentitySource::Session);
        let out = c
            .classify(&state(), "what's up with my booking", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            Classification::Continue {
                rewritten_query: "what's up with my booking".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bad_json_retried_once() {
        let mock = Arc::new(MockLlmClient::scripted([
            "not json at all",
            r#"{"next": "terminal", "direct_answer": "We are open 9 to 5."}"#,
        ]));
        let c = classifier(mock.clone(), IdentitySource::Session);
        let out = c
            .classify(&state(), "opening hours?", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            Classification::Terminal {
                answer: "We are open 9 to 5.".to_string()
            }
        );
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_not_retried() {
        let mock = Arc::new(MockLlmClient::new().then_err("503"));
        let c = classifier(mock.clone(), IdentitySource::Session);
        let err = c
            .classify(&state(), "opening hours?", "15-06-2025", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LlmError(_)));
        assert_eq!(mock.call_count(), 1);
    }
}

//! 会话状态（每个线程一份，跨轮次持久化）

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::store::PatientId;

/// 一个对话线程的状态；消息只追加
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    messages: Vec<Message>,
    #[serde(default)]
    pub raw_query: String,
    #[serde(default)]
    pub rewritten_query: Option<String>,
    #[serde(default)]
    pub patient_id: Option<PatientId>,
    #[serde(default)]
    pub last_routing_reason: Option<String>,
    /// 本轮已进入路由的次数；每轮开始时归零
    #[serde(default)]
    pub hop_count: u32,
    /// 已处理的外部请求数
    #[serde(default)]
    pub turns: u64,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>, patient_id: Option<PatientId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            patient_id,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 新一轮外部请求：记录原始输入，清空本轮派生字段
    pub fn begin_turn(&mut self, raw_query: impl Into<String>) {
        self.raw_query = raw_query.into();
        self.rewritten_query = None;
        self.last_routing_reason = None;
        self.hop_count = 0;
        self.turns += 1;
    }

    /// 本轮进入路由；返回递增后的跳数
    pub fn enter_route(&mut self) -> u32 {
        self.hop_count += 1;
        self.hop_count
    }
}

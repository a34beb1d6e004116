//! Mock LLM 客户端（用于测试与本地运行，无需 API）
//!
//! 按脚本队列依次返回预设回复；队列耗尽后交给 responder（若设置），否则回显最后一条用户消息。
//! 每次调用收到的消息都会被记录，测试可据此断言某个节点是否调用过 LLM。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, TokenStream};
use crate::memory::{Message, Role};

type Responder = Arc<dyn Fn(&[Message]) -> Result<String, String> + Send + Sync>;

/// 脚本化 Mock 客户端
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<Vec<Message>>>,
    chunk_chars: usize,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
            chunk_chars: 8,
        }
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        if let Ok(mut script) = mock.script.lock() {
            script.extend(replies.into_iter().map(|r| Ok(r.into())));
        }
        mock
    }

    /// 在脚本末尾追加一条回复
    pub fn then(self, reply: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply.into()));
        }
        self
    }

    /// 在脚本末尾追加一次调用失败
    pub fn then_err(self, error: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error.into()));
        }
        self
    }

    /// 脚本耗尽后按消息内容生成回复
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, String> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(f));
        self
    }

    /// 流式输出时每个片段的字符数
    pub fn with_chunk_chars(mut self, n: usize) -> Self {
        self.chunk_chars = n.max(1);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 每次调用收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }
        if let Some(responder) = &self.responder {
            return responder(messages);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.next_reply(messages)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        let content = self.next_reply(messages)?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, String>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_script_then_echo() {
        let mock = MockLlmClient::scripted(["first"]).then_err("boom");
        let msgs = vec![Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap_err(), "boom");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_chunks_reassemble() {
        let mock = MockLlmClient::scripted(["a fairly long reply"]).with_chunk_chars(4);
        let mut stream = mock.complete_stream(&[Message::user("x")]).await.unwrap();
        let mut parts = Vec::new();
        while let Some(part) = stream.next().await {
            parts.push(part.unwrap());
        }
        assert!(parts.len() > 1);
        assert_eq!(parts.concat(), "a fairly long reply");
    }

    #[tokio::test]
    async fn test_responder_after_script() {
        let mock = MockLlmClient::new().with_responder(|msgs| Ok(format!("{} messages", msgs.len())));
        let out = mock
            .complete(&[Message::system("s"), Message::user("u")])
            .await
            .unwrap();
        assert_eq!(out, "2 messages");
    }
}

//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, TokenStream};

use crate::config::AppConfig;

/// 按 [llm].provider 创建客户端：deepseek（默认）/ openai / mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let llm = &cfg.llm;
    match llm.provider.to_ascii_lowercase().as_str() {
        "mock" => {
            tracing::warn!("using mock LLM backend");
            Arc::new(MockLlmClient::new())
        }
        "openai" => {
            let model = llm.model.as_deref().unwrap_or("gpt-4o-mini");
            let api_key = std::env::var("OPENAI_API_KEY").ok();
            Arc::new(
                OpenAiClient::new(llm.base_url.as_deref(), model, api_key.as_deref())
                    .with_timeout(llm.request_timeout_secs),
            )
        }
        other => {
            if other != "deepseek" {
                tracing::warn!(provider = %other, "unknown llm provider, falling back to deepseek");
            }
            Arc::new(
                create_deepseek_client(llm.model.as_deref(), llm.base_url.as_deref())
                    .with_timeout(llm.request_timeout_secs),
            )
        }
    }
}

pub mod anthropic_client;
pub mod embedding_client;
pub mod llm_client;
pub mod mathpix_client;
pub mod openai_client;
pub mod polling;

pub use anthropic_client::AnthropicClient;
pub use embedding_client::{EmbeddingProvider, OpenAiEmbeddingClient};
pub use llm_client::{
    run_batch_with_fallback, BatchItemResult, BatchOutcome, BatchRequest, BatchStatus,
    LlmProvider, LlmRequest, MessageContent,
};
pub use mathpix_client::MathpixClient;
pub use openai_client::OpenAiCompatClient;
pub use polling::{PollPolicy, PollState};

use crate::config::{Config, LlmProviderKind};
use crate::error::AppResult;

/// 根据配置创建 LLM 客户端
pub fn build_llm_provider(config: &Config) -> AppResult<Box<dyn LlmProvider>> {
    Ok(match config.llm_provider {
        LlmProviderKind::Anthropic => Box::new(AnthropicClient::from_config(config)?),
        LlmProviderKind::OpenAi => Box::new(OpenAiCompatClient::from_config(config)?),
    })
}

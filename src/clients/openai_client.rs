//! OpenAI 兼容接口客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 只支持同步调用，批处理方法返回 `Unsupported`，由调用方逐条回退。

use crate::clients::llm_client::{
    BatchItemResult, BatchRequest, BatchStatus, LlmProvider, LlmRequest,
};
use crate::config::Config;
use crate::error::{AppResult, ProviderError};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// OpenAI 兼容客户端
pub struct OpenAiCompatClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiCompatClient {
    pub fn new(api_key: &str, api_base_url: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base_url);

        Self {
            client: Client::with_config(openai_config),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let key = config.require_llm_key()?;
        Ok(Self::new(key, &config.llm_api_base_url))
    }

    fn unsupported(operation: &str) -> ProviderError {
        ProviderError::Unsupported {
            provider: "openai".to_string(),
            operation: operation.to_string(),
        }
    }
}

fn build_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidResponse {
        endpoint: "chat/completions".to_string(),
        message: format!("请求构建失败: {}", e),
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError> {
        debug!("调用 LLM API，模型: {}", request.model);
        debug!("用户消息长度: {} 字符", request.prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()
            .map_err(build_error)?;
        let messages = vec![ChatCompletionRequestMessage::User(user_msg)];

        // 兼容接口没有 thinking 参数，预算被忽略
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&request.model)
            .messages(messages)
            .max_tokens(request.max_tokens);
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }
        let chat_request = builder.build().map_err(build_error)?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            ProviderError::RequestFailed {
                endpoint: "chat/completions".to_string(),
                source: Box::new(e),
            }
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::InvalidResponse {
                endpoint: "chat/completions".to_string(),
                message: "LLM 返回内容为空".to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    async fn submit_batch(&self, _requests: &[BatchRequest]) -> Result<String, ProviderError> {
        Err(Self::unsupported("submit_batch"))
    }

    async fn batch_status(&self, _batch_id: &str) -> Result<BatchStatus, ProviderError> {
        Err(Self::unsupported("batch_status"))
    }

    async fn batch_results(&self, _batch_id: &str) -> Result<Vec<BatchItemResult>, ProviderError> {
        Err(Self::unsupported("batch_results"))
    }
}

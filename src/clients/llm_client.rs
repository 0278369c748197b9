//! LLM 客户端抽象 - 基础设施层
//!
//! 职责：
//! - 定义 `LlmProvider` trait（同步调用 + 批处理）
//! - 把各家响应内容统一成 `String`
//! - 提供"批处理失败就逐条调用"的通用流程
//!
//! 不关心提示词内容，也不解析响应。

use crate::clients::polling::{PollPolicy, PollState};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 一次 LLM 调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    pub model: String,
    /// 用户消息
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// extended thinking 的 token 预算，None 表示关闭
    pub thinking_budget: Option<u32>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: None,
            thinking_budget: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// 开启 thinking，预算为 0 时不开启
    pub fn with_thinking(mut self, budget: u32) -> Self {
        self.thinking_budget = (budget > 0).then_some(budget);
        self
    }
}

/// 批处理中的一条请求，`custom_id` 由调用方指定
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub custom_id: String,
    pub request: LlmRequest,
}

/// 批处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    Canceling,
    Ended,
}

/// 批处理中单条请求的结果
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Succeeded(String),
    /// errored / canceled / expired，附带原因
    Errored(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResult {
    pub custom_id: String,
    pub outcome: BatchOutcome,
}

/// 响应内容：纯文本或内容块列表
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

impl MessageContent {
    /// 拼接所有文本块，thinking 等其他块被丢弃
    pub fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// LLM 服务
///
/// 批处理相关方法对不支持批处理的服务返回 `ProviderError::Unsupported`，
/// 调用方统一走 [`run_batch_with_fallback`]。
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 服务名称，用于日志
    fn name(&self) -> &str;

    /// 同步调用，返回归一化后的文本
    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError>;

    /// 提交批处理，返回批次 ID
    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, ProviderError>;

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ProviderError>;

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchItemResult>, ProviderError>;
}

/// 提交批处理并等待结果
///
/// 返回 custom_id → 响应文本；失败的条目不在结果中。
pub async fn run_batch(
    provider: &dyn LlmProvider,
    requests: &[BatchRequest],
    poll: &PollPolicy,
) -> Result<HashMap<String, String>, ProviderError> {
    let batch_id = provider.submit_batch(requests).await?;
    info!(
        "📦 [{}] 已提交批处理 {} ({} 条请求)",
        provider.name(),
        batch_id,
        requests.len()
    );

    let id = batch_id.as_str();
    poll.run(&format!("批处理 {}", id), || async move {
        provider.batch_status(id).await.map(|status| match status {
            BatchStatus::Ended => PollState::Ready(()),
            BatchStatus::InProgress => PollState::Pending("in_progress".to_string()),
            BatchStatus::Canceling => PollState::Pending("canceling".to_string()),
        })
    })
    .await?;

    let mut responses = HashMap::new();
    for item in provider.batch_results(id).await? {
        match item.outcome {
            BatchOutcome::Succeeded(text) => {
                responses.insert(item.custom_id, text);
            }
            BatchOutcome::Errored(reason) => {
                warn!("批处理条目 {} 失败: {}", item.custom_id, reason);
            }
        }
    }
    Ok(responses)
}

/// 逐条同步调用，失败的条目被记录并跳过
pub async fn run_sequential(
    provider: &dyn LlmProvider,
    requests: &[BatchRequest],
) -> HashMap<String, String> {
    let mut responses = HashMap::new();
    for (i, item) in requests.iter().enumerate() {
        debug!("逐条调用 {}/{}: {}", i + 1, requests.len(), item.custom_id);
        match provider.complete(&item.request).await {
            Ok(text) => {
                responses.insert(item.custom_id.clone(), text);
            }
            Err(e) => warn!("❌ {} 调用失败: {}", item.custom_id, e),
        }
    }
    responses
}

/// 优先走批处理；提交、轮询或取结果任一步失败时改为逐条调用
///
/// 两条路径返回的结构完全相同。
pub async fn run_batch_with_fallback(
    provider: &dyn LlmProvider,
    requests: &[BatchRequest],
    poll: &PollPolicy,
) -> HashMap<String, String> {
    if requests.is_empty() {
        return HashMap::new();
    }

    match run_batch(provider, requests, poll).await {
        Ok(responses) => {
            info!("✓ 批处理完成: {}/{} 条成功", responses.len(), requests.len());
            responses
        }
        Err(ProviderError::Unsupported { .. }) => {
            debug!("[{}] 不支持批处理，逐条调用", provider.name());
            run_sequential(provider, requests).await
        }
        Err(e) => {
            warn!("⚠️ 批处理失败，改为逐条调用: {}", e);
            run_sequential(provider, requests).await
        }
    }
}

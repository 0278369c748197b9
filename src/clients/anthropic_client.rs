//! Anthropic Messages API 客户端
//!
//! 同步调用走 `/messages`，批处理走 `/messages/batches`。

use crate::clients::llm_client::{
    BatchItemResult, BatchOutcome, BatchRequest, BatchStatus, LlmProvider, LlmRequest,
    MessageContent,
};
use crate::config::Config;
use crate::error::{AppResult, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ThinkingParam {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

/// `/messages` 请求体，批处理中作为 `params` 复用
#[derive(Debug, Serialize)]
struct MessagesParams<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingParam>,
}

impl<'a> From<&'a LlmRequest> for MessagesParams<'a> {
    fn from(request: &'a LlmRequest) -> Self {
        let thinking = request.thinking_budget.map(|budget| ThinkingParam {
            kind: "enabled",
            budget_tokens: budget,
        });
        // 开启 thinking 时接口要求 temperature 为 1
        let temperature = if thinking.is_some() {
            Some(1.0)
        } else {
            request.temperature
        };
        Self {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature,
            thinking,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchEntry<'a> {
    custom_id: &'a str,
    params: MessagesParams<'a>,
}

#[derive(Debug, Serialize)]
struct CreateBatchBody<'a> {
    requests: Vec<BatchEntry<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    processing_status: String,
    #[serde(default)]
    results_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResultLine {
    custom_id: String,
    result: BatchResultBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BatchResultBody {
    Succeeded { message: MessagesResponse },
    Errored {
        #[serde(default)]
        error: Value,
    },
    Canceled,
    Expired,
}

/// Anthropic 客户端
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 从配置创建，缺少 API key 时返回配置错误
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let key = config.require_llm_key()?;
        Ok(Self::new(key, &config.llm_api_base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    async fn send(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("{} 返回 {}: {}", endpoint, status, body);
            return Err(ProviderError::BadStatus {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    async fn fetch_batch(&self, batch_id: &str) -> Result<BatchObject, ProviderError> {
        let url = self.url(&format!("messages/batches/{}", batch_id));
        let response = self.send("messages/batches", self.get(&url)).await?;
        Self::json(&url, response).await
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError> {
        debug!("调用 Anthropic API，模型: {}", request.model);
        let url = self.url("messages");
        let body = MessagesParams::from(request);
        let response = self.send("messages", self.post(&url).json(&body)).await?;
        let parsed: MessagesResponse = Self::json("messages", response).await?;
        Ok(parsed.content.into_text().trim().to_string())
    }

    async fn submit_batch(&self, requests: &[BatchRequest]) -> Result<String, ProviderError> {
        let url = self.url("messages/batches");
        let body = CreateBatchBody {
            requests: requests
                .iter()
                .map(|r| BatchEntry {
                    custom_id: &r.custom_id,
                    params: MessagesParams::from(&r.request),
                })
                .collect(),
        };
        let response = self
            .send("messages/batches", self.post(&url).json(&body))
            .await?;
        let batch: BatchObject = Self::json("messages/batches", response).await?;
        Ok(batch.id)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ProviderError> {
        let batch = self.fetch_batch(batch_id).await?;
        parse_processing_status(&batch.processing_status)
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchItemResult>, ProviderError> {
        let batch = self.fetch_batch(batch_id).await?;
        let url = batch
            .results_url
            .unwrap_or_else(|| self.url(&format!("messages/batches/{}/results", batch_id)));
        let response = self.send("messages/batches/results", self.get(&url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: url.clone(),
                source: Box::new(e),
            })?;
        Ok(parse_batch_results(&body))
    }
}

fn parse_processing_status(status: &str) -> Result<BatchStatus, ProviderError> {
    match status {
        "in_progress" => Ok(BatchStatus::InProgress),
        "canceling" => Ok(BatchStatus::Canceling),
        "ended" => Ok(BatchStatus::Ended),
        other => Err(ProviderError::InvalidResponse {
            endpoint: "messages/batches".to_string(),
            message: format!("未知的 processing_status: {}", other),
        }),
    }
}

/// 解析 JSONL 结果流，无法解析的行被记录并跳过
fn parse_batch_results(body: &str) -> Vec<BatchItemResult> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<BatchResultLine>(line) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("跳过无法解析的批处理结果行: {}", e);
                None
            }
        })
        .map(|line| {
            let outcome = match line.result {
                BatchResultBody::Succeeded { message } => {
                    BatchOutcome::Succeeded(message.content.into_text().trim().to_string())
                }
                BatchResultBody::Errored { error } => BatchOutcome::Errored(error.to_string()),
                BatchResultBody::Canceled => BatchOutcome::Errored("canceled".to_string()),
                BatchResultBody::Expired => BatchOutcome::Errored("expired".to_string()),
            };
            BatchItemResult {
                custom_id: line.custom_id,
                outcome,
            }
        })
        .collect()
}

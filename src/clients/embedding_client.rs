//! 文本向量化客户端
//!
//! `EmbeddingProvider` 屏蔽具体模型，向量化阶段和打标签阶段只依赖该 trait。

use crate::config::Config;
use crate::error::{AppResult, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 单次请求的最大输入条数
const MAX_INPUTS_PER_REQUEST: usize = 100;

/// 文本向量化服务
///
/// 同一模型、同一输入必须返回相同的向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// 批量向量化，输出顺序与输入一致
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::InvalidResponse {
            endpoint: "embeddings".to_string(),
            message: "返回向量为空".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI 兼容的 `/embeddings` 接口
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let key = config.require_embedding_key()?;
        Ok(Self::new(
            key,
            &config.embedding_api_base_url,
            &config.embedding_model,
        ))
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: url.clone(),
                source: Box::new(e),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::BadStatus {
                endpoint: url,
                status,
                body,
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    endpoint: url.clone(),
                    message: e.to_string(),
                })?;
        order_by_index(parsed.data, texts.len())
    }
}

/// 按 `index` 还原输入顺序，数量不符视为响应错误
fn order_by_index(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::InvalidResponse {
            endpoint: "embeddings".to_string(),
            message: format!("期望 {} 个向量，实际 {} 个", expected, data.len()),
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(MAX_INPUTS_PER_REQUEST).enumerate() {
            debug!("向量化第 {} 组，{} 条", i + 1, chunk.len());
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_index_restores_input_order() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![0.0, 1.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0, 0.0],
            },
        ];
        let ordered = order_by_index(data, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_order_by_index_rejects_count_mismatch() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![1.0],
        }];
        assert!(order_by_index(data, 2).is_err());
    }

    #[tokio::test]
    #[ignore] // 需要 EMBEDDING_API_KEY
    async fn test_live_embedding() {
        let config = Config::from_env().unwrap();
        let client = OpenAiEmbeddingClient::from_config(&config).unwrap();
        let vector = client.embed("[MCQ] 1. What is X?").await.unwrap();
        assert!(!vector.is_empty());
    }
}

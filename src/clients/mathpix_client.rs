//! Mathpix PDF OCR 客户端
//!
//! 职责：
//! - 上传 PDF（multipart: `file` + `options_json`），取得 `pdf_id`
//! - 查询处理状态并按 `PollPolicy` 等待
//! - 读取 NDJSON 流式结果
//! - 按扩展名直接下载转换结果

use crate::clients::polling::{PollPolicy, PollState};
use crate::config::Config;
use crate::error::{AppResult, ProviderError};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    pdf_id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// 上传选项
///
/// `streaming` 只对题目抽取开启，`conversion_formats` 固定请求 md
pub fn upload_options(streaming: bool) -> Value {
    json!({
        "streaming": streaming,
        "include_equation_tags": true,
        "include_smiles": true,
        "include_chemistry_as_image": true,
        "include_diagram_text": true,
        "numbers_default_to_math": true,
        "math_inline_delimiters": ["$", "$"],
        "math_display_delimiters": ["$$", "$$"],
        "page_ranges": "1-",
        "enable_spell_check": true,
        "auto_number_sections": true,
        "remove_section_numbering": false,
        "preserve_section_numbering": false,
        "enable_tables_fallback": true,
        "fullwidth_punctuation": false,
        "conversion_formats": { "md": true }
    })
}

/// 按到达顺序拼接所有带 `text` 字段的分块
pub fn concat_stream_text(chunks: &[Value]) -> String {
    chunks
        .iter()
        .filter_map(|chunk| chunk.get("text").and_then(Value::as_str))
        .collect()
}

/// 从缓冲区取出所有完整的行，剩余的半行留在缓冲区
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim().to_string());
    }
    lines
}

fn parse_chunk(line: &str, chunks: &mut Vec<Value>) {
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(chunk) => {
            if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                debug!("收到分块: {}", crate::utils::truncate_text(text, 50));
            }
            chunks.push(chunk);
        }
        Err(_) => warn!("无法解析的流式行: {}", crate::utils::truncate_text(line, 80)),
    }
}

/// Mathpix 客户端
pub struct MathpixClient {
    http: reqwest::Client,
    app_id: String,
    app_key: String,
    base_url: String,
}

impl MathpixClient {
    pub fn new(
        app_id: impl Into<String>,
        app_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id: app_id.into(),
            app_key: app_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 从配置创建，缺少凭据时返回配置错误
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let (app_id, app_key) = config.require_mathpix()?;
        Ok(Self::new(app_id, app_key, &config.mathpix_base_url))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("app_id", &self.app_id)
            .header("app_key", &self.app_key)
    }

    async fn send(
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
            return Err(ProviderError::BadStatus {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }

    /// 上传 PDF，返回 `pdf_id`
    pub async fn upload_pdf(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: &Value,
    ) -> Result<String, ProviderError> {
        info!("📤 上传 PDF: {}", file_name);

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: self.base_url.clone(),
                source: Box::new(e),
            })?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("options_json", options.to_string());

        let builder = self
            .http
            .post(&self.base_url)
            .header("app_id", &self.app_id)
            .header("app_key", &self.app_key)
            .multipart(form);
        let response = Self::send(&self.base_url, builder).await?;

        let parsed: UploadResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    endpoint: self.base_url.clone(),
                    message: e.to_string(),
                })?;

        match parsed.pdf_id {
            Some(id) => {
                info!("✓ 上传成功，pdf_id: {}", id);
                Ok(id)
            }
            None => Err(ProviderError::InvalidResponse {
                endpoint: self.base_url.clone(),
                message: format!(
                    "响应中没有 pdf_id: {}",
                    parsed.error.map(|e| e.to_string()).unwrap_or_default()
                ),
            }),
        }
    }

    /// 查询一次处理状态
    pub async fn check_status(&self, pdf_id: &str) -> Result<PollState<()>, ProviderError> {
        let url = format!("{}/{}", self.base_url, pdf_id);
        let response = Self::send(&url, self.get(&url)).await?;
        let parsed: StatusResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    endpoint: url.clone(),
                    message: e.to_string(),
                })?;

        let status = parsed.status.unwrap_or_default();
        Ok(match status.as_str() {
            "completed" => PollState::Ready(()),
            "error" | "failed" => PollState::Failed(format!(
                "{} {}",
                status,
                parsed.error.map(|e| e.to_string()).unwrap_or_default()
            )),
            _ => PollState::Pending(status),
        })
    }

    /// 等待处理完成
    pub async fn wait_for_processing(
        &self,
        pdf_id: &str,
        poll: &PollPolicy,
    ) -> Result<(), ProviderError> {
        poll.run(&format!("OCR {}", pdf_id), move || self.check_status(pdf_id))
            .await
    }

    /// 读取流式结果，返回全部 JSON 分块
    pub async fn stream_pdf(&self, pdf_id: &str) -> Result<Vec<Value>, ProviderError> {
        let url = format!("{}/{}/stream", self.base_url, pdf_id);
        info!("📡 开始读取流式结果: {}", pdf_id);
        let response = Self::send(&url, self.get(&url)).await?;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunks = Vec::new();

        while let Some(item) = stream.next().await {
            let bytes = item.map_err(|e| ProviderError::RequestFailed {
                endpoint: url.clone(),
                source: Box::new(e),
            })?;
            buffer.extend_from_slice(&bytes);
            for line in drain_lines(&mut buffer) {
                parse_chunk(&line, &mut chunks);
            }
        }
        // 最后一行可能没有换行符
        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        parse_chunk(&rest, &mut chunks);

        info!("✓ 流式读取完成，共 {} 个分块", chunks.len());
        Ok(chunks)
    }

    /// 下载指定格式的转换结果，`ext` 形如 `mmd`、`md`、`lines.mmd.json`
    pub async fn download_format(&self, pdf_id: &str, ext: &str) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/{}.{}", self.base_url, pdf_id, ext);
        let response = Self::send(&url, self.get(&url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: url.clone(),
                source: Box::new(e),
            })?;
        Ok(bytes.to_vec())
    }
}

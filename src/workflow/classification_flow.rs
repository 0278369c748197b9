//! 第一遍定位/分类流程 - 流程层
//!
//! 核心职责：定义"一批文档"的第一遍处理
//!
//! 流程顺序：
//! 1. 读取 OCR 文本，填入提示词模板
//! 2. 批处理提交（失败则逐条调用）
//! 3. 解析三行文本块，写入 `<stem>_post1.json`
//!
//! 一个锚点都解析不出来的文档视为失败，不写文件，下次运行会重试。

use crate::clients::llm_client::{run_batch_with_fallback, BatchRequest, LlmProvider, LlmRequest};
use crate::clients::polling::PollPolicy;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::loaders::write_json_atomic;
use crate::services::response_parser::parse_anchor_blocks;
use crate::workflow::document_ctx::DocumentCtx;
use tracing::{error, info, warn};

/// 提示词模板文件
pub const CLASSIFY_PROMPT_FILE: &str = "locate_classify_subques.txt";

/// 单个工作单元的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// 处理成功
    Success,
    /// 跳过（已有结果）
    Skipped,
    /// 失败，下次运行重试
    Failed,
}

/// 过滤出需要处理的文档：已有 `_post1.json` 的跳过，除非 `force`
///
/// 返回 (待处理文档, 跳过数)
pub fn pending(docs: Vec<DocumentCtx>, force: bool) -> (Vec<DocumentCtx>, usize) {
    let mut queue = Vec::with_capacity(docs.len());
    let mut skipped = 0;
    for ctx in docs {
        if !force && ctx.post1_path().exists() {
            info!("{} ⏭️ 已有定位结果，跳过", ctx);
            skipped += 1;
        } else {
            queue.push(ctx);
        }
    }
    (queue, skipped)
}

/// 第一遍处理流程
pub struct ClassificationFlow<'a> {
    provider: &'a dyn LlmProvider,
    template: String,
    model: String,
    poll: PollPolicy,
}

impl<'a> ClassificationFlow<'a> {
    pub fn new(config: &Config, provider: &'a dyn LlmProvider, template: String) -> Self {
        Self {
            provider,
            template,
            model: config.classify_model.clone(),
            poll: config.batch_poll.clone(),
        }
    }

    pub fn build_prompt(&self, text_extract: &str) -> String {
        self.template.replace("{{text_extract}}", text_extract)
    }

    fn request(&self, text_extract: &str) -> LlmRequest {
        LlmRequest::new(&self.model, self.build_prompt(text_extract))
            .with_max_tokens(8192)
            .with_temperature(0.2)
    }

    /// 处理一批文档，结果顺序与输入一致
    pub async fn run_batch(&self, docs: &[DocumentCtx]) -> Vec<ProcessResult> {
        let mut results = vec![ProcessResult::Failed; docs.len()];
        let mut requests = Vec::with_capacity(docs.len());

        for (i, ctx) in docs.iter().enumerate() {
            match tokio::fs::read_to_string(&ctx.text_path).await {
                Ok(text) => requests.push(BatchRequest {
                    custom_id: format!("file_{}", i),
                    request: self.request(&text),
                }),
                Err(e) => error!("{} ❌ 读取 OCR 文本失败: {}", ctx, e),
            }
        }

        info!("📤 提交 {} 个文档进行定位/分类", requests.len());
        let mut responses = run_batch_with_fallback(self.provider, &requests, &self.poll).await;

        for (i, ctx) in docs.iter().enumerate() {
            let Some(response) = responses.remove(&format!("file_{}", i)) else {
                continue;
            };
            results[i] = match self.save_anchors(ctx, &response).await {
                Ok(count) => {
                    info!("{} ✓ 识别出 {} 道题", ctx, count);
                    ProcessResult::Success
                }
                Err(e) => {
                    warn!("{} ⚠️ {}", ctx, e);
                    ProcessResult::Failed
                }
            };
        }

        results
    }

    async fn save_anchors(&self, ctx: &DocumentCtx, response: &str) -> AppResult<usize> {
        let anchors = parse_anchor_blocks(response)?;
        write_json_atomic(&ctx.post1_path(), &anchors)
            .await
            .map_err(|e| {
                error!("{} ❌ 写入 {} 失败", ctx, ctx.post1_path().display());
                e
            })?;
        Ok(anchors.len())
    }
}

//! 大纲结构化流程 - 流程层
//!
//! 一份大纲 OCR 文本（`<stem>.md`）→ 一次 LLM 调用 → `<stem>_analyzed.json`

use crate::clients::llm_client::{LlmProvider, LlmRequest};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::loaders::write_json_atomic;
use crate::models::syllabus::Syllabus;
use crate::services::response_parser::parse_syllabus;
use crate::workflow::classification_flow::ProcessResult;
use crate::workflow::document_ctx::DocumentCtx;
use tracing::{info, warn};

/// 提示词模板文件
pub const SYLLABUS_PROMPT_FILE: &str = "syllabus.txt";

/// 结构化结果文件后缀
pub const ANALYZED_SUFFIX: &str = "_analyzed.json";

pub struct SyllabusFlow<'a> {
    provider: &'a dyn LlmProvider,
    template: String,
    model: String,
}

impl<'a> SyllabusFlow<'a> {
    pub fn new(config: &Config, provider: &'a dyn LlmProvider, template: String) -> Self {
        Self {
            provider,
            template,
            model: config.syllabus_model.clone(),
        }
    }

    pub fn build_prompt(&self, syllabus_text: &str) -> String {
        self.template.replace("{{syllabus_text}}", syllabus_text)
    }

    /// 处理一份大纲；已有结果时跳过
    pub async fn run(&self, ctx: &DocumentCtx) -> ProcessResult {
        let output = ctx.derived(ANALYZED_SUFFIX);
        if output.exists() {
            info!("{} ⏭️ 已有结构化结果，跳过", ctx);
            return ProcessResult::Skipped;
        }

        match self.analyze(ctx).await {
            Ok(syllabus) => {
                info!(
                    "{} ✓ 课程 '{}'，{} 个主题",
                    ctx,
                    syllabus.course_name,
                    syllabus.topics.len()
                );
                ProcessResult::Success
            }
            Err(e) => {
                warn!("{} ⚠️ {}", ctx, e);
                ProcessResult::Failed
            }
        }
    }

    async fn analyze(&self, ctx: &DocumentCtx) -> AppResult<Syllabus> {
        let text = tokio::fs::read_to_string(&ctx.text_path)
            .await
            .map_err(|e| AppError::file_read_failed(ctx.text_path.display().to_string(), e))?;

        let request = LlmRequest::new(&self.model, self.build_prompt(&text))
            .with_max_tokens(8192)
            .with_temperature(0.2);
        let response = self.provider.complete(&request).await?;

        let syllabus = parse_syllabus(&response)?;
        write_json_atomic(&ctx.derived(ANALYZED_SUFFIX), &syllabus).await?;
        Ok(syllabus)
    }
}

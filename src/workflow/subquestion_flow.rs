//! 子题复核流程 - 流程层
//!
//! 核心职责：对第一遍标为"子题独立"的题目做第二遍判断
//!
//! 流程顺序：
//! 1. 选出 `sub_questions_independent == true` 的题目
//! 2. 按 `batch_size` 分批提交（失败则逐条调用）
//! 3. 解析判断结果 → 改为不独立 / 拆分子题 / 保持不变
//! 4. 所有批次完成后一次性更新题库
//!
//! 解析失败的题目保持原样，不会被删除。

use crate::clients::llm_client::{run_batch_with_fallback, BatchRequest, LlmProvider, LlmRequest};
use crate::clients::polling::PollPolicy;
use crate::config::Config;
use crate::models::bank::{QuestionBank, RecordUpdate};
use crate::models::question::QuestionRecord;
use crate::services::response_parser::parse_judgment;
use crate::services::subquestion_splitter::{apply_judgment, SplitDecision};
use tracing::{debug, info, warn};

/// 提示词模板文件
pub const SUBQUESTION_PROMPT_FILE: &str = "sub_ques_dependency.txt";

/// 子题复核统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubQuestionStats {
    /// 复核过的题目数（含空文本和解析失败）
    pub processed: usize,
    /// 改为不独立的题目数
    pub updated: usize,
    /// 新增的子题数
    pub extracted: usize,
    /// 拆分掉的父题数
    pub split: usize,
    /// 空文本、解析失败或找不到子题锚点
    pub unchanged: usize,
}

/// 子题复核流程
pub struct SubQuestionFlow<'a> {
    provider: &'a dyn LlmProvider,
    template: String,
    model: String,
    thinking_budget: u32,
    batch_size: usize,
    poll: PollPolicy,
}

impl<'a> SubQuestionFlow<'a> {
    pub fn new(config: &Config, provider: &'a dyn LlmProvider, template: String) -> Self {
        Self {
            provider,
            template,
            model: config.subquestion_model.clone(),
            thinking_budget: config.subquestion_thinking_budget,
            batch_size: config.batch_size.max(1),
            poll: config.batch_poll.clone(),
        }
    }

    pub fn build_prompt(&self, question_text: &str) -> String {
        self.template.replace("{{question_text}}", question_text)
    }

    fn request(&self, question_text: &str) -> LlmRequest {
        LlmRequest::new(&self.model, self.build_prompt(question_text))
            .with_max_tokens(4096)
            .with_temperature(1.0)
            .with_thinking(self.thinking_budget)
    }

    /// 复核整个题库并一次性写入修改
    pub async fn process_bank(&self, bank: &mut QuestionBank) -> SubQuestionStats {
        let (updates, stats) = self.collect_updates(bank).await;
        let summary = bank.apply_updates(updates);
        debug!(
            "题库更新: 改为不独立 {}, 删除 {}, 追加 {}",
            summary.marked_dependent, summary.removed, summary.appended
        );
        stats
    }

    /// 只计算修改，不改动题库
    pub async fn collect_updates(
        &self,
        bank: &QuestionBank,
    ) -> (Vec<(usize, RecordUpdate)>, SubQuestionStats) {
        let mut stats = SubQuestionStats::default();
        let mut updates = Vec::new();

        let mut candidates: Vec<(usize, &QuestionRecord)> = Vec::new();
        for (idx, record) in bank.iter().enumerate() {
            if !record.is_split_candidate() {
                continue;
            }
            if record.question_text.trim().is_empty() {
                debug!("[题目 {}] 文本为空，跳过", record.question_number);
                stats.processed += 1;
                stats.unchanged += 1;
                continue;
            }
            candidates.push((idx, record));
        }

        info!("🔍 待复核题目: {} 道", candidates.len());
        let total_batches = candidates.len().div_ceil(self.batch_size);

        for (batch_no, chunk) in candidates.chunks(self.batch_size).enumerate() {
            info!("⏳ 子题复核批次 {}/{} ({} 道)", batch_no + 1, total_batches, chunk.len());

            let requests: Vec<BatchRequest> = chunk
                .iter()
                .map(|(idx, record)| BatchRequest {
                    custom_id: format!("question_{}", idx),
                    request: self.request(&record.question_text),
                })
                .collect();
            let mut responses = run_batch_with_fallback(self.provider, &requests, &self.poll).await;

            for &(idx, record) in chunk {
                stats.processed += 1;
                let Some(response) = responses.remove(&format!("question_{}", idx)) else {
                    stats.unchanged += 1;
                    continue;
                };

                let judgment = match parse_judgment(&response) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("[题目 {}] ⚠️ {}", record.question_number, e);
                        stats.unchanged += 1;
                        continue;
                    }
                };

                match apply_judgment(record, &judgment) {
                    SplitDecision::MarkDependent => {
                        stats.updated += 1;
                        updates.push((idx, RecordUpdate::MarkDependent));
                    }
                    SplitDecision::Split(result) => {
                        stats.split += 1;
                        stats.extracted += result.children.len();
                        let children = result.children.into_iter().map(|c| c.record).collect();
                        updates.push((idx, RecordUpdate::Replace(children)));
                    }
                    SplitDecision::Unchanged => {
                        debug!("[题目 {}] 未找到可用子题锚点，保持不变", record.question_number);
                        stats.unchanged += 1;
                    }
                }
            }
        }

        (updates, stats)
    }
}

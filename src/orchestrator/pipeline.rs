//! 流水线入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：写日志文件头、打印启动信息
//! 2. **阶段调度**：按 `--stage` 运行单个阶段，或按 ocr → classify → bank → subquestions 运行全部
//! 3. **资源创建**：每个阶段按需创建客户端（凭据缺失即终止）
//! 4. **全局统计**：每个阶段结束输出计数
//!
//! 只有配置错误会终止运行；其他阶段错误被记录后继续下一个阶段，
//! 失败的工作单元在下次运行时重试。

use crate::clients::embedding_client::OpenAiEmbeddingClient;
use crate::clients::mathpix_client::MathpixClient;
use crate::clients::build_llm_provider;
use crate::config::Config;
use crate::error::{AppError, AppResult, FileError};
use crate::models::bank::QuestionBank;
use crate::orchestrator::bank_assembler;
use crate::orchestrator::embedding_stage::EmbeddingStage;
use crate::orchestrator::extraction_target::ExtractionTarget;
use crate::orchestrator::ocr_stage::OcrStage;
use crate::orchestrator::tagging_stage::{resolve_syllabus_path, TaggingStage};
use crate::utils::logging::{
    init_log_file, log_stage_complete, log_stage_start, log_startup, print_final_stats,
};
use crate::utils::truncate_text;
use crate::workflow::classification_flow::{self, CLASSIFY_PROMPT_FILE};
use crate::workflow::subquestion_flow::SUBQUESTION_PROMPT_FILE;
use crate::workflow::syllabus_flow::SYLLABUS_PROMPT_FILE;
use crate::workflow::{ClassificationFlow, DocumentCtx, ProcessResult, SubQuestionFlow, SyllabusFlow};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt::Display;
use tracing::{error, info, warn};

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// ocr → classify → bank → subquestions
    All,
    Ocr,
    Classify,
    Bank,
    Subquestions,
    Syllabus,
    Embed,
    Tag,
    Search,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::All => "all",
            Stage::Ocr => "ocr",
            Stage::Classify => "classify",
            Stage::Bank => "bank",
            Stage::Subquestions => "subquestions",
            Stage::Syllabus => "syllabus",
            Stage::Embed => "embed",
            Stage::Tag => "tag",
            Stage::Search => "search",
        }
    }

    /// 实际要运行的阶段序列
    pub fn expand(self) -> Vec<Stage> {
        match self {
            Stage::All => vec![Stage::Ocr, Stage::Classify, Stage::Bank, Stage::Subquestions],
            other => vec![other],
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 成功 / 失败 / 跳过 计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StageStats {
    pub fn record(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Success => self.success += 1,
            ProcessResult::Failed => self.failed += 1,
            ProcessResult::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }

    pub fn counters(&self) -> [(&'static str, usize); 3] {
        [
            ("成功", self.success),
            ("失败", self.failed),
            ("跳过", self.skipped),
        ]
    }
}

/// 命令行选项
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stage: Stage,
    /// 重新生成第一遍结果和向量
    pub force: bool,
    pub query: Option<String>,
    pub top_k: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stage: Stage::All,
            force: false,
            query: None,
            top_k: None,
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    options: RunOptions,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config, options: RunOptions) -> Result<Self> {
        init_log_file(&config.output_log_file)?;
        log_startup(options.stage.as_str(), &config.data_root);
        Ok(Self { config, options })
    }

    /// 运行选定的阶段
    pub async fn run(&self) -> Result<()> {
        let stages = self.options.stage.expand();

        for (step, stage) in stages.iter().enumerate() {
            log_stage_start(step + 1, stage.as_str());
            match self.run_stage(*stage).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("❌ 配置错误，终止运行: {}", e);
                    return Err(e).with_context(|| format!("阶段 {} 失败", stage));
                }
                Err(e) => error!("❌ 阶段 {} 失败: {}", stage, e),
            }
        }

        print_final_stats(&self.config.output_log_file);
        Ok(())
    }

    async fn run_stage(&self, stage: Stage) -> AppResult<()> {
        match stage {
            Stage::All => Ok(()),
            Stage::Ocr => self.run_ocr(ExtractionTarget::questions(&self.config)).await,
            Stage::Classify => self.run_classify().await,
            Stage::Bank => self.run_bank().await,
            Stage::Subquestions => self.run_subquestions().await,
            Stage::Syllabus => self.run_syllabus().await,
            Stage::Embed => self.run_embed().await.map(|_| ()),
            Stage::Tag => self.run_tag().await,
            Stage::Search => self.run_search().await,
        }
    }

    async fn run_ocr(&self, target: ExtractionTarget) -> AppResult<()> {
        let client = MathpixClient::from_config(&self.config)?;
        let stats = OcrStage::new(&client, target, self.config.ocr_poll.clone())
            .run()
            .await?;
        log_stage_complete("OCR", &stats.counters());
        Ok(())
    }

    async fn run_classify(&self) -> AppResult<()> {
        let docs = DocumentCtx::discover(&self.config.ocr_results_dir(), ".mmd").await?;
        let (pending, skipped) = classification_flow::pending(docs, self.options.force);
        let mut stats = StageStats {
            skipped,
            ..StageStats::default()
        };
        if pending.is_empty() {
            info!("✓ 所有文档均已有定位结果");
            log_stage_complete("定位/分类", &stats.counters());
            return Ok(());
        }

        let provider = build_llm_provider(&self.config)?;
        let template = self.config.load_prompt(CLASSIFY_PROMPT_FILE)?;
        let flow = ClassificationFlow::new(&self.config, provider.as_ref(), template);
        info!("📋 待处理文档: {} 个，每批 {} 个", pending.len(), self.config.batch_size);

        let batch_size = self.config.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        for (i, batch) in pending.chunks(batch_size).enumerate() {
            info!("📦 第 {}/{} 批 ({} 个文档)", i + 1, total_batches, batch.len());
            for result in flow.run_batch(batch).await {
                stats.record(result);
            }
        }

        log_stage_complete("定位/分类", &stats.counters());
        Ok(())
    }

    async fn run_bank(&self) -> AppResult<()> {
        let assembled = bank_assembler::assemble(&self.config.ocr_results_dir()).await?;
        let path = self.config.question_bank_path();
        assembled.bank.save(&path).await?;
        info!("✓ 题库已保存 → {}", path.display());

        let mut counters = assembled.stats.counters().to_vec();
        counters.push(("题目", assembled.bank.len()));
        counters.push(("未找到锚点", assembled.missing_anchors));
        counters.push(("需复核", assembled.needs_review));
        log_stage_complete("题库组装", &counters);
        Ok(())
    }

    async fn run_subquestions(&self) -> AppResult<()> {
        let path = self.config.question_bank_path();
        let mut bank = QuestionBank::load(&path).await?;
        let provider = build_llm_provider(&self.config)?;
        let template = self.config.load_prompt(SUBQUESTION_PROMPT_FILE)?;

        let stats = SubQuestionFlow::new(&self.config, provider.as_ref(), template)
            .process_bank(&mut bank)
            .await;
        bank.save(&path).await?;

        log_stage_complete(
            "子题复核",
            &[
                ("复核", stats.processed),
                ("改为不独立", stats.updated),
                ("拆分", stats.split),
                ("新增子题", stats.extracted),
                ("未变化", stats.unchanged),
            ],
        );
        Ok(())
    }

    async fn run_syllabus(&self) -> AppResult<()> {
        self.run_ocr(ExtractionTarget::syllabus(&self.config)).await?;

        let provider = build_llm_provider(&self.config)?;
        let template = self.config.load_prompt(SYLLABUS_PROMPT_FILE)?;
        let flow = SyllabusFlow::new(&self.config, provider.as_ref(), template);

        let mut stats = StageStats::default();
        for ctx in DocumentCtx::discover(&self.config.syllabus_output_dir(), ".md").await? {
            stats.record(flow.run(&ctx).await);
        }
        log_stage_complete("大纲结构化", &stats.counters());
        Ok(())
    }

    fn embedding_stage<'a>(&self, client: &'a OpenAiEmbeddingClient) -> EmbeddingStage<'a> {
        EmbeddingStage::new(
            client,
            self.config.embeddings_path(),
            self.config.embedding_metadata_path(),
        )
    }

    async fn run_embed(&self) -> AppResult<usize> {
        let bank = QuestionBank::load(&self.config.question_bank_path()).await?;
        let client = OpenAiEmbeddingClient::from_config(&self.config)?;
        let (store, reused) = self
            .embedding_stage(&client)
            .ensure(&bank, self.options.force)
            .await?;
        log_stage_complete(
            "向量化",
            &[("题目", store.len()), ("复用", usize::from(reused))],
        );
        Ok(store.len())
    }

    async fn run_tag(&self) -> AppResult<()> {
        let bank = QuestionBank::load(&self.config.question_bank_path()).await?;
        let client = OpenAiEmbeddingClient::from_config(&self.config)?;
        let (store, _) = self.embedding_stage(&client).ensure(&bank, false).await?;

        let syllabus_path = resolve_syllabus_path(
            self.config.tag_syllabus_path.as_deref(),
            &self.config.syllabus_output_dir(),
        )
        .await?;
        info!("📚 使用大纲: {}", syllabus_path.display());

        let counts = TaggingStage::new(&client, self.config.max_tags)
            .run(&syllabus_path, &store, &self.config.tagged_questions_path())
            .await?;
        log_stage_complete(
            "打标签",
            &[("已打标签", counts.tagged), ("未打标签", counts.untagged)],
        );
        Ok(())
    }

    async fn run_search(&self) -> AppResult<()> {
        let query = self
            .options
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| AppError::missing_config("--query"))?;
        let client = OpenAiEmbeddingClient::from_config(&self.config)?;
        let stage = self.embedding_stage(&client);

        let store = stage.load().await?.ok_or_else(|| {
            AppError::from(FileError::NotFound {
                path: self.config.embeddings_path().display().to_string(),
            })
        })?;
        if !store.is_consistent() {
            warn!("⚠️ 向量与元数据数量不一致");
        }

        let k = self.options.top_k.unwrap_or(self.config.search_top_k);
        let hits = stage.search(&store, query, k).await?;
        info!("🔍 查询: {}", query);
        for (rank, hit) in hits.iter().enumerate() {
            let meta = &hit.metadata;
            info!(
                "{}. [{:.4}] {} 第 {} 题 ({}): {}",
                rank + 1,
                hit.score,
                meta.source_pdf,
                meta.question_number,
                meta.question_type,
                truncate_text(&meta.original_object.question_text, 80)
            );
        }
        log_stage_complete("检索", &[("结果", hits.len())]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_expand() {
        assert_eq!(
            Stage::All.expand(),
            vec![Stage::Ocr, Stage::Classify, Stage::Bank, Stage::Subquestions]
        );
        assert_eq!(Stage::Tag.expand(), vec![Stage::Tag]);
        assert_eq!(Stage::from_str("subquestions", true).unwrap(), Stage::Subquestions);
    }

    #[test]
    fn test_stage_stats() {
        let mut stats = StageStats::default();
        stats.record(ProcessResult::Success);
        stats.record(ProcessResult::Skipped);
        stats.record(ProcessResult::Failed);
        stats.record(ProcessResult::Success);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.counters(), [("成功", 2), ("失败", 1), ("跳过", 1)]);
    }

    #[tokio::test]
    async fn test_search_without_query_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_root: dir.path().display().to_string(),
            output_log_file: dir.path().join("output.txt").display().to_string(),
            embedding_api_key: "test".to_string(),
            ..Config::default()
        };
        let app = App::initialize(
            config,
            RunOptions {
                stage: Stage::Search,
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert!(app.run().await.is_err());
    }

    fn classify_app(root: &std::path::Path, force: bool) -> App {
        let config = Config {
            data_root: root.display().to_string(),
            output_log_file: root.join("output.txt").display().to_string(),
            ..Config::default()
        };
        App::initialize(
            config,
            RunOptions {
                stage: Stage::Classify,
                force,
                ..RunOptions::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_classify_all_done_needs_no_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let doc_dir = dir.path().join("data/ocr_results/exam");
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(doc_dir.join("exam.mmd"), "1. Q").unwrap();
        std::fs::write(doc_dir.join("exam_post1.json"), "{}").unwrap();

        // 没有 LLM 凭据，但所有文档都已处理过
        classify_app(dir.path(), false).run().await.unwrap();

        // --force 会重新排队，此时缺少凭据是致命错误
        assert!(classify_app(dir.path(), true).run().await.is_err());
    }

    #[tokio::test]
    async fn test_bank_stage_without_ocr_results() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_root: dir.path().display().to_string(),
            output_log_file: dir.path().join("output.txt").display().to_string(),
            ..Config::default()
        };
        let app = App::initialize(
            config,
            RunOptions {
                stage: Stage::Bank,
                ..RunOptions::default()
            },
        )
        .unwrap();
        // 没有 OCR 结果时写出空题库
        app.run().await.unwrap();
        let saved = std::fs::read_to_string(dir.path().join("results_question_bank/question_bank.json")).unwrap();
        assert_eq!(saved.trim(), "[]");
    }
}

//! 题库组装 - 编排层
//!
//! ## 职责
//!
//! 1. 按目录名顺序遍历 OCR 结果
//! 2. 没有 `_post1.json` 的文档整体跳过（下次运行再处理）
//! 3. 定位 + 切分，合并为一个题库
//!
//! 找不到的锚点只影响对应题目，同一文档的其他题目照常加入。

use crate::error::AppResult;
use crate::models::bank::QuestionBank;
use crate::models::loaders::{load_raw_document, read_json};
use crate::models::question::AnchorSet;
use crate::orchestrator::pipeline::StageStats;
use crate::services::segmenter::segment_document;
use crate::workflow::{DocumentCtx, ProcessResult};
use std::path::Path;
use tracing::{debug, info, warn};

/// 组装结果
#[derive(Debug, Default)]
pub struct AssembledBank {
    pub bank: QuestionBank,
    pub stats: StageStats,
    /// 找不到锚点的题目数
    pub missing_anchors: usize,
    /// 需要人工复核的题目数
    pub needs_review: usize,
}

/// 从 OCR 结果目录组装题库
pub async fn assemble(ocr_root: &Path) -> AppResult<AssembledBank> {
    let docs = DocumentCtx::discover(ocr_root, ".mmd").await?;
    let mut assembled = AssembledBank::default();
    info!("📁 找到 {} 个 OCR 文档", docs.len());

    for ctx in &docs {
        let result = match add_document(ctx, &mut assembled).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} ⚠️ {}", ctx, e);
                ProcessResult::Failed
            }
        };
        assembled.stats.record(result);
    }

    Ok(assembled)
}

async fn add_document(ctx: &DocumentCtx, assembled: &mut AssembledBank) -> AppResult<ProcessResult> {
    let post1 = ctx.post1_path();
    if !post1.exists() {
        debug!("{} 没有定位结果，跳过", ctx);
        return Ok(ProcessResult::Skipped);
    }

    let anchors: AnchorSet = read_json(&post1).await?;
    let doc = load_raw_document(&ctx.text_path).await?;
    let segmentation = segment_document(&doc, &anchors);

    for (number, err) in &segmentation.missing {
        warn!("{} [题目 {}] ⚠️ {}", ctx, number, err);
    }
    assembled.missing_anchors += segmentation.missing.len();
    assembled.needs_review += segmentation.review_count();

    let records = segmentation.into_records();
    info!("{} ✓ 切分出 {} 道题", ctx, records.len());
    assembled.bank.extend(records);
    Ok(ProcessResult::Success)
}

//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责阶段调度和统计，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 流水线入口
//! - 管理应用生命周期（初始化、运行）
//! - 按 `--stage` 调度各阶段
//! - 按需创建客户端，输出阶段统计
//!
//! ### `extraction_target` / `ocr_stage` - OCR
//! - 试卷与大纲两种抽取目标
//! - 上传、等待、下载，维护 `processed_files.json`
//!
//! ### `bank_assembler` - 题库组装
//! - 遍历 OCR 结果，定位 + 切分，合并为题库
//!
//! ### `embedding_stage` / `tagging_stage` - 向量化与打标签
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (处理全部文档)
//!     ↓
//! workflow::ClassificationFlow / SubQuestionFlow / SyllabusFlow (处理一批文档或题目)
//!     ↓
//! services (能力层：定位 / 切分 / 拆分 / 解析 / 相似度)
//!     ↓
//! clients (基础设施：LLM / Mathpix / Embedding)
//! ```

pub mod bank_assembler;
pub mod embedding_stage;
pub mod extraction_target;
pub mod ocr_stage;
pub mod pipeline;
pub mod tagging_stage;

// 重新导出主要类型
pub use extraction_target::ExtractionTarget;
pub use pipeline::{App, RunOptions, Stage, StageStats};

//! # Question Bank Extract
//!
//! 从试卷 PDF 构建结构化题库：OCR → 定位/分类 → 切分 → 子题拆分 → 向量化 → 打标签
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 外部服务，全部隐藏在 trait 之后
//! - `LlmProvider` - Anthropic / OpenAI 兼容接口，批处理失败时逐条调用
//! - `MathpixClient` - PDF OCR
//! - `EmbeddingProvider` - 文本向量化
//! - `PollPolicy` - 统一的"等待外部任务完成"策略
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 纯逻辑，不做 I/O
//! - `boundary_locator` / `segmenter` - 锚点定位与题目切分
//! - `subquestion_splitter` - 子题拆分
//! - `response_parser` - LLM 响应解析
//! - `topic_tagger` - 相似度打标签
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一批文档 / 一批题目"的处理流程
//! - `DocumentCtx` - 文档上下文
//! - `ClassificationFlow` / `SubQuestionFlow` / `SyllabusFlow`
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 阶段调度与统计
//! - 其余模块各负责一个阶段
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{QuestionBank, QuestionRecord};
pub use orchestrator::{App, RunOptions, Stage};
pub use workflow::{DocumentCtx, ProcessResult};

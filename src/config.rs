//! 运行配置
//!
//! 每次运行构造一个 `Config`，显式传入各个组件。
//! 加载顺序：内置默认值 → TOML 文件 → 环境变量。

use crate::clients::polling::PollPolicy;
use crate::error::{AppError, AppResult, ConfigError, FileError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 未指定 `--config` 时尝试读取的配置文件
pub const DEFAULT_CONFIG_FILE: &str = "question_bank.toml";

/// LLM 服务类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// Anthropic Messages API，支持批处理
    Anthropic,
    /// OpenAI 兼容接口，只支持同步调用
    OpenAi,
}

impl FromStr for LlmProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProviderKind::Anthropic),
            "openai" | "openai-compatible" => Ok(LlmProviderKind::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: other.to_string(),
                expected: "anthropic | openai".to_string(),
            }),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据根目录，所有输入输出目录都相对于它
    pub data_root: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,

    // --- Mathpix OCR 配置 ---
    pub mathpix_app_id: String,
    pub mathpix_app_key: String,
    pub mathpix_base_url: String,
    /// OCR 状态轮询策略
    pub ocr_poll: PollPolicy,

    // --- LLM 配置 ---
    pub llm_provider: LlmProviderKind,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    /// 第一遍定位/分类使用的模型
    pub classify_model: String,
    /// 子题独立性判断使用的模型
    pub subquestion_model: String,
    /// 大纲结构化使用的模型
    pub syllabus_model: String,
    /// 每个批次的最大请求数
    pub batch_size: usize,
    /// 批处理状态轮询策略
    pub batch_poll: PollPolicy,
    /// 子题判断的 thinking token 预算，0 表示关闭
    pub subquestion_thinking_budget: u32,

    // --- Embedding 配置 ---
    pub embedding_api_key: String,
    pub embedding_api_base_url: String,
    pub embedding_model: String,
    /// 每道题保留的标签数
    pub max_tags: usize,
    /// 检索默认返回条数
    pub search_top_k: usize,
    /// 打标签使用的大纲文件，未设置时自动查找
    pub tag_syllabus_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: ".".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            mathpix_app_id: String::new(),
            mathpix_app_key: String::new(),
            mathpix_base_url: "https://api.mathpix.com/v3/pdf".to_string(),
            ocr_poll: PollPolicy::new(12, 5_000),
            llm_provider: LlmProviderKind::Anthropic,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.anthropic.com/v1".to_string(),
            classify_model: "claude-3-5-haiku-20241022".to_string(),
            subquestion_model: "claude-3-7-sonnet-20250219".to_string(),
            syllabus_model: "claude-3-5-haiku-20241022".to_string(),
            batch_size: 20,
            batch_poll: PollPolicy::new(60, 10_000),
            subquestion_thinking_budget: 1024,
            embedding_api_key: String::new(),
            embedding_api_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tags: 3,
            search_top_k: 5,
            tag_syllabus_path: None,
        }
    }
}

impl Config {
    /// 只从环境变量构造（缺省值兜底）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件后再叠加环境变量
    ///
    /// `path` 为 None 时，若当前目录存在 `question_bank.toml` 则读取它
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let file = match path {
            Some(p) if !p.exists() => {
                return Err(FileError::NotFound {
                    path: p.display().to_string(),
                }
                .into())
            }
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        let base = match file {
            Some(p) => Self::from_toml_file(&p)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 解析 TOML 文件
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        toml::from_str(&content).map_err(|e| {
            FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }

    fn with_env_overrides(self) -> AppResult<Self> {
        let d = self;
        let llm_provider = match std::env::var("LLM_PROVIDER") {
            Ok(v) => v.parse()?,
            Err(_) => d.llm_provider,
        };
        // ANTHROPIC_API_KEY 作为 LLM_API_KEY 的后备
        let llm_api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .unwrap_or(d.llm_api_key);

        Ok(Self {
            data_root: std::env::var("DATA_ROOT").unwrap_or(d.data_root),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(d.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(d.output_log_file),
            mathpix_app_id: std::env::var("MATHPIX_APP_ID").unwrap_or(d.mathpix_app_id),
            mathpix_app_key: std::env::var("MATHPIX_APP_KEY").unwrap_or(d.mathpix_app_key),
            mathpix_base_url: std::env::var("MATHPIX_BASE_URL").unwrap_or(d.mathpix_base_url),
            ocr_poll: d.ocr_poll,
            llm_provider,
            llm_api_key,
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            classify_model: std::env::var("CLASSIFY_MODEL").unwrap_or(d.classify_model),
            subquestion_model: std::env::var("SUBQUESTION_MODEL").unwrap_or(d.subquestion_model),
            syllabus_model: std::env::var("SYLLABUS_MODEL").unwrap_or(d.syllabus_model),
            batch_size: std::env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.batch_size),
            batch_poll: d.batch_poll,
            subquestion_thinking_budget: std::env::var("SUBQUESTION_THINKING_BUDGET").ok().and_then(|v| v.parse().ok()).unwrap_or(d.subquestion_thinking_budget),
            embedding_api_key: std::env::var("EMBEDDING_API_KEY").unwrap_or(d.embedding_api_key),
            embedding_api_base_url: std::env::var("EMBEDDING_API_BASE_URL").unwrap_or(d.embedding_api_base_url),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or(d.embedding_model),
            max_tags: std::env::var("MAX_TAGS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_tags),
            search_top_k: d.search_top_k,
            tag_syllabus_path: std::env::var("TAG_SYLLABUS_PATH").ok().or(d.tag_syllabus_path),
        })
    }

    // ========== 必需凭据 ==========

    /// Mathpix 凭据 (app_id, app_key)
    pub fn require_mathpix(&self) -> AppResult<(&str, &str)> {
        Ok((
            require("MATHPIX_APP_ID", &self.mathpix_app_id)?,
            require("MATHPIX_APP_KEY", &self.mathpix_app_key)?,
        ))
    }

    pub fn require_llm_key(&self) -> AppResult<&str> {
        require("LLM_API_KEY", &self.llm_api_key)
    }

    pub fn require_embedding_key(&self) -> AppResult<&str> {
        require("EMBEDDING_API_KEY", &self.embedding_api_key)
    }

    // ========== 目录约定 ==========

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
    }

    pub fn sample_papers_dir(&self) -> PathBuf {
        self.root().join("data").join("sample_papers")
    }

    pub fn ocr_results_dir(&self) -> PathBuf {
        self.root().join("data").join("ocr_results")
    }

    pub fn syllabus_input_dir(&self) -> PathBuf {
        self.root().join("data").join("syllabus")
    }

    pub fn syllabus_output_dir(&self) -> PathBuf {
        self.root().join("data").join("syllabus_extract_ocr")
    }

    pub fn question_bank_path(&self) -> PathBuf {
        self.root()
            .join("results_question_bank")
            .join("question_bank.json")
    }

    pub fn tagged_questions_path(&self) -> PathBuf {
        self.root()
            .join("results_question_bank")
            .join("tagged_questions.json")
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.root().join("embeddings").join("question_embeddings.json")
    }

    pub fn embedding_metadata_path(&self) -> PathBuf {
        self.root().join("embeddings").join("question_metadata.json")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root().join("prompts")
    }

    /// 读取提示词模板，缺失时返回致命错误
    pub fn load_prompt(&self, file_name: &str) -> AppResult<String> {
        let path = self.prompts_dir().join(file_name);
        std::fs::read_to_string(&path).map_err(|_| {
            ConfigError::MissingPrompt {
                path: path.display().to_string(),
            }
            .into()
        })
    }
}

fn require<'a>(key: &str, value: &'a str) -> AppResult<&'a str> {
    if value.trim().is_empty() {
        Err(AppError::missing_config(key))
    } else {
        Ok(value)
    }
}

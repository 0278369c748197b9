use thiserror::Error;

/// 应用程序错误类型
///
/// 只有 `Config` 会中止整个运行，其余错误都在最小的工作单元（一道题、
/// 一个文档、一个批次条目）上被记录并跳过。
#[derive(Debug, Error)]
pub enum AppError {
    /// 题目抽取错误
    #[error("抽取错误: {0}")]
    Extract(#[from] ExtractError),
    /// 外部服务错误（OCR / LLM / Embedding）
    #[error("服务错误: {0}")]
    Provider(#[from] ProviderError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// 是否需要中止整个运行
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

/// 题目抽取错误
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 锚点文本在原文中不存在
    #[error("未找到锚点 '{snippet}' (从第 {from_line} 行开始搜索)")]
    AnchorNotFound { snippet: String, from_line: usize },
    /// LLM 返回内容无法解析为预期结构
    #[error("无法解析 {context}: {preview}")]
    ParseFailure { context: String, preview: String },
}

/// 外部服务错误
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 轮询次数用尽
    #[error("{operation} 轮询超时 (已尝试 {attempts} 次)")]
    Timeout { operation: String, attempts: u32 },
    /// 非 2xx 响应
    #[error("{endpoint} 返回错误状态 {status}: {body}")]
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 网络请求失败
    #[error("请求 {endpoint} 失败: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 远端任务进入失败状态
    #[error("{operation} 失败: {message}")]
    JobFailed { operation: String, message: String },
    /// 当前服务不支持该操作
    #[error("{provider} 不支持 {operation}")]
    Unsupported { provider: String, operation: String },
    /// 响应结构不符合预期
    #[error("{endpoint} 响应格式错误: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必需的配置项缺失
    #[error("缺少必需的配置项 {key}")]
    MissingValue { key: String },
    /// 提示词模板不存在
    #[error("提示词模板不存在: {path}")]
    MissingPrompt { path: String },
    /// 配置值无法解析
    #[error("配置项 {key} 的值 '{value}' 无法转换为 {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建锚点未找到错误
    pub fn anchor_not_found(snippet: impl Into<String>, from_line: usize) -> Self {
        AppError::Extract(ExtractError::AnchorNotFound {
            snippet: snippet.into(),
            from_line,
        })
    }

    /// 创建解析失败错误，预览只保留前 200 个字符
    pub fn parse_failure(context: impl Into<String>, raw: &str) -> Self {
        AppError::Extract(ExtractError::ParseFailure {
            context: context.into(),
            preview: crate::utils::logging::truncate_text(raw, 200),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建配置缺失错误
    pub fn missing_config(key: impl Into<String>) -> Self {
        AppError::Config(ConfigError::MissingValue { key: key.into() })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

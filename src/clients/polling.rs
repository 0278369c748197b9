//! 轮询策略
//!
//! 所有"等待外部任务完成"的调用（OCR 处理、LLM 批处理）共用同一套
//! 最大次数 + 间隔 + 退避的轮询逻辑。

use crate::error::ProviderError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单次检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    /// 仍在处理中，附带远端状态文本
    Pending(String),
    /// 已完成
    Ready(T),
    /// 远端报告失败
    Failed(String),
}

/// 轮询策略
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollPolicy {
    /// 最大检查次数
    pub max_attempts: u32,
    /// 首次等待间隔（毫秒）
    pub interval_ms: u64,
    /// 每次等待后间隔乘以该系数，1.0 为固定间隔
    pub backoff: f64,
    /// 间隔上限（毫秒）
    pub max_interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(12, 5_000)
    }
}

impl PollPolicy {
    /// 固定间隔的轮询策略
    pub fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
            backoff: 1.0,
            max_interval_ms: 60_000,
        }
    }

    /// 第 `attempt` 次检查（从 1 开始）之后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let ms = (self.interval_ms as f64 * factor).min(self.max_interval_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// 反复调用 `check` 直到完成、失败或次数用尽
    ///
    /// `check` 自身返回错误时视为暂时性故障：记录日志并计入一次尝试。
    pub async fn run<T, F, Fut>(&self, operation: &str, mut check: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollState<T>, ProviderError>>,
    {
        for attempt in 1..=self.max_attempts {
            match check().await {
                Ok(PollState::Ready(value)) => {
                    debug!("{} 已完成 (第 {} 次检查)", operation, attempt);
                    return Ok(value);
                }
                Ok(PollState::Failed(message)) => {
                    warn!("{} 失败: {}", operation, message);
                    return Err(ProviderError::JobFailed {
                        operation: operation.to_string(),
                        message,
                    });
                }
                Ok(PollState::Pending(status)) => {
                    info!(
                        "⏳ {} 处理中 ({}/{}): {}",
                        operation, attempt, self.max_attempts, status
                    );
                }
                Err(e) => {
                    warn!(
                        "{} 状态查询失败 ({}/{}): {}",
                        operation, attempt, self.max_attempts, e
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay_after(attempt)).await;
            }
        }

        Err(ProviderError::Timeout {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}

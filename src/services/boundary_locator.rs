//! 题目边界定位 - 业务能力层
//!
//! 职责：
//! - 在按行切分的原文中找到每个锚点所在的行
//! - 查找单调向前，不会匹配到上一题之前的位置
//! - 单个锚点找不到只影响这一道题
//!
//! 纯函数，不做任何 IO。

use crate::error::ExtractError;
use crate::models::question::QuestionAnchor;
use tracing::{debug, warn};

/// 已定位的锚点
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedAnchor<'a> {
    /// 题号（锚点键的数值）
    pub number: u32,
    pub anchor: &'a QuestionAnchor,
    /// 起始行下标
    pub start_line: usize,
}

/// 定位结果
#[derive(Debug, Default)]
pub struct LocateOutcome<'a> {
    /// 按题号顺序排列，起始行单调不减
    pub located: Vec<LocatedAnchor<'a>>,
    /// 找不到的题号及原因
    pub missing: Vec<(u32, ExtractError)>,
}

/// 从 `from_line` 开始查找第一个包含 `snippet` 的行
///
/// 空锚点视为找不到，避免匹配任意一行。
pub fn locate(lines: &[String], snippet: &str, from_line: usize) -> Result<usize, ExtractError> {
    if snippet.trim().is_empty() {
        return Err(ExtractError::AnchorNotFound {
            snippet: snippet.to_string(),
            from_line,
        });
    }

    lines
        .iter()
        .enumerate()
        .skip(from_line)
        .find(|(_, line)| line.contains(snippet))
        .map(|(idx, _)| idx)
        .ok_or_else(|| ExtractError::AnchorNotFound {
            snippet: snippet.to_string(),
            from_line,
        })
}

/// 依次定位一组已按题号排序的锚点
///
/// 每次从上一个找到的起始行（含）开始查找；找不到的锚点被记录并跳过，
/// 不移动查找起点。
pub fn locate_all<'a>(lines: &[String], anchors: &[(u32, &'a QuestionAnchor)]) -> LocateOutcome<'a> {
    let mut outcome = LocateOutcome::default();
    let mut cursor = 0;

    for &(number, anchor) in anchors {
        match locate(lines, &anchor.start_snippet, cursor) {
            Ok(start_line) => {
                debug!("[题目 {}] 起始行 {}", number, start_line);
                cursor = start_line;
                outcome.located.push(LocatedAnchor {
                    number,
                    anchor,
                    start_line,
                });
            }
            Err(e) => {
                warn!("⚠️ [题目 {}] {}", number, e);
                outcome.missing.push((number, e));
            }
        }
    }

    outcome
}

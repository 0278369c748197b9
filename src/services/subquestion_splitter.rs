//! 子题拆分 - 业务能力层
//!
//! 职责：
//! - 根据复核结果决定：改为"不独立"、拆分为子题、或保持不变
//! - 在父题文本内定位子题锚点（锚点前一个字符不能是字母、数字或下划线，
//!   避免 "1." 匹配到 "11." 里面）
//! - 按位置排序后切片，生成 "{父题号}.{序号}" 子题
//!
//! 子题的独立性设为未知，不再递归判断。

use crate::models::question::QuestionRecord;
use std::ops::Range;
use tracing::{debug, warn};

/// 第二遍 LLM 对整道题的判断
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuestionJudgment {
    pub independent: bool,
    /// 各子题开头的原文片段，顺序不可信
    pub question_starts: Vec<String>,
}

/// 一个子题及其在父题文本中的字节范围
#[derive(Debug, Clone, PartialEq)]
pub struct SplitChild {
    pub record: QuestionRecord,
    /// 未去除首尾空白的原始片段范围
    pub raw_span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// 第一个子题之前的文本（题号、公共题干等）
    pub preamble: Range<usize>,
    pub children: Vec<SplitChild>,
    /// 在父题中找不到的子题锚点
    pub missing: Vec<String>,
}

/// 对一道题的处理决定
#[derive(Debug, Clone, PartialEq)]
pub enum SplitDecision {
    /// 子题并不独立，原地改为 false
    MarkDependent,
    /// 删除父题，追加子题
    Split(SplitResult),
    /// 判定独立但没有可用的子题锚点
    Unchanged,
}

/// 前一个字符不是字母、数字或下划线
fn at_boundary(text: &str, pos: usize) -> bool {
    match text[..pos].chars().next_back() {
        Some(c) => !(c.is_alphanumeric() || c == '_'),
        None => true,
    }
}

/// 第一个满足边界条件的出现位置（字节偏移）
pub fn find_boundary_match(text: &str, snippet: &str) -> Option<usize> {
    if snippet.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(rel) = text[from..].find(snippet) {
        let pos = from + rel;
        if at_boundary(text, pos) {
            return Some(pos);
        }
        // 前进一个字符继续找，允许重叠出现
        let step = text[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
        from = pos + step;
    }
    None
}

/// 查找所有子题起点，升序去重；找不到的锚点单独返回
pub fn find_sub_starts(text: &str, starts: &[String]) -> (Vec<usize>, Vec<String>) {
    let mut positions = Vec::new();
    let mut missing = Vec::new();
    for start in starts {
        match find_boundary_match(text, start) {
            Some(pos) => positions.push(pos),
            None => missing.push(start.clone()),
        }
    }
    positions.sort_unstable();
    positions.dedup();
    (positions, missing)
}

/// 按子题起点切分父题
///
/// 找不到任何起点时返回 None
pub fn split_text(parent: &QuestionRecord, starts: &[String]) -> Option<SplitResult> {
    let text = &parent.question_text;
    let (positions, missing) = find_sub_starts(text, starts);
    for snippet in &missing {
        warn!("⚠️ [题目 {}] 找不到子题锚点 '{}'", parent.question_number, snippet);
    }
    if positions.is_empty() {
        return None;
    }

    let children = positions
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = positions.get(i + 1).copied().unwrap_or(text.len());
            let record = QuestionRecord {
                question_number: parent.question_number.child(i + 1),
                question_text: text[start..end].trim().to_string(),
                question_type: parent.question_type.clone(),
                sub_questions_independent: None,
                source_document: parent.source_document.clone(),
                source_file: parent.source_file.clone(),
                needs_review: false,
            };
            SplitChild {
                record,
                raw_span: start..end,
            }
        })
        .collect();

    Some(SplitResult {
        preamble: 0..positions[0],
        children,
        missing,
    })
}

/// 根据复核结果处理一道题
pub fn apply_judgment(parent: &QuestionRecord, judgment: &SubQuestionJudgment) -> SplitDecision {
    if !judgment.independent {
        debug!("[题目 {}] 复核为不独立", parent.question_number);
        return SplitDecision::MarkDependent;
    }

    match split_text(parent, &judgment.question_starts) {
        Some(result) => {
            debug!(
                "[题目 {}] 拆分为 {} 个子题",
                parent.question_number,
                result.children.len()
            );
            SplitDecision::Split(result)
        }
        None => SplitDecision::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionNumber;

    fn parent(text: &str) -> QuestionRecord {
        QuestionRecord {
            question_number: QuestionNumber::from("1"),
            question_text: text.to_string(),
            question_type: "Short Answer".to_string(),
            sub_questions_independent: Some(true),
            source_document: "exam".to_string(),
            source_file: "exam.mmd".to_string(),
            needs_review: false,
        }
    }

    fn starts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn independent(items: &[&str]) -> SubQuestionJudgment {
        SubQuestionJudgment {
            independent: true,
            question_starts: starts(items),
        }
    }

    #[test]
    fn test_split_example() {
        let p = parent("1. (a) First. (b) Second.");
        let result = match apply_judgment(&p, &independent(&["(a)", "(b)"])) {
            SplitDecision::Split(r) => r,
            other => panic!("意外结果: {:?}", other),
        };

        assert_eq!(result.children.len(), 2);
        let c1 = &result.children[0];
        let c2 = &result.children[1];
        assert_eq!(c1.record.question_number.as_str(), "1.1");
        assert_eq!(&p.question_text[c1.raw_span.clone()], "(a) First. ");
        assert_eq!(c1.record.question_text, "(a) First.");
        assert_eq!(c2.record.question_number.as_str(), "1.2");
        assert_eq!(c2.record.question_text, "(b) Second.");
        assert_eq!(c2.record.sub_questions_independent, None);
        assert_eq!(c2.record.question_type, "Short Answer");
        assert_eq!(c2.record.source_file, "exam.mmd");
    }

    #[test]
    fn test_raw_spans_partition_parent() {
        let p = parent("3. Consider f.\n(i) Find f'.\n(ii) Find f''.\n(iii) Sketch f.");
        let result = split_text(&p, &starts(&["(iii)", "(i)", "(ii)"])).unwrap();

        let mut rebuilt = p.question_text[result.preamble.clone()].to_string();
        let mut cursor = result.preamble.end;
        for child in &result.children {
            assert_eq!(child.raw_span.start, cursor);
            cursor = child.raw_span.end;
            rebuilt.push_str(&p.question_text[child.raw_span.clone()]);
        }
        assert_eq!(rebuilt, p.question_text);
        assert_eq!(result.children[0].record.question_text, "(i) Find f'.");
        assert_eq!(result.children[2].record.question_text, "(iii) Sketch f.");
    }

    #[test]
    fn test_boundary_rejects_alphanumeric_prefix() {
        // "1." 不能匹配到 "11." 里
        assert_eq!(find_boundary_match("11. x 1. y", "1."), Some(6));
        assert_eq!(find_boundary_match("a(b) (b)", "(b)"), Some(5));
        assert_eq!(find_boundary_match("x_1. 1.", "1."), Some(5));
        assert_eq!(find_boundary_match("(1. 中文", "1."), Some(1));
        assert_eq!(find_boundary_match("only 11.", "1."), None);
    }

    #[test]
    fn test_sub_starts_sorted_and_deduplicated() {
        let (positions, missing) =
            find_sub_starts("(a) x (b) y", &starts(&["(b)", "(a)", "(a)", "(z)"]));
        assert_eq!(positions, vec![0, 6]);
        assert_eq!(missing, vec!["(z)".to_string()]);
    }

    #[test]
    fn test_not_independent_marks_dependent() {
        let judgment = SubQuestionJudgment {
            independent: false,
            question_starts: starts(&["(a)", "(b)"]),
        };
        assert_eq!(
            apply_judgment(&parent("1. (a) x (b) y"), &judgment),
            SplitDecision::MarkDependent
        );
    }

    #[test]
    fn test_no_matching_anchor_leaves_parent_unchanged() {
        let p = parent("1. Explain.");
        assert_eq!(apply_judgment(&p, &independent(&["(a)"])), SplitDecision::Unchanged);
        assert_eq!(apply_judgment(&p, &independent(&[])), SplitDecision::Unchanged);
    }

    #[test]
    fn test_multibyte_text() {
        let p = parent("第1题 （1）求值。（2）证明。");
        let result = split_text(&p, &starts(&["（2）", "（1）"])).unwrap();
        assert_eq!(result.children[0].record.question_text, "（1）求值。");
        assert_eq!(result.children[1].record.question_text, "（2）证明。");
    }

    #[test]
    fn test_nested_numbering() {
        let mut p = parent("(a) x (b) y");
        p.question_number = QuestionNumber::from("4.2");
        let result = split_text(&p, &starts(&["(a)", "(b)"])).unwrap();
        assert_eq!(result.children[1].record.question_number.as_str(), "4.2.2");
    }
}

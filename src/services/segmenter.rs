//! 题目切分 - 业务能力层
//!
//! 职责：
//! - 根据已定位的起始行把文档切成连续、不重叠的题目片段
//! - 第一题之前的内容作为前言单独返回
//! - 最后一题包含文档末尾的所有剩余行
//!
//! 两个锚点落在同一行时，后一题为空片段并标记 `needs_review`，
//! 这一行留给前一题。

use crate::error::ExtractError;
use crate::models::document::RawDocument;
use crate::models::question::{AnchorSet, QuestionNumber, QuestionRecord};
use crate::services::boundary_locator::{locate_all, LocatedAnchor};
use std::ops::Range;
use tracing::warn;

/// 一道切分出的题目及其行范围
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedQuestion {
    pub record: QuestionRecord,
    pub line_range: Range<usize>,
}

/// 一个文档的切分结果
#[derive(Debug, Default)]
pub struct Segmentation {
    /// 第一题之前的行
    pub preamble: Range<usize>,
    pub questions: Vec<SegmentedQuestion>,
    /// 找不到锚点而被跳过的题号
    pub missing: Vec<(u32, ExtractError)>,
}

impl Segmentation {
    pub fn records(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.questions.iter().map(|q| &q.record)
    }

    pub fn into_records(self) -> Vec<QuestionRecord> {
        self.questions.into_iter().map(|q| q.record).collect()
    }

    pub fn review_count(&self) -> usize {
        self.questions.iter().filter(|q| q.record.needs_review).count()
    }
}

/// 按起始行切分
///
/// `located` 必须按题号排序且起始行单调不减（`locate_all` 的输出满足该条件）。
pub fn segment(doc: &RawDocument, located: &[LocatedAnchor<'_>]) -> Segmentation {
    let total = doc.line_count();
    let first_start = located.first().map(|l| l.start_line).unwrap_or(total);
    let mut questions = Vec::with_capacity(located.len());

    for (i, current) in located.iter().enumerate() {
        let start = current.start_line;
        let duplicate = i > 0 && located[i - 1].start_line == start;

        let line_range = if duplicate {
            warn!(
                "⚠️ [文档 {}] 第 {} 题与上一题起始于同一行 {}，需要人工复核",
                doc.source_file, current.number, start
            );
            start..start
        } else {
            let end = located[i + 1..]
                .iter()
                .map(|next| next.start_line)
                .find(|&next_start| next_start > start)
                .unwrap_or(total);
            start..end
        };

        let record = QuestionRecord {
            question_number: QuestionNumber::top_level(current.number),
            question_text: doc.span_text(line_range.start, line_range.end),
            question_type: current.anchor.question_type.clone(),
            sub_questions_independent: current.anchor.sub_questions_independent,
            source_document: doc.source_document.clone(),
            source_file: doc.source_file.clone(),
            needs_review: duplicate,
        };
        questions.push(SegmentedQuestion { record, line_range });
    }

    Segmentation {
        preamble: 0..first_start,
        questions,
        missing: Vec::new(),
    }
}

/// 定位 + 切分一个文档
///
/// 锚点先按题号数值排序；找不到的锚点记入 `missing`，不影响其他题目。
pub fn segment_document(doc: &RawDocument, anchors: &AnchorSet) -> Segmentation {
    let sorted = anchors.sorted();
    let outcome = locate_all(&doc.lines, &sorted);
    let mut segmentation = segment(doc, &outcome.located);
    segmentation.missing = outcome.missing;
    segmentation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionAnchor;

    fn anchors(snippets: &[(&str, &str)]) -> AnchorSet {
        let mut set = AnchorSet::new();
        for (key, snippet) in snippets {
            set.0.insert(
                key.to_string(),
                QuestionAnchor {
                    start_snippet: snippet.to_string(),
                    question_type: "Short Answer".to_string(),
                    sub_questions_independent: Some(true),
                },
            );
        }
        set
    }

    /// 前言 + 非空片段按顺序覆盖全部行
    fn assert_total_cover(seg: &Segmentation, doc: &RawDocument) {
        let mut cursor = seg.preamble.end;
        assert_eq!(seg.preamble.start, 0);
        for q in seg.questions.iter().filter(|q| !q.line_range.is_empty()) {
            assert_eq!(q.line_range.start, cursor);
            cursor = q.line_range.end;
        }
        assert_eq!(cursor, doc.line_count());

        let mut parts = vec![];
        if !seg.preamble.is_empty() {
            parts.push(doc.span_text(seg.preamble.start, seg.preamble.end));
        }
        parts.extend(
            seg.questions
                .iter()
                .filter(|q| !q.line_range.is_empty())
                .map(|q| q.record.question_text.clone()),
        );
        assert_eq!(parts.join("\n"), doc.text());
    }

    #[test]
    fn test_two_questions() {
        let doc = RawDocument::from_text(
            "exam",
            "exam.mmd",
            "1. What is X?\nSome text.\n2. What is Y?\nMore text.",
        );
        let seg = segment_document(&doc, &anchors(&[("1", "1. What is"), ("2", "2. What is")]));

        let texts: Vec<&str> = seg.records().map(|r| r.question_text.as_str()).collect();
        assert_eq!(texts, vec!["1. What is X?\nSome text.", "2. What is Y?\nMore text."]);
        assert_eq!(seg.questions[0].record.question_number.as_str(), "1");
        assert_eq!(seg.questions[1].record.source_file, "exam.mmd");
        assert_eq!(seg.questions[1].record.source_document, "exam");
        assert_total_cover(&seg, &doc);
    }

    #[test]
    fn test_anchor_keys_sorted_numerically() {
        let doc = RawDocument::from_text(
            "exam",
            "exam.mmd",
            "2. A\n10. B\nx\n11. C",
        );
        // 字典序会把 "10" 排在 "2" 前面
        let seg = segment_document(
            &doc,
            &anchors(&[("11", "11. C"), ("1", "2. A"), ("10", "10. B")]),
        );
        let numbers: Vec<&str> = seg.records().map(|r| r.question_number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "10", "11"]);
        assert_eq!(seg.questions[1].record.question_text, "10. B\nx");
        assert_total_cover(&seg, &doc);
    }

    #[test]
    fn test_missing_anchor_keeps_other_questions() {
        let doc = RawDocument::from_text(
            "exam",
            "exam.mmd",
            "1. What is X?\nSome text.\n2. What is Y?\nMore text.",
        );
        let seg = segment_document(
            &doc,
            &anchors(&[("1", "1. What is"), ("2", "2. What is"), ("3", "3. Missing")]),
        );
        assert_eq!(seg.questions.len(), 2);
        assert_eq!(seg.missing.len(), 1);
        assert_eq!(seg.missing[0].0, 3);
        assert!(matches!(seg.missing[0].1, ExtractError::AnchorNotFound { .. }));
        assert_total_cover(&seg, &doc);
    }

    #[test]
    fn test_preamble_and_trailing_lines() {
        let doc = RawDocument::from_text(
            "exam",
            "exam.mmd",
            "# Final Exam\nAnswer all questions.\n1. Prove A\n2. Prove B\n\nEnd of paper",
        );
        let seg = segment_document(&doc, &anchors(&[("1", "1. Prove"), ("2", "2. Prove")]));
        assert_eq!(seg.preamble, 0..2);
        assert_eq!(seg.questions[1].record.question_text, "2. Prove B\n\nEnd of paper");
        assert_total_cover(&seg, &doc);
    }

    #[test]
    fn test_duplicate_start_line_is_flagged() {
        let doc = RawDocument::from_text("exam", "exam.mmd", "1. (a) x (b) y\n2. z");
        let seg = segment_document(
            &doc,
            &anchors(&[("1", "1. (a)"), ("2", "(b) y"), ("3", "2. z")]),
        );

        assert_eq!(seg.questions.len(), 3);
        assert_eq!(seg.questions[0].record.question_text, "1. (a) x (b) y");
        assert!(!seg.questions[0].record.needs_review);
        assert_eq!(seg.questions[1].line_range, 0..0);
        assert_eq!(seg.questions[1].record.question_text, "");
        assert!(seg.questions[1].record.needs_review);
        assert_eq!(seg.review_count(), 1);
        assert_total_cover(&seg, &doc);
    }

    #[test]
    fn test_segmentation_is_idempotent() {
        let doc = RawDocument::from_text("exam", "exam.mmd", "1. a\nb\n2. c");
        let set = anchors(&[("1", "1. a"), ("2", "2. c")]);
        let first = segment_document(&doc, &set).into_records();
        let second = segment_document(&doc, &set).into_records();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fields_copied_from_anchor() {
        let doc = RawDocument::from_text("exam", "exam.mmd", "1. a");
        let mut set = AnchorSet::new();
        set.0.insert(
            "1".to_string(),
            QuestionAnchor {
                start_snippet: "1. a".to_string(),
                question_type: "Multiple Choice".to_string(),
                sub_questions_independent: None,
            },
        );
        let records = segment_document(&doc, &set).into_records();
        assert_eq!(records[0].question_type, "Multiple Choice");
        assert_eq!(records[0].sub_questions_independent, None);
    }

    #[test]
    fn test_no_anchors_is_all_preamble() {
        let doc = RawDocument::from_text("exam", "exam.mmd", "a\nb");
        let seg = segment_document(&doc, &AnchorSet::new());
        assert!(seg.questions.is_empty());
        assert_eq!(seg.preamble, 0..2);
        assert_total_cover(&seg, &doc);
    }
}

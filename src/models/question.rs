use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// 子题独立性：true / false / 未知（null）
pub type Independence = Option<bool>;

/// 第一遍 LLM 给出的题目锚点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnchor {
    /// 题目开头的原文片段（含题号和标点，不超过 20 个可见字符）
    #[serde(rename = "question_start")]
    pub start_snippet: String,
    pub question_type: String,
    /// 缺省时按"独立"处理，交给子题阶段复核
    #[serde(default = "default_independence")]
    pub sub_questions_independent: Independence,
}

fn default_independence() -> Independence {
    Some(true)
}

/// 一个文档的全部锚点，以 "1"、"2"… 为键
///
/// 键是唯一可靠的顺序约定，使用前必须按数值排序（见 [`AnchorSet::sorted`]）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorSet(pub BTreeMap<String, QuestionAnchor>);

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按出现顺序追加锚点，键依次为 "1"、"2"…
    pub fn from_ordered(anchors: Vec<QuestionAnchor>) -> Self {
        Self(
            anchors
                .into_iter()
                .enumerate()
                .map(|(i, a)| ((i + 1).to_string(), a))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按题号数值升序返回 (题号, 锚点)
    ///
    /// 无法解析为数字的键会被记录并丢弃
    pub fn sorted(&self) -> Vec<(u32, &QuestionAnchor)> {
        let mut sorted: Vec<(u32, &QuestionAnchor)> = self
            .0
            .iter()
            .filter_map(|(key, anchor)| match key.trim().parse::<u32>() {
                Ok(n) => Some((n, anchor)),
                Err(_) => {
                    warn!("⚠️ 忽略非数字题号: {}", key);
                    None
                }
            })
            .collect();
        sorted.sort_by_key(|(n, _)| *n);
        sorted
    }
}

/// 题号，顶层题为 "3"，子题为 "3.2"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QuestionNumber(pub String);

impl QuestionNumber {
    pub fn top_level(n: u32) -> Self {
        Self(n.to_string())
    }

    /// 子题题号："{parent}.{index}"，index 从 1 开始
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}.{}", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// 旧版题库里顶层题号是整数，子题号是字符串，两种都要能读
impl<'de> Deserialize<'de> for QuestionNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Visitor;

        struct NumberVisitor;

        impl<'de> Visitor<'de> for NumberVisitor {
            type Value = QuestionNumber;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer question number")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(QuestionNumber(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(QuestionNumber(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(QuestionNumber(value.to_string()))
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}

/// 题库中的一道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_number: QuestionNumber,
    /// 原文片段，保留换行
    pub question_text: String,
    pub question_type: String,
    #[serde(default)]
    pub sub_questions_independent: Independence,
    /// 来源文档（PDF 目录名）
    #[serde(rename = "source_pdf")]
    pub source_document: String,
    /// 来源文件（.mmd 文件名）
    pub source_file: String,
    /// 与上一题锚定在同一行，需要人工复核
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_review: bool,
}

impl QuestionRecord {
    /// 是否需要进入子题拆分阶段
    pub fn is_split_candidate(&self) -> bool {
        self.sub_questions_independent == Some(true)
    }
}

impl fmt::Display for QuestionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} 题目#{}] {}",
            self.source_file,
            self.question_number,
            crate::utils::truncate_text(&self.question_text.replace('\n', " "), 60)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(snippet: &str) -> QuestionAnchor {
        QuestionAnchor {
            start_snippet: snippet.to_string(),
            question_type: "Short Answer".to_string(),
            sub_questions_independent: None,
        }
    }

    #[test]
    fn test_anchors_sorted_numerically() {
        let mut set = AnchorSet::new();
        for n in [10, 2, 1, 9] {
            set.0.insert(n.to_string(), anchor(&format!("{}.", n)));
        }
        let order: Vec<u32> = set.sorted().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![1, 2, 9, 10]);
    }

    #[test]
    fn test_non_numeric_keys_are_dropped() {
        let mut set = AnchorSet::new();
        set.0.insert("1".to_string(), anchor("1."));
        set.0.insert("intro".to_string(), anchor("Intro"));
        assert_eq!(set.sorted().len(), 1);
    }

    #[test]
    fn test_anchor_json_shape() {
        let json = r#"{
            "1": {"question_start": "1. What is", "question_type": "MCQ", "sub_questions_independent": false},
            "2": {"question_start": "2. Prove", "question_type": "Proof", "sub_questions_independent": null},
            "3": {"question_start": "3. Explain", "question_type": "Essay"}
        }"#;
        let set: AnchorSet = serde_json::from_str(json).unwrap();
        let sorted = set.sorted();
        assert_eq!(sorted[0].1.sub_questions_independent, Some(false));
        assert_eq!(sorted[1].1.sub_questions_independent, None);
        assert_eq!(sorted[2].1.sub_questions_independent, Some(true));
    }

    #[test]
    fn test_question_number_accepts_int_and_string() {
        let json = r#"[
            {"question_number": 3, "question_text": "3. a", "question_type": "MCQ",
             "sub_questions_independent": true, "source_pdf": "exam", "source_file": "exam.mmd"},
            {"question_number": "3.1", "question_text": "(a)", "question_type": "MCQ",
             "sub_questions_independent": null, "source_pdf": "exam", "source_file": "exam.mmd"}
        ]"#;
        let records: Vec<QuestionRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].question_number.as_str(), "3");
        assert_eq!(records[1].question_number, QuestionNumber::from("3.1"));
        assert!(records[0].is_split_candidate());
        assert!(!records[1].is_split_candidate());
    }

    #[test]
    fn test_record_serializes_null_independence() {
        let record = QuestionRecord {
            question_number: QuestionNumber::top_level(1).child(2),
            question_text: "(b) Second.".to_string(),
            question_type: "Short Answer".to_string(),
            sub_questions_independent: None,
            source_document: "exam".to_string(),
            source_file: "exam.mmd".to_string(),
            needs_review: false,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["question_number"], "1.2");
        assert!(value["sub_questions_independent"].is_null());
        assert_eq!(value["source_pdf"], "exam");
        assert!(value.get("needs_review").is_none());
    }
}

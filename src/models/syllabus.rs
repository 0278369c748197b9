use crate::models::question::{QuestionNumber, QuestionRecord};
use serde::{Deserialize, Serialize};

/// 大纲中的一个主题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusTopic {
    pub name: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
}

/// 结构化后的课程大纲（`_analyzed.json`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Syllabus {
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub topics: Vec<SyllabusTopic>,
}

impl Syllabus {
    /// 所有叶子节点 (主题, 子主题)，按大纲顺序
    pub fn leaves(&self) -> Vec<(&str, &str)> {
        self.topics
            .iter()
            .flat_map(|t| t.subtopics.iter().map(move |s| (t.name.as_str(), s.as_str())))
            .collect()
    }
}

/// 一个标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTag {
    pub main_topic: String,
    pub subtopic: String,
    pub similarity_score: f32,
}

/// 带标签的题目，标签按相似度降序
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedQuestion {
    pub record: QuestionRecord,
    pub tags: Vec<TopicTag>,
}

/// 输出中的一道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEntry {
    pub question_number: QuestionNumber,
    pub question_text: String,
    pub question_type: String,
    /// 只包含主要主题下的标签
    pub all_tags: Vec<TopicTag>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtopicGroup {
    pub name: String,
    pub questions: Vec<TaggedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicGroup {
    pub name: String,
    pub subtopics: Vec<SubtopicGroup>,
}

/// `tagged_questions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedQuestionBank {
    pub course_name: String,
    pub topics: Vec<TopicGroup>,
}

impl TaggedQuestionBank {
    pub fn question_count(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|t| &t.subtopics)
            .map(|s| s.questions.len())
            .sum()
    }
}

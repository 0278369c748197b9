//! 题目打标签 - 业务能力层
//!
//! 职责：
//! - 计算题目向量与每个大纲子主题向量的相似度，保留前 K 个标签
//! - 选出主要主题（任一子主题得分最高的主题，不是出现次数最多的）
//! - 按 主题 → 子主题 组织输出，保持大纲顺序
//!
//! 没有标签的题目不出现在输出中，只计入 `untagged`。

use crate::models::question::QuestionRecord;
use crate::models::syllabus::{
    SubtopicGroup, Syllabus, TaggedEntry, TaggedQuestion, TaggedQuestionBank, TopicGroup,
    TopicTag,
};
use crate::services::similarity::top_k;

/// 子主题向量化使用的文本
pub fn subtopic_text(main_topic: &str, subtopic: &str) -> String {
    format!("{}: {}", main_topic, subtopic)
}

/// 大纲叶子节点及其向量，两者一一对应
#[derive(Debug, Clone, Default)]
pub struct SubtopicIndex {
    pub leaves: Vec<(String, String)>,
    pub vectors: Vec<Vec<f32>>,
}

impl SubtopicIndex {
    /// 需要向量化的文本，顺序与 `leaves` 一致
    pub fn texts(syllabus: &Syllabus) -> Vec<String> {
        syllabus
            .leaves()
            .into_iter()
            .map(|(topic, sub)| subtopic_text(topic, sub))
            .collect()
    }

    pub fn new(syllabus: &Syllabus, vectors: Vec<Vec<f32>>) -> Self {
        let leaves = syllabus
            .leaves()
            .into_iter()
            .map(|(t, s)| (t.to_string(), s.to_string()))
            .collect();
        Self { leaves, vectors }
    }

    /// 与题目向量最相似的前 `max_tags` 个子主题
    pub fn rank(&self, question_vector: &[f32], max_tags: usize) -> Vec<TopicTag> {
        if question_vector.is_empty() {
            return Vec::new();
        }
        top_k(question_vector, &self.vectors, max_tags)
            .into_iter()
            .filter_map(|(i, score)| {
                self.leaves.get(i).map(|(topic, sub)| TopicTag {
                    main_topic: topic.clone(),
                    subtopic: sub.clone(),
                    similarity_score: score,
                })
            })
            .collect()
    }
}

/// 只保留主要主题下的标签，顺序不变
///
/// 主要主题是得分最高的标签所属主题，得分相同时取先出现的。
pub fn primary_tags(tags: &[TopicTag]) -> Vec<TopicTag> {
    let mut best: Option<&TopicTag> = None;
    for tag in tags {
        if best.map_or(true, |b| tag.similarity_score > b.similarity_score) {
            best = Some(tag);
        }
    }

    match best {
        Some(top) => tags
            .iter()
            .filter(|t| t.main_topic == top.main_topic)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// 打标签统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaggingCounts {
    pub tagged: usize,
    pub untagged: usize,
}

fn entry(record: &QuestionRecord, all_tags: Vec<TopicTag>) -> TaggedEntry {
    TaggedEntry {
        question_number: record.question_number.clone(),
        question_text: record.question_text.clone(),
        question_type: record.question_type.clone(),
        all_tags,
        source_file: record.source_file.clone(),
    }
}

/// 按 主题 → 子主题 组织
///
/// 每道题只放在主要主题中得分最高的子主题下；空的子主题和主题被省略。
pub fn organize_by_topic(
    syllabus: &Syllabus,
    questions: &[TaggedQuestion],
) -> (TaggedQuestionBank, TaggingCounts) {
    let mut counts = TaggingCounts::default();
    let mut buckets: Vec<Vec<Vec<TaggedEntry>>> = syllabus
        .topics
        .iter()
        .map(|t| vec![Vec::new(); t.subtopics.len()])
        .collect();

    for question in questions {
        let filtered = primary_tags(&question.tags);
        let Some(top) = filtered.first() else {
            counts.untagged += 1;
            continue;
        };

        let slot = syllabus
            .topics
            .iter()
            .position(|t| t.name == top.main_topic)
            .and_then(|ti| {
                syllabus.topics[ti]
                    .subtopics
                    .iter()
                    .position(|s| *s == top.subtopic)
                    .map(|si| (ti, si))
            });

        match slot {
            Some((ti, si)) => {
                let all_tags = filtered.clone();
                buckets[ti][si].push(entry(&question.record, all_tags));
                counts.tagged += 1;
            }
            None => counts.untagged += 1,
        }
    }

    let topics = syllabus
        .topics
        .iter()
        .zip(buckets)
        .filter_map(|(topic, subs)| {
            let subtopics: Vec<SubtopicGroup> = topic
                .subtopics
                .iter()
                .zip(subs)
                .filter(|(_, questions)| !questions.is_empty())
                .map(|(name, questions)| SubtopicGroup {
                    name: name.clone(),
                    questions,
                })
                .collect();
            (!subtopics.is_empty()).then(|| TopicGroup {
                name: topic.name.clone(),
                subtopics,
            })
        })
        .collect();

    (
        TaggedQuestionBank {
            course_name: syllabus.course_name.clone(),
            topics,
        },
        counts,
    )
}

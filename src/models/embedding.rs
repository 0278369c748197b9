use crate::models::question::{Independence, QuestionNumber, QuestionRecord};
use serde::{Deserialize, Serialize};

/// 与向量一一对应的题目元数据（`question_metadata.json`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub index: usize,
    pub question_number: QuestionNumber,
    pub question_type: String,
    pub sub_questions_independent: Independence,
    pub source_pdf: String,
    pub source_file: String,
    pub original_object: QuestionRecord,
}

impl EmbeddingMetadata {
    pub fn from_record(index: usize, record: &QuestionRecord) -> Self {
        Self {
            index,
            question_number: record.question_number.clone(),
            question_type: record.question_type.clone(),
            sub_questions_independent: record.sub_questions_independent,
            source_pdf: record.source_document.clone(),
            source_file: record.source_file.clone(),
            original_object: record.clone(),
        }
    }
}

/// 用于向量化的文本："[题型] 题目"
pub fn embedding_text(record: &QuestionRecord) -> String {
    format!("[{}] {}", record.question_type, record.question_text)
}

/// 向量库：两个平行数组
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingStore {
    pub vectors: Vec<Vec<f32>>,
    pub metadata: Vec<EmbeddingMetadata>,
}

impl EmbeddingStore {
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// 向量与元数据数量一致
    pub fn is_consistent(&self) -> bool {
        self.vectors.len() == self.metadata.len()
    }
}

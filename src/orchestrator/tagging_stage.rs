//! 打标签阶段 - 编排层
//!
//! ## 职责
//!
//! 1. 选择大纲：配置中的 `tag_syllabus_path`，否则取第一个 `*_analyzed.json`
//! 2. 向量化所有 "{主题}: {子主题}"
//! 3. 用已有题目向量计算标签，按大纲组织后写入 `tagged_questions.json`

use crate::clients::embedding_client::EmbeddingProvider;
use crate::error::{AppResult, FileError};
use crate::models::embedding::EmbeddingStore;
use crate::models::loaders::{files_with_suffix, list_subdirs, read_json, write_json_atomic};
use crate::models::syllabus::{Syllabus, TaggedQuestion};
use crate::services::topic_tagger::{organize_by_topic, SubtopicIndex, TaggingCounts};
use crate::workflow::syllabus_flow::ANALYZED_SUFFIX;
use std::path::{Path, PathBuf};
use tracing::info;

/// 在大纲输出目录（及其一级子目录）中查找第一个结构化大纲
pub async fn find_syllabus(root: &Path) -> AppResult<Option<PathBuf>> {
    let mut candidates = files_with_suffix(root, ANALYZED_SUFFIX).await?;
    for dir in list_subdirs(root).await? {
        candidates.extend(files_with_suffix(&dir, ANALYZED_SUFFIX).await?);
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// 选择本次使用的大纲文件
pub async fn resolve_syllabus_path(configured: Option<&str>, root: &Path) -> AppResult<PathBuf> {
    if let Some(path) = configured {
        return Ok(PathBuf::from(path));
    }
    find_syllabus(root).await?.ok_or_else(|| {
        FileError::NotFound {
            path: root.join(format!("*{}", ANALYZED_SUFFIX)).display().to_string(),
        }
        .into()
    })
}

pub struct TaggingStage<'a> {
    provider: &'a dyn EmbeddingProvider,
    max_tags: usize,
}

impl<'a> TaggingStage<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, max_tags: usize) -> Self {
        Self { provider, max_tags }
    }

    /// 为向量库中的每道题打标签并写入 `output`
    pub async fn run(
        &self,
        syllabus_path: &Path,
        store: &EmbeddingStore,
        output: &Path,
    ) -> AppResult<TaggingCounts> {
        let syllabus: Syllabus = read_json(syllabus_path).await?;
        info!(
            "📚 大纲 '{}'：{} 个主题，{} 个子主题",
            syllabus.course_name,
            syllabus.topics.len(),
            syllabus.leaves().len()
        );

        let texts = SubtopicIndex::texts(&syllabus);
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.provider.embed_batch(&texts).await?
        };
        let index = SubtopicIndex::new(&syllabus, vectors);

        let questions: Vec<TaggedQuestion> = store
            .metadata
            .iter()
            .zip(store.vectors.iter())
            .map(|(meta, vector)| TaggedQuestion {
                record: meta.original_object.clone(),
                tags: index.rank(vector, self.max_tags),
            })
            .collect();

        let (tagged, counts) = organize_by_topic(&syllabus, &questions);
        write_json_atomic(output, &tagged).await?;
        info!("✓ 已保存标签结果 → {}", output.display());
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::embedding::EmbeddingMetadata;
    use crate::models::question::{QuestionNumber, QuestionRecord};
    use crate::models::syllabus::TaggedQuestionBank;
    use async_trait::async_trait;

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| if t.starts_with("Graphs") { vec![0.0, 1.0] } else { vec![1.0, 0.0] })
                .collect())
        }
    }

    fn meta(index: usize, number: &str) -> EmbeddingMetadata {
        let record = QuestionRecord {
            question_number: QuestionNumber::from(number),
            question_text: format!("{}. text", number),
            question_type: "Short Answer".to_string(),
            sub_questions_independent: None,
            source_document: "exam".to_string(),
            source_file: "exam.mmd".to_string(),
            needs_review: false,
        };
        EmbeddingMetadata::from_record(index, &record)
    }

    #[tokio::test]
    async fn test_find_syllabus_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("b/b_analyzed.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a/a_analyzed.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a/a.md"), "").unwrap();

        let found = find_syllabus(dir.path()).await.unwrap().unwrap();
        assert!(found.ends_with("a/a_analyzed.json"));

        let configured = resolve_syllabus_path(Some("/tmp/x.json"), dir.path()).await.unwrap();
        assert_eq!(configured, PathBuf::from("/tmp/x.json"));

        let empty = tempfile::tempdir().unwrap();
        assert!(resolve_syllabus_path(None, empty.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_run_writes_tagged_bank() {
        let dir = tempfile::tempdir().unwrap();
        let syllabus_path = dir.path().join("algo_analyzed.json");
        std::fs::write(
            &syllabus_path,
            r#"{"course_name": "Algorithms", "topics": [
                {"name": "Sorting", "subtopics": ["Merge sort"]},
                {"name": "Graphs", "subtopics": ["BFS"]}
            ]}"#,
        )
        .unwrap();
        let store = EmbeddingStore {
            vectors: vec![vec![0.1, 0.9], vec![], vec![0.9, 0.1]],
            metadata: vec![meta(0, "1"), meta(1, "2"), meta(2, "3")],
        };
        let output = dir.path().join("tagged_questions.json");

        let provider = AxisEmbedder;
        let counts = TaggingStage::new(&provider, 3)
            .run(&syllabus_path, &store, &output)
            .await
            .unwrap();
        assert_eq!(counts, TaggingCounts { tagged: 2, untagged: 1 });

        let saved: TaggedQuestionBank =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved.topics[0].name, "Sorting");
        assert_eq!(saved.topics[0].subtopics[0].questions[0].question_number.as_str(), "3");
        assert_eq!(saved.topics[1].name, "Graphs");
        assert_eq!(saved.topics[1].subtopics[0].questions[0].question_number.as_str(), "1");
    }
}

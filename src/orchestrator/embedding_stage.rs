//! 向量化阶段 - 编排层
//!
//! ## 职责
//!
//! 1. 为题库中每道题生成向量（文本为 "[题型] 题目"）
//! 2. 已有向量且题库未变化时直接复用
//! 3. 保存 `question_embeddings.json` + `question_metadata.json`
//! 4. 按查询文本检索最相似的题目
//!
//! 复用条件：未指定 `--force`、题目数量一致、前 10 道题文本一致。

use crate::clients::embedding_client::EmbeddingProvider;
use crate::error::{AppResult, ProviderError};
use crate::models::bank::QuestionBank;
use crate::models::embedding::{embedding_text, EmbeddingMetadata, EmbeddingStore};
use crate::models::loaders::{read_json_opt, write_json_atomic};
use crate::services::similarity::top_k;
use std::path::PathBuf;
use tracing::{info, warn};

/// 用于判断题库是否变化的抽样数量
const CHANGE_SAMPLE: usize = 10;

/// 一条检索结果
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub metadata: EmbeddingMetadata,
}

/// 已有向量能否继续使用
pub fn can_reuse(store: &EmbeddingStore, bank: &QuestionBank) -> bool {
    if !store.is_consistent() || store.len() != bank.len() {
        return false;
    }
    store
        .metadata
        .iter()
        .zip(bank.iter())
        .take(CHANGE_SAMPLE)
        .all(|(meta, record)| meta.original_object.question_text == record.question_text)
}

pub struct EmbeddingStage<'a> {
    provider: &'a dyn EmbeddingProvider,
    vectors_path: PathBuf,
    metadata_path: PathBuf,
}

impl<'a> EmbeddingStage<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, vectors_path: PathBuf, metadata_path: PathBuf) -> Self {
        Self {
            provider,
            vectors_path,
            metadata_path,
        }
    }

    /// 读取已保存的向量库，任一文件缺失时返回 None
    pub async fn load(&self) -> AppResult<Option<EmbeddingStore>> {
        let vectors: Option<Vec<Vec<f32>>> = read_json_opt(&self.vectors_path).await?;
        let metadata: Option<Vec<EmbeddingMetadata>> = read_json_opt(&self.metadata_path).await?;
        Ok(match (vectors, metadata) {
            (Some(vectors), Some(metadata)) => Some(EmbeddingStore { vectors, metadata }),
            _ => None,
        })
    }

    /// 返回 (向量库, 是否复用)
    pub async fn ensure(&self, bank: &QuestionBank, force: bool) -> AppResult<(EmbeddingStore, bool)> {
        if !force {
            match self.load().await {
                Ok(Some(store)) if can_reuse(&store, bank) => {
                    info!("✓ 题库未变化，复用已有向量 ({} 条)", store.len());
                    return Ok((store, true));
                }
                Ok(Some(_)) => info!("题库已变化，重新生成向量"),
                Ok(None) => info!("没有已保存的向量，开始生成"),
                Err(e) => warn!("⚠️ 读取已有向量失败，重新生成: {}", e),
            }
        }

        let store = self.generate(bank).await?;
        write_json_atomic(&self.vectors_path, &store.vectors).await?;
        write_json_atomic(&self.metadata_path, &store.metadata).await?;
        info!(
            "✓ 已保存 {} 条向量 → {}",
            store.len(),
            self.vectors_path.display()
        );
        Ok((store, false))
    }

    async fn generate(&self, bank: &QuestionBank) -> AppResult<EmbeddingStore> {
        let texts: Vec<String> = bank.iter().map(embedding_text).collect();
        info!("⏳ 使用 {} 向量化 {} 道题", self.provider.model_name(), texts.len());

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.provider.embed_batch(&texts).await?
        };
        if vectors.len() != texts.len() {
            return Err(ProviderError::InvalidResponse {
                endpoint: self.provider.model_name().to_string(),
                message: format!("期望 {} 个向量，实际 {} 个", texts.len(), vectors.len()),
            }
            .into());
        }

        let metadata = bank
            .iter()
            .enumerate()
            .map(|(i, record)| EmbeddingMetadata::from_record(i, record))
            .collect();
        Ok(EmbeddingStore { vectors, metadata })
    }

    /// 检索与查询最相似的 k 道题
    pub async fn search(&self, store: &EmbeddingStore, query: &str, k: usize) -> AppResult<Vec<SearchHit>> {
        let query_vector = self.provider.embed(query).await?;
        Ok(top_k(&query_vector, &store.vectors, k)
            .into_iter()
            .filter_map(|(i, score)| {
                store.metadata.get(i).map(|meta| SearchHit {
                    score,
                    metadata: meta.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{QuestionNumber, QuestionRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按关键字给出固定方向的向量
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    fn vector_for(text: &str) -> Vec<f32> {
        if text.contains("graph") {
            vec![0.0, 1.0]
        } else {
            vec![1.0, 0.0]
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vector_for(t)).collect())
        }
    }

    fn record(number: &str, text: &str) -> QuestionRecord {
        QuestionRecord {
            question_number: QuestionNumber::from(number),
            question_text: text.to_string(),
            question_type: "Short Answer".to_string(),
            sub_questions_independent: Some(false),
            source_document: "exam".to_string(),
            source_file: "exam.mmd".to_string(),
            needs_review: false,
        }
    }

    #[tokio::test]
    async fn test_generate_reuse_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeywordEmbedder {
            calls: AtomicUsize::new(0),
        };
        let stage = EmbeddingStage::new(
            &provider,
            dir.path().join("question_embeddings.json"),
            dir.path().join("question_metadata.json"),
        );
        let bank = QuestionBank::from_records(vec![
            record("1", "Sort this array"),
            record("2", "Traverse the graph"),
        ]);

        let (store, reused) = stage.ensure(&bank, false).await.unwrap();
        assert!(!reused);
        assert_eq!(store.len(), 2);
        assert_eq!(store.metadata[1].source_pdf, "exam");
        assert_eq!(store.metadata[1].index, 1);

        let (_, reused) = stage.ensure(&bank, false).await.unwrap();
        assert!(reused);
        let (_, reused) = stage.ensure(&bank, true).await.unwrap();
        assert!(!reused);

        let changed = QuestionBank::from_records(vec![
            record("1", "Sort this list"),
            record("2", "Traverse the graph"),
        ]);
        let (_, reused) = stage.ensure(&changed, false).await.unwrap();
        assert!(!reused);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        let hits = stage.search(&store, "shortest path in a graph", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.question_number.as_str(), "2");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_can_reuse_requires_same_count() {
        let bank = QuestionBank::from_records(vec![record("1", "a")]);
        let store = EmbeddingStore::default();
        assert!(!can_reuse(&store, &bank));
        assert!(can_reuse(&EmbeddingStore::default(), &QuestionBank::new()));
    }
}

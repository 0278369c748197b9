//! 文档处理上下文
//!
//! 封装"我正在处理哪个文档"这一信息

use crate::error::AppResult;
use crate::models::loaders::{derived_path, file_stem, files_with_suffix, list_subdirs};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// 第一遍结果文件后缀
pub const POST1_SUFFIX: &str = "_post1.json";

/// 文档处理上下文
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCtx {
    /// 来源文档（PDF 目录名）
    pub source_document: String,
    /// 文件名去掉扩展名
    pub stem: String,
    /// OCR 文本路径（`.mmd` 或 `.md`）
    pub text_path: PathBuf,
    /// 文档序号（仅用于日志显示，从 1 开始）
    pub index: usize,
}

impl DocumentCtx {
    pub fn new(text_path: &Path, index: usize) -> Self {
        let source_document = text_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            source_document,
            stem: file_stem(text_path),
            text_path: text_path.to_path_buf(),
            index,
        }
    }

    /// 查找 `<root>/<文档目录>/*<suffix>`，按目录名、文件名排序，序号从 1 开始
    pub async fn discover(root: &Path, suffix: &str) -> AppResult<Vec<Self>> {
        let mut docs = Vec::new();
        for dir in list_subdirs(root).await? {
            for path in files_with_suffix(&dir, suffix).await? {
                docs.push(Self::new(&path, docs.len() + 1));
            }
        }
        Ok(docs)
    }

    /// `<stem>_post1.json`
    pub fn post1_path(&self) -> PathBuf {
        derived_path(&self.text_path, POST1_SUFFIX)
    }

    /// 同目录下的其他派生文件
    pub fn derived(&self, suffix: &str) -> PathBuf {
        derived_path(&self.text_path, suffix)
    }
}

impl Display for DocumentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文档 {}/{}]", self.source_document, self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctx_paths_and_display() {
        let ctx = DocumentCtx::new(Path::new("/data/ocr_results/exam_2023/exam_2023.mmd"), 1);
        assert_eq!(ctx.source_document, "exam_2023");
        assert_eq!(ctx.stem, "exam_2023");
        assert_eq!(
            ctx.post1_path(),
            PathBuf::from("/data/ocr_results/exam_2023/exam_2023_post1.json")
        );
        assert_eq!(ctx.to_string(), "[文档 exam_2023/exam_2023]");
    }

    #[tokio::test]
    async fn test_discover_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_exam", "a_exam"] {
            let doc_dir = dir.path().join(name);
            std::fs::create_dir_all(&doc_dir).unwrap();
            std::fs::write(doc_dir.join(format!("{}.mmd", name)), "1. Q").unwrap();
            std::fs::write(doc_dir.join(format!("{}.lines.mmd.json", name)), "[]").unwrap();
        }
        std::fs::write(dir.path().join("processed_files.json"), "{}").unwrap();

        let docs = DocumentCtx::discover(dir.path(), ".mmd").await.unwrap();
        let stems: Vec<&str> = docs.iter().map(|d| d.stem.as_str()).collect();
        assert_eq!(stems, vec!["a_exam", "b_exam"]);
        assert_eq!(docs[1].index, 2);
    }
}

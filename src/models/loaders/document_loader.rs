use crate::error::{AppError, AppResult};
use crate::models::document::RawDocument;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// 列出目录下所有子目录（按名称排序），目录不存在时返回空列表
pub async fn list_subdirs(folder: &Path) -> AppResult<Vec<PathBuf>> {
    list_entries(folder, |p| p.is_dir()).await
}

/// 列出目录下文件名以 `suffix` 结尾的文件（按名称排序）
pub async fn files_with_suffix(folder: &Path, suffix: &str) -> AppResult<Vec<PathBuf>> {
    list_entries(folder, |p| {
        p.is_file()
            && p
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(suffix))
                .unwrap_or(false)
    })
    .await
}

async fn list_entries(folder: &Path, keep: impl Fn(&Path) -> bool) -> AppResult<Vec<PathBuf>> {
    if !folder.exists() {
        warn!("目录不存在: {}", folder.display());
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder.display().to_string(), e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder.display().to_string(), e))?
    {
        let path = entry.path();
        if keep(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// 文件名去掉扩展名的部分
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 同目录下的派生文件：`<stem><suffix>`
///
/// 例如 `exam.mmd` + `_post1.json` → `exam_post1.json`
pub fn derived_path(path: &Path, suffix: &str) -> PathBuf {
    path.with_file_name(format!("{}{}", file_stem(path), suffix))
}

/// 读取 `.mmd` 文件，来源文档取所在目录名
pub async fn load_raw_document(path: &Path) -> AppResult<RawDocument> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let source_document = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(RawDocument::from_text(source_document, source_file, &text))
}

use crate::error::{AppError, AppResult, FileError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 读取并解析 JSON 文件
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    serde_json::from_str(&content).map_err(|e| {
        FileError::JsonParseFailed {
            path: path.display().to_string(),
            source: e,
        }
        .into()
    })
}

/// 文件不存在时返回 None
pub async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).await.map(Some)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// 先写临时文件再重命名，目标文件要么是旧内容要么是完整的新内容
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
    }

    let tmp = temp_path(path);
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
}

/// 格式化输出 JSON
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| FileError::JsonParseFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    write_bytes_atomic(path, content.as_bytes()).await
}

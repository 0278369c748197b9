//! OCR 阶段 - 编排层
//!
//! ## 职责
//!
//! 1. 递归查找输入目录下的 PDF
//! 2. 跳过已处理且输出目录非空的 PDF
//! 3. 已处理但输出缺失的 PDF 只重新下载转换结果
//! 4. 新 PDF：上传 → （流式读取）→ 等待完成 → 下载各格式
//! 5. 维护 `processed_files.json`（相对路径 → pdf_id）

use crate::clients::mathpix_client::{concat_stream_text, MathpixClient};
use crate::clients::polling::PollPolicy;
use crate::error::{AppError, AppResult};
use crate::models::loaders::{file_stem, read_json_opt, write_bytes_atomic, write_json_atomic};
use crate::orchestrator::extraction_target::ExtractionTarget;
use crate::orchestrator::pipeline::StageStats;
use crate::workflow::ProcessResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 已处理文件表：相对路径 → pdf_id
pub type ProcessedFiles = BTreeMap<String, String>;

/// 递归查找 PDF（扩展名不区分大小写），按路径排序
pub async fn find_pdfs(root: &Path) -> AppResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// 相对于输入目录的路径，统一用 `/` 分隔
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// 目录存在且非空
async fn has_outputs(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// OCR 阶段
pub struct OcrStage<'a> {
    client: &'a MathpixClient,
    target: ExtractionTarget,
    poll: PollPolicy,
}

impl<'a> OcrStage<'a> {
    pub fn new(client: &'a MathpixClient, target: ExtractionTarget, poll: PollPolicy) -> Self {
        Self {
            client,
            target,
            poll,
        }
    }

    pub async fn run(&self) -> AppResult<StageStats> {
        info!("📁 OCR 目标: {}", self.target);
        let pdfs = find_pdfs(&self.target.input_dir).await?;
        let mut stats = StageStats::default();

        if pdfs.is_empty() {
            warn!("⚠️ {} 下没有找到 PDF", self.target.input_dir.display());
            return Ok(stats);
        }
        info!("✓ 找到 {} 个 PDF", pdfs.len());

        let map_path = self.target.processed_map_path();
        let mut processed: ProcessedFiles = read_json_opt(&map_path).await?.unwrap_or_default();

        for (i, pdf) in pdfs.iter().enumerate() {
            let key = relative_key(&self.target.input_dir, pdf);
            let stem = file_stem(pdf);
            let out_dir = self.target.document_dir(&stem);
            info!("\n📄 [{}/{}] {}", i + 1, pdfs.len(), key);

            if processed.contains_key(&key) && has_outputs(&out_dir).await {
                info!("[文档 {}] ⏭️ 已处理，跳过", stem);
                stats.record(ProcessResult::Skipped);
                continue;
            }

            let result = match processed.get(&key) {
                Some(pdf_id) => {
                    info!("[文档 {}] 输出缺失，重新下载 (pdf_id: {})", stem, pdf_id);
                    self.download_formats(pdf_id, &out_dir, &stem).await
                }
                None => match self.process_new(pdf, &out_dir, &stem).await {
                    Ok(Some(pdf_id)) => {
                        processed.insert(key.clone(), pdf_id);
                        write_json_atomic(&map_path, &processed).await?;
                        ProcessResult::Success
                    }
                    Ok(None) => ProcessResult::Failed,
                    Err(e) => {
                        error!("[文档 {}] ❌ {}", stem, e);
                        ProcessResult::Failed
                    }
                },
            };
            stats.record(result);
        }

        Ok(stats)
    }

    /// 处理新 PDF，成功时返回 pdf_id
    async fn process_new(&self, pdf: &Path, out_dir: &Path, stem: &str) -> AppResult<Option<String>> {
        let bytes = tokio::fs::read(pdf)
            .await
            .map_err(|e| AppError::file_read_failed(pdf.display().to_string(), e))?;
        let file_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.pdf", stem));

        let pdf_id = self
            .client
            .upload_pdf(&file_name, bytes, &self.target.upload_options())
            .await?;

        // 上传成功后一定记录 pdf_id，流式失败只影响本次输出
        if self.target.streaming {
            if let Err(e) = self.save_stream(&pdf_id, out_dir, stem).await {
                warn!("[文档 {}] ⚠️ 流式读取失败，改为直接下载: {}", stem, e);
            }
            self.download_formats(&pdf_id, out_dir, stem).await;
            return Ok(Some(pdf_id));
        }

        match self.download_formats(&pdf_id, out_dir, stem).await {
            ProcessResult::Success => Ok(Some(pdf_id)),
            _ => Ok(None),
        }
    }

    /// 等待处理完成后下载各格式，至少下载到一个即成功
    async fn save_stream(&self, pdf_id: &str, out_dir: &Path, stem: &str) -> AppResult<()> {
        let chunks = self.client.stream_pdf(pdf_id).await?;
        write_json_atomic(&out_dir.join(format!("{}_results.json", stem)), &chunks).await?;
        let text = concat_stream_text(&chunks);
        write_bytes_atomic(&out_dir.join(format!("{}.mmd", stem)), text.as_bytes()).await?;
        info!("[文档 {}] ✓ 流式结果已保存", stem);
        Ok(())
    }

    async fn download_formats(&self, pdf_id: &str, out_dir: &Path, stem: &str) -> ProcessResult {
        if let Err(e) = self.client.wait_for_processing(pdf_id, &self.poll).await {
            warn!("[文档 {}] ⚠️ 处理未完成，部分格式可能不可用: {}", stem, e);
        }

        let mut downloaded = 0;
        for ext in self.target.formats {
            match self.client.download_format(pdf_id, ext).await {
                Ok(bytes) => {
                    let path = out_dir.join(format!("{}.{}", stem, ext));
                    match write_bytes_atomic(&path, &bytes).await {
                        Ok(()) => {
                            info!("[文档 {}] ✓ 已下载 {}", stem, ext);
                            downloaded += 1;
                        }
                        Err(e) => error!("[文档 {}] ❌ {}", stem, e),
                    }
                }
                Err(e) => warn!("[文档 {}] ⚠️ 下载 {} 失败: {}", stem, ext, e),
            }
        }

        if downloaded > 0 {
            ProcessResult::Success
        } else {
            ProcessResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_pdfs_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2023/spring")).unwrap();
        std::fs::write(root.join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(root.join("a.PDF"), b"%PDF").unwrap();
        std::fs::write(root.join("2023/spring/final.pdf"), b"%PDF").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();

        let pdfs = find_pdfs(root).await.unwrap();
        let keys: Vec<String> = pdfs.iter().map(|p| relative_key(root, p)).collect();
        assert_eq!(keys, vec!["2023/spring/final.pdf", "a.PDF", "b.pdf"]);

        assert!(find_pdfs(&root.join("missing")).await.unwrap().is_empty());
    }

    /// 本地 Mathpix 替身：上传成功，流式接口返回 500，其余按路径应答
    async fn serve_mathpix(listener: tokio::net::TcpListener) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                // 读完请求头和 Content-Length 指定的请求体
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        let chunked = text[..end].to_ascii_lowercase().contains("transfer-encoding: chunked");
                        if (chunked && buf.ends_with(b"0\r\n\r\n"))
                            || (!chunked && buf.len() >= end + 4 + length)
                        {
                            break;
                        }
                    }
                }

                let request = String::from_utf8_lossy(&buf).to_string();
                let line = request.lines().next().unwrap_or_default().to_string();
                let (status, body) = if line.starts_with("POST /v3/pdf ") {
                    ("200 OK", r#"{"pdf_id": "pdf_123"}"#)
                } else if line.starts_with("GET /v3/pdf/pdf_123/stream ") {
                    ("500 Internal Server Error", "stream broken")
                } else if line.starts_with("GET /v3/pdf/pdf_123 ") {
                    ("200 OK", r#"{"status": "completed"}"#)
                } else if line.starts_with("GET /v3/pdf/pdf_123.mmd ") {
                    ("200 OK", "1. What is X?")
                } else {
                    ("404 Not Found", "")
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    }

    #[tokio::test]
    async fn test_stream_failure_still_records_pdf_id() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_mathpix(listener));

        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::Config {
            data_root: dir.path().display().to_string(),
            ..crate::config::Config::default()
        };
        let target = ExtractionTarget::questions(&config);
        std::fs::create_dir_all(&target.input_dir).unwrap();
        std::fs::write(target.input_dir.join("exam.pdf"), b"%PDF-1.4").unwrap();

        let client = MathpixClient::new("id", "key", format!("http://{}/v3/pdf", addr));
        let stats = OcrStage::new(&client, target.clone(), PollPolicy::new(1, 1))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.success, 1);

        // 流式失败不影响记录，下次运行不会重复上传
        let processed: ProcessedFiles = serde_json::from_str(
            &std::fs::read_to_string(target.processed_map_path()).unwrap(),
        )
        .unwrap();
        assert_eq!(processed.get("exam.pdf").map(String::as_str), Some("pdf_123"));
        let mmd = std::fs::read_to_string(target.document_dir("exam").join("exam.mmd")).unwrap();
        assert_eq!(mmd, "1. What is X?");
        assert!(!target.document_dir("exam").join("exam_results.json").exists());
    }

    #[tokio::test]
    async fn test_has_outputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_outputs(&dir.path().join("none")).await);
        assert!(!has_outputs(dir.path()).await);
        std::fs::write(dir.path().join("exam.md"), "x").unwrap();
        assert!(has_outputs(dir.path()).await);
    }
}

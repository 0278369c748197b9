//! OCR 抽取目标
//!
//! 题目抽取与大纲抽取只在目录、是否流式、下载格式上不同，用一个策略值区分。

use crate::clients::mathpix_client::upload_options;
use crate::config::Config;
use serde_json::Value;
use std::fmt::Display;
use std::path::PathBuf;

/// OCR 抽取目标
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionTarget {
    /// 日志名称
    pub name: &'static str,
    /// PDF 输入目录（递归查找）
    pub input_dir: PathBuf,
    /// 输出目录，每个 PDF 一个子目录
    pub output_dir: PathBuf,
    /// 是否读取流式结果
    pub streaming: bool,
    /// 处理完成后直接下载的格式
    pub formats: &'static [&'static str],
}

impl ExtractionTarget {
    /// 试卷：`data/sample_papers` → `data/ocr_results`
    pub fn questions(config: &Config) -> Self {
        Self {
            name: "试卷",
            input_dir: config.sample_papers_dir(),
            output_dir: config.ocr_results_dir(),
            streaming: true,
            formats: &["mmd", "md", "lines.mmd.json"],
        }
    }

    /// 大纲：`data/syllabus` → `data/syllabus_extract_ocr`
    pub fn syllabus(config: &Config) -> Self {
        Self {
            name: "大纲",
            input_dir: config.syllabus_input_dir(),
            output_dir: config.syllabus_output_dir(),
            streaming: false,
            formats: &["md"],
        }
    }

    pub fn upload_options(&self) -> Value {
        upload_options(self.streaming)
    }

    /// `<output_dir>/<stem>/`
    pub fn document_dir(&self, stem: &str) -> PathBuf {
        self.output_dir.join(stem)
    }

    /// `<output_dir>/processed_files.json`
    pub fn processed_map_path(&self) -> PathBuf {
        self.output_dir.join("processed_files.json")
    }
}

impl Display for ExtractionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} → {})",
            self.name,
            self.input_dir.display(),
            self.output_dir.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        let config = Config {
            data_root: "/srv".to_string(),
            ..Config::default()
        };
        let questions = ExtractionTarget::questions(&config);
        assert!(questions.streaming);
        assert_eq!(questions.formats, &["mmd", "md", "lines.mmd.json"]);
        assert_eq!(questions.document_dir("exam"), PathBuf::from("/srv/data/ocr_results/exam"));
        assert_eq!(questions.upload_options()["streaming"], Value::Bool(true));

        let syllabus = ExtractionTarget::syllabus(&config);
        assert!(!syllabus.streaming);
        assert_eq!(syllabus.formats, &["md"]);
        assert_eq!(
            syllabus.processed_map_path(),
            PathBuf::from("/srv/data/syllabus_extract_ocr/processed_files.json")
        );
    }
}

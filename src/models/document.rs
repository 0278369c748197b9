/// OCR 产出的原始文档
///
/// 按 `\n` 切分成行，构造后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// 来源文档（PDF 目录名）
    pub source_document: String,
    /// 来源文件（.mmd 文件名）
    pub source_file: String,
    pub lines: Vec<String>,
}

impl RawDocument {
    pub fn from_text(
        source_document: impl Into<String>,
        source_file: impl Into<String>,
        text: &str,
    ) -> Self {
        Self {
            source_document: source_document.into(),
            source_file: source_file.into(),
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// 还原全文
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// 连接 `[start, end)` 行，保留换行
    pub fn span_text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].join("\n")
    }
}

//! 题库
//!
//! 每次运行整体读入、修改、整体覆盖写回；更新只通过 [`QuestionBank::apply_updates`]
//! 一次性完成。

use crate::error::{AppResult, FileError};
use crate::models::loaders::json_store;
use crate::models::question::QuestionRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 对单条记录的修改
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// 复核后判定子题不独立：原地改为 false
    MarkDependent,
    /// 删除原记录，子题追加到题库末尾
    Replace(Vec<QuestionRecord>),
}

/// 一次 `apply_updates` 的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub marked_dependent: usize,
    pub removed: usize,
    pub appended: usize,
}

/// 有序题库
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionBank {
    pub records: Vec<QuestionRecord>,
}

impl QuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<QuestionRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.records.iter()
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = QuestionRecord>) {
        self.records.extend(records);
    }

    /// 读取题库，文件不存在时报错
    pub async fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(FileError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        json_store::read_json(path).await
    }

    /// 整体覆盖写回
    pub async fn save(&self, path: &Path) -> AppResult<()> {
        json_store::write_json_atomic(path, self).await
    }

    /// 应用一批修改
    ///
    /// 下标指向修改前的题库。被替换的记录删除后，其子题按替换顺序追加到末尾；
    /// 未被修改的记录保持相对顺序。
    pub fn apply_updates(&mut self, updates: Vec<(usize, RecordUpdate)>) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut by_index: HashMap<usize, RecordUpdate> = HashMap::new();
        let mut order = Vec::new();
        for (idx, update) in updates {
            if idx < self.records.len() && !by_index.contains_key(&idx) {
                order.push(idx);
                by_index.insert(idx, update);
            }
        }

        let mut appended = Vec::new();
        let mut children_of: HashMap<usize, Vec<QuestionRecord>> = HashMap::new();
        let mut kept = Vec::with_capacity(self.records.len());

        for (idx, mut record) in std::mem::take(&mut self.records).into_iter().enumerate() {
            match by_index.remove(&idx) {
                Some(RecordUpdate::MarkDependent) => {
                    record.sub_questions_independent = Some(false);
                    summary.marked_dependent += 1;
                    kept.push(record);
                }
                Some(RecordUpdate::Replace(children)) => {
                    summary.removed += 1;
                    children_of.insert(idx, children);
                }
                None => kept.push(record),
            }
        }

        for idx in order {
            if let Some(children) = children_of.remove(&idx) {
                appended.extend(children);
            }
        }

        summary.appended = appended.len();
        kept.extend(appended);
        self.records = kept;
        summary
    }
}

//! LLM 响应解析 - 业务能力层
//!
//! 职责：
//! - 第一遍定位/分类：空行分隔的三行文本块 → `AnchorSet`
//! - 子题复核：响应中第一个含 `sub_questions_independent` 的 JSON 对象
//! - 大纲结构化：整段 JSON 或 ```json 代码块
//!
//! 解析失败统一返回 `ExtractError::ParseFailure`，由调用方跳过该工作单元。

use crate::error::{AppError, AppResult};
use crate::models::question::{AnchorSet, Independence, QuestionAnchor};
use crate::models::syllabus::Syllabus;
use crate::services::subquestion_splitter::SubQuestionJudgment;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

const START_PREFIX: &str = "question_start:";
const TYPE_PREFIX: &str = "question_type:";
const INDEPENDENT_PREFIX: &str = "sub_questions_independent:";

fn parse_independence(value: &str) -> Independence {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// 解析一个三行文本块，缺少任一字段返回 None
fn parse_block(block: &str) -> Option<QuestionAnchor> {
    let lines: Vec<&str> = block.trim().split('\n').map(str::trim).collect();
    if lines.len() != 3 {
        return None;
    }

    let mut start = None;
    let mut question_type = None;
    let mut independent = None;
    for line in lines {
        if let Some(rest) = line.strip_prefix(START_PREFIX) {
            start = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(TYPE_PREFIX) {
            question_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(INDEPENDENT_PREFIX) {
            independent = Some(parse_independence(rest.trim()));
        }
    }

    Some(QuestionAnchor {
        start_snippet: start?,
        question_type: question_type?,
        sub_questions_independent: independent?,
    })
}

/// 解析第一遍响应
///
/// 格式不符的块被跳过；一个有效块都没有时返回解析失败。
pub fn parse_anchor_blocks(response: &str) -> AppResult<AnchorSet> {
    let normalized = response.replace("\r\n", "\n");
    let mut anchors = Vec::new();
    for block in normalized.trim().split("\n\n") {
        match parse_block(block) {
            Some(anchor) => anchors.push(anchor),
            None => debug!("跳过格式不符的块: {}", crate::utils::truncate_text(block, 60)),
        }
    }

    if anchors.is_empty() {
        return Err(AppError::parse_failure("定位/分类结果", response));
    }
    Ok(AnchorSet::from_ordered(anchors))
}

/// 从 `start`（必须是 '{'）开始找到配对的 '}'，跳过字符串内的括号
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// 按出现顺序返回所有能解析的 JSON 对象
fn json_objects(text: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    for (start, _) in text.match_indices('{') {
        if let Some(end) = balanced_object_end(text, start) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                if value.is_object() {
                    objects.push(value);
                }
            }
        }
    }
    objects
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// 解析子题复核结果
pub fn parse_judgment(response: &str) -> AppResult<SubQuestionJudgment> {
    let object = json_objects(response)
        .into_iter()
        .find(|v| v.get("sub_questions_independent").is_some())
        .ok_or_else(|| AppError::parse_failure("子题判断结果", response))?;

    let independent = object
        .get("sub_questions_independent")
        .map(truthy)
        .unwrap_or(false);
    let question_starts = object
        .get("question_starts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(SubQuestionJudgment {
        independent,
        question_starts,
    })
}

/// 解析大纲结构化结果
pub fn parse_syllabus(response: &str) -> AppResult<Syllabus> {
    if let Ok(syllabus) = serde_json::from_str::<Syllabus>(response.trim()) {
        return Ok(syllabus);
    }

    if let Ok(re) = Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```") {
        if let Some(body) = re.captures(response).and_then(|c| c.get(1)) {
            if let Ok(syllabus) = serde_json::from_str::<Syllabus>(body.as_str()) {
                return Ok(syllabus);
            }
        }
    }

    Err(AppError::parse_failure("大纲结构", response))
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as JsonValue};

use super::question::QuestionKind;

/// 草稿答案的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Origin {
    /// 学生输入
    Typed,
    /// 从之前的作答复制而来，尚未被修改
    Prefilled { from_attempt: u32 },
}

/// 当前作答中某道题的草稿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftAnswer {
    pub value: String,
    pub attempt: u32,
    pub origin: Origin,
}

impl DraftAnswer {
    pub fn is_prefilled(&self) -> bool {
        matches!(self.origin, Origin::Prefilled { .. })
    }
}

/// 答案值为空（或只有空白）即视为"未作答"
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// 后端持久化的答案（只读）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmittedAnswer {
    #[serde(default)]
    pub id: Option<String>,
    pub question_id: String,
    #[serde(rename = "answer", deserialize_with = "deserialize_answer_value")]
    pub value: String,
    #[serde(default)]
    pub correct: Option<bool>,
    pub attempt: u32,
}

impl SubmittedAnswer {
    pub fn has_value(&self) -> bool {
        !is_blank(&self.value)
    }
}

/// 后端的答案字段可能是纯字符串，也可能是 JSON 对象：
/// `{selected_option_id}`（新）、`{selected_option}`（旧）或 `{text_response}`
fn deserialize_answer_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    Ok(answer_value_from_json(&raw))
}

pub fn answer_value_from_json(raw: &JsonValue) -> String {
    match raw {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(map) => ["selected_option_id", "selected_option", "text_response", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// 构建 save-answer 的 answer 字段；空文本即删除信号
pub fn answer_payload(kind: QuestionKind, value: &str) -> JsonValue {
    let value = if is_blank(value) { "" } else { value };
    match kind {
        QuestionKind::MultipleChoice => json!({ "selected_option_id": value }),
        QuestionKind::ShortText | QuestionKind::LongText => json!({ "text_response": value }),
    }
}

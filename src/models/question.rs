use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[serde(alias = "mcq")]
    MultipleChoice,
    #[serde(alias = "short")]
    ShortText,
    #[serde(alias = "essay", alias = "long")]
    LongText,
}

impl QuestionKind {
    /// 选择题是一次离散事件，立即保存；文本题按键流需要防抖
    pub fn saves_immediately(self) -> bool {
        matches!(self, QuestionKind::MultipleChoice)
    }

    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "MCQ",
            QuestionKind::ShortText => "Short",
            QuestionKind::LongText => "Essay",
        }
    }
}

/// 题目（会话期间不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub text: String,
    /// 选项标签 → 选项文本，仅选择题
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// 参考答案，提交前不展示给学生
    #[serde(default, skip_serializing)]
    pub correct_reference: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, kind: QuestionKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            options: BTreeMap::new(),
            document_id: None,
            correct_reference: None,
        }
    }

    pub fn with_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options = options
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

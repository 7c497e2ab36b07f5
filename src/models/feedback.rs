use serde::{Deserialize, Serialize};

/// 单道题的 AI 反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    #[serde(default)]
    pub answer_id: Option<String>,
    pub question_id: String,
    pub attempt: u32,
    pub is_correct: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub improvement_hint: String,
}

/// 复习界面中每道题的反馈状态
///
/// 用一个枚举代替三个独立的布尔值："未作答"和"生成中"在结构上就不会混淆。
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionFeedback {
    /// 本次作答未回答该题（永久状态）
    Unanswered,
    /// 已回答，反馈尚未生成（暂时状态）
    Generating,
    /// 反馈已就绪
    Ready(FeedbackItem),
}

impl QuestionFeedback {
    pub fn is_ready(&self) -> bool {
        matches!(self, QuestionFeedback::Ready(_))
    }
}

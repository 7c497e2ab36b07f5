use serde::Deserialize;

/// 服务端的提交状态（由后端计算，客户端只做镜像）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmissionStatus {
    pub current_attempt: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub submission_count: u32,
    #[serde(default)]
    pub all_attempts_done: bool,
    #[serde(default)]
    pub can_submit_again: Option<bool>,
}

impl SubmissionStatus {
    /// 服务端不可达时的默认状态：第一次作答，可编辑
    pub fn first_attempt() -> Self {
        Self {
            current_attempt: 1,
            max_attempts: 1,
            submission_count: 0,
            all_attempts_done: false,
            can_submit_again: None,
        }
    }

    /// 提交 `attempt` 之后是否还有剩余作答机会
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// submit-test 的响应
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitTestResponse {
    pub success: bool,
    #[serde(default)]
    pub questions_submitted: u32,
    #[serde(default)]
    pub feedback_generated: u32,
    #[serde(default)]
    pub can_retry: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// 反馈生成进度
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedbackStatus {
    pub feedback_ready: u32,
    pub total_questions: u32,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub all_complete: bool,
}

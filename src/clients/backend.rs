//! 后端边界
//!
//! 答案存储、正确性判定与 AI 反馈生成都在服务端完成，这里只描述请求/响应形状。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::models::{FeedbackItem, FeedbackStatus, SubmissionStatus, SubmitTestResponse, SubmittedAnswer};

/// save-answer 请求体
///
/// 以 `(student_id, question_id, module_id, attempt)` 为幂等键做 upsert，
/// 空答案即删除信号。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveAnswerRequest {
    pub student_id: String,
    pub question_id: String,
    pub module_id: String,
    pub document_id: Option<String>,
    pub answer: JsonValue,
    pub attempt: u32,
}

/// 测试作答子系统依赖的后端接口
#[async_trait]
pub trait Backend: Send + Sync {
    /// GET submission-status
    async fn submission_status(&self, student_id: &str, module_id: &str) -> AppResult<SubmissionStatus>;

    /// POST save-answer
    async fn save_answer(&self, request: &SaveAnswerRequest) -> AppResult<()>;

    /// GET my-answers
    async fn my_answers(
        &self,
        student_id: &str,
        module_id: &str,
        attempt: u32,
    ) -> AppResult<Vec<SubmittedAnswer>>;

    /// POST submit-test，关闭该次作答
    async fn submit_test(
        &self,
        student_id: &str,
        module_id: &str,
        attempt: u32,
    ) -> AppResult<SubmitTestResponse>;

    /// GET feedback-status
    async fn feedback_status(&self, student_id: &str, attempt: u32) -> AppResult<FeedbackStatus>;

    /// GET feedback
    async fn feedback(&self, student_id: &str) -> AppResult<Vec<FeedbackItem>>;
}

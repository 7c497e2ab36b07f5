//! 测试用的内存后端
//!
//! 行为与真实后端一致的部分：按 `(学生, 题目, 模块, 作答次数)` upsert，空答案即删除，
//! submit-test 推进作答次数。其余行为（失败、反馈进度）由用例脚本化控制。

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use attempt_sync::models::answer::answer_value_from_json;
use attempt_sync::utils::logging;
use attempt_sync::models::{FeedbackStatus, SubmitTestResponse, SubmittedAnswer};
use attempt_sync::{
    ApiError, AppError, AppResult, Backend, Config, FeedbackItem, Question, QuestionKind,
    SaveAnswerRequest, SessionCtx, SubmissionStatus,
};

pub const STUDENT: &str = "stu-1";
pub const MODULE: &str = "mod-bio";

type AnswerKey = (String, String, String, u32);

#[derive(Default)]
pub struct FakeState {
    pub status: Option<SubmissionStatus>,
    /// submission-status 持续不可用（submit-test 仍然生效）
    pub status_down: bool,
    /// save-answer 的响应延迟
    pub save_delay: Option<Duration>,
    pub failing_my_answers: bool,
    /// 请求落地的顺序，如 `save:q2`、`submit:1`
    pub call_log: Vec<String>,
    pub answers: BTreeMap<AnswerKey, JsonValue>,
    pub save_log: Vec<SaveAnswerRequest>,
    pub failing_saves: HashSet<String>,
    pub reject_submit: Option<String>,
    pub submit_calls: Vec<u32>,
    pub status_calls: u32,
    pub feedback_steps: VecDeque<(FeedbackStatus, Vec<FeedbackItem>)>,
    pub current_feedback: Option<(FeedbackStatus, Vec<FeedbackItem>)>,
    pub feedback_status_calls: u32,
}

/// 内存后端
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new(current_attempt: u32, max_attempts: u32) -> Self {
        let backend = Self::default();
        backend.state().status = Some(SubmissionStatus {
            current_attempt,
            max_attempts,
            submission_count: current_attempt - 1,
            all_attempts_done: false,
            can_submit_again: Some(true),
        });
        backend
    }

    /// submission-status 不可用
    pub fn unreachable() -> Self {
        let backend = Self::default();
        backend.state().status_down = true;
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// 直接写入一条已持久化的答案（模拟之前的作答）
    pub fn seed_answer(&self, question_id: &str, attempt: u32, answer: JsonValue) {
        self.state().answers.insert(
            (
                STUDENT.to_string(),
                question_id.to_string(),
                MODULE.to_string(),
                attempt,
            ),
            answer,
        );
    }

    /// 后端持久化的答案值（解码后）
    pub fn persisted(&self, question_id: &str, attempt: u32) -> Option<String> {
        self.state()
            .answers
            .get(&(
                STUDENT.to_string(),
                question_id.to_string(),
                MODULE.to_string(),
                attempt,
            ))
            .map(answer_value_from_json)
    }

    pub fn records_for(&self, attempt: u32) -> usize {
        self.state()
            .answers
            .keys()
            .filter(|(_, _, _, a)| *a == attempt)
            .count()
    }

    pub fn saves_for(&self, question_id: &str) -> Vec<SaveAnswerRequest> {
        self.state()
            .save_log
            .iter()
            .filter(|r| r.question_id == question_id)
            .cloned()
            .collect()
    }

    pub fn save_count(&self) -> usize {
        self.state().save_log.len()
    }

    pub fn fail_saves_for(&self, question_id: &str) {
        self.state().failing_saves.insert(question_id.to_string());
    }

    pub fn delay_saves(&self, delay: Duration) {
        self.state().save_delay = Some(delay);
    }

    pub fn fail_my_answers(&self, failing: bool) {
        self.state().failing_my_answers = failing;
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    pub fn reject_submit(&self, message: &str) {
        self.state().reject_submit = Some(message.to_string());
    }

    pub fn script_feedback<I>(&self, steps: I)
    where
        I: IntoIterator<Item = (FeedbackStatus, Vec<FeedbackItem>)>,
    {
        self.state().feedback_steps = steps.into_iter().collect();
    }

    pub fn feedback_status_calls(&self) -> u32 {
        self.state().feedback_status_calls
    }

    fn non_empty_answers(state: &FakeState, attempt: u32) -> u32 {
        state
            .answers
            .iter()
            .filter(|((_, _, _, a), v)| *a == attempt && !answer_value_from_json(v).is_empty())
            .count() as u32
    }
}

fn bad_response(endpoint: &str, status: u16, message: &str) -> AppError {
    AppError::Api(ApiError::BadResponse {
        endpoint: endpoint.to_string(),
        status,
        message: Some(message.to_string()),
    })
}

#[async_trait]
impl Backend for FakeBackend {
    async fn submission_status(&self, _student_id: &str, _module_id: &str) -> AppResult<SubmissionStatus> {
        let mut state = self.state();
        state.status_calls += 1;
        if state.status_down {
            return Err(bad_response("submission-status", 503, "unavailable"));
        }
        state
            .status
            .clone()
            .ok_or_else(|| bad_response("submission-status", 503, "unavailable"))
    }

    async fn save_answer(&self, request: &SaveAnswerRequest) -> AppResult<()> {
        let delay = self.state().save_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.call_log.push(format!("save:{}", request.question_id));
        state.save_log.push(request.clone());
        if state.failing_saves.contains(&request.question_id) {
            return Err(bad_response("save-answer", 500, "database unavailable"));
        }

        let key = (
            request.student_id.clone(),
            request.question_id.clone(),
            request.module_id.clone(),
            request.attempt,
        );
        if answer_value_from_json(&request.answer).is_empty() {
            state.answers.remove(&key);
        } else {
            state.answers.insert(key, request.answer.clone());
        }
        Ok(())
    }

    async fn my_answers(
        &self,
        student_id: &str,
        module_id: &str,
        attempt: u32,
    ) -> AppResult<Vec<SubmittedAnswer>> {
        let state = self.state();
        if state.failing_my_answers {
            return Err(bad_response("my-answers", 500, "database unavailable"));
        }
        let rows: Vec<JsonValue> = state
            .answers
            .iter()
            .filter(|((s, _, m, a), _)| s == student_id && m == module_id && *a == attempt)
            .map(|((_, q, _, a), answer)| {
                json!({"question_id": q, "answer": answer, "attempt": a})
            })
            .collect();
        Ok(serde_json::from_value(JsonValue::Array(rows)).unwrap())
    }

    async fn submit_test(
        &self,
        _student_id: &str,
        _module_id: &str,
        attempt: u32,
    ) -> AppResult<SubmitTestResponse> {
        let mut state = self.state();
        if let Some(message) = state.reject_submit.clone() {
            return Err(bad_response("submit-test", 400, &message));
        }
        state.submit_calls.push(attempt);
        state.call_log.push(format!("submit:{attempt}"));
        let submitted = Self::non_empty_answers(&state, attempt);

        let status = state
            .status
            .get_or_insert_with(SubmissionStatus::first_attempt);
        status.submission_count += 1;
        if status.submission_count >= status.max_attempts {
            status.all_attempts_done = true;
            status.can_submit_again = Some(false);
        } else {
            status.current_attempt += 1;
            status.can_submit_again = Some(true);
        }

        Ok(SubmitTestResponse {
            success: true,
            questions_submitted: submitted,
            feedback_generated: 0,
            can_retry: !status.all_attempts_done,
            message: None,
        })
    }

    async fn feedback_status(&self, _student_id: &str, _attempt: u32) -> AppResult<FeedbackStatus> {
        let mut state = self.state();
        state.feedback_status_calls += 1;
        if let Some(step) = state.feedback_steps.pop_front() {
            state.current_feedback = Some(step);
        }
        Ok(state
            .current_feedback
            .as_ref()
            .map(|(status, _)| status.clone())
            .unwrap_or(FeedbackStatus {
                feedback_ready: 0,
                total_questions: 0,
                progress_percentage: 0.0,
                all_complete: true,
            }))
    }

    async fn feedback(&self, _student_id: &str) -> AppResult<Vec<FeedbackItem>> {
        let state = self.state();
        Ok(state
            .current_feedback
            .as_ref()
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }
}

// ========== 测试数据 ==========

pub fn ctx() -> SessionCtx {
    SessionCtx::new(STUDENT, MODULE)
}

pub fn config() -> Config {
    let config = Config {
        debounce_ms: 1000,
        status_clear_ms: 3000,
        poll_interval_ms: 3000,
        max_polls: 40,
        ..Config::default()
    };
    logging::init(&config);
    config
}

pub const DEBOUNCE: Duration = Duration::from_millis(1000);

/// 两道选择题 + 三道文本题
pub fn questions() -> Vec<Question> {
    vec![
        Question::new("q1", QuestionKind::MultipleChoice, "Which organelle produces ATP?")
            .with_options([("A", "Nucleus"), ("B", "Mitochondria"), ("C", "Ribosome")]),
        Question::new("q2", QuestionKind::ShortText, "Name the green pigment in leaves."),
        Question::new("q3", QuestionKind::MultipleChoice, "What is the powerhouse of the cell?")
            .with_options([("A", "Golgi"), ("B", "Mitochondria")]),
        Question::new("q4", QuestionKind::LongText, "Explain photosynthesis.")
            .with_document("doc-7"),
        Question::new("q5", QuestionKind::ShortText, "What gas do plants release?"),
    ]
}

pub fn feedback_item(question_id: &str, attempt: u32, is_correct: bool) -> FeedbackItem {
    FeedbackItem {
        answer_id: None,
        question_id: question_id.to_string(),
        attempt,
        is_correct,
        score: if is_correct { 100.0 } else { 0.0 },
        explanation: "See chapter 3.".to_string(),
        strengths: vec![],
        weaknesses: vec![],
        improvement_hint: String::new(),
    }
}

pub fn feedback_status(ready: u32, total: u32) -> FeedbackStatus {
    FeedbackStatus {
        feedback_ready: ready,
        total_questions: total,
        progress_percentage: if total == 0 {
            0.0
        } else {
            ready as f64 * 100.0 / total as f64
        },
        all_complete: total > 0 && ready == total,
    }
}

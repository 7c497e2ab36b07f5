//! 提交流程 - 流程层
//!
//! 流程顺序：
//! 1. 检查未作答的题目；如有，需要学生确认"仍然提交"
//! 2. 等待进行中的保存落地，并立即保存所有尚未触发的草稿
//! 3. 调用一次 submit-test，关闭该次作答（答案此前已逐题保存）
//! 4. 成功后重新读取作答状态，并决定下一步：等待反馈 / 完成问卷
//!
//! 提交失败时原样展示后端错误，作答保持打开，本地作答次数不前进。

use tracing::{error, info, warn};

use crate::clients::Backend;
use crate::error::{AppError, AppResult};
use crate::models::{Question, SessionCtx, SubmitTestResponse};
use crate::services::{AttemptManager, AttemptPhase, DraftStore, PersistenceScheduler};

/// 未作答的题目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnansweredQuestion {
    /// 题目序号（从 1 开始）
    pub display_index: usize,
    pub question_id: String,
}

/// 提交前检查的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitCheck {
    /// 所有题目都已作答
    Ready { attempt: u32 },
    /// 有题目未作答，需要确认
    NeedsConfirmation {
        attempt: u32,
        unanswered: Vec<UnansweredQuestion>,
    },
}

/// 提交成功后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// 还有剩余作答机会：轮询该次作答的反馈
    AwaitFeedback { attempt: u32 },
    /// 最后一次作答：进入问卷
    SurveyCompletion,
}

/// 提交成功的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub attempt: u32,
    pub response: SubmitTestResponse,
    pub next: NextStep,
}

/// 一次提交请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAttempt {
    /// 停在确认环节，尚未调用后端
    NeedsConfirmation(Vec<UnansweredQuestion>),
    Submitted(SubmissionOutcome),
}

/// 提交编排器
pub struct SubmissionOrchestrator {
    ctx: SessionCtx,
}

impl SubmissionOrchestrator {
    pub fn new(ctx: SessionCtx) -> Self {
        Self { ctx }
    }

    /// 按题目顺序列出没有非空草稿的题目
    pub fn unanswered(questions: &[Question], store: &DraftStore) -> Vec<UnansweredQuestion> {
        questions
            .iter()
            .enumerate()
            .filter(|(_, q)| store.get(&q.id).is_none())
            .map(|(index, q)| UnansweredQuestion {
                display_index: index + 1,
                question_id: q.id.clone(),
            })
            .collect()
    }

    /// 提交前检查（不调用后端）
    pub fn check(
        &self,
        questions: &[Question],
        store: &DraftStore,
        attempts: &AttemptManager,
        attempt: u32,
    ) -> AppResult<SubmitCheck> {
        attempts.ensure_can_submit(attempt)?;

        if store.attempt() != attempt {
            return Err(AppError::AttemptMismatch {
                current: store.attempt(),
                requested: attempt,
            });
        }

        if store.answered_count() == 0 {
            return Err(AppError::NoAnswers);
        }

        let unanswered = Self::unanswered(questions, store);
        if unanswered.is_empty() {
            Ok(SubmitCheck::Ready { attempt })
        } else {
            Ok(SubmitCheck::NeedsConfirmation {
                attempt,
                unanswered,
            })
        }
    }

    /// 提交第 `attempt` 次作答
    ///
    /// `confirm_partial` 为 false 且存在未作答题目时，停在确认环节。
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        backend: &dyn Backend,
        questions: &[Question],
        store: &DraftStore,
        scheduler: &PersistenceScheduler,
        attempts: &mut AttemptManager,
        attempt: u32,
        confirm_partial: bool,
    ) -> AppResult<SubmitAttempt> {
        if let SubmitCheck::NeedsConfirmation { unanswered, .. } =
            self.check(questions, store, attempts, attempt)?
        {
            if !confirm_partial {
                info!(
                    "{} 有 {} 道题未作答，等待确认",
                    self.ctx,
                    unanswered.len()
                );
                return Ok(SubmitAttempt::NeedsConfirmation(unanswered));
            }
            warn!(
                "{} 学生确认在 {} 道题未作答的情况下提交",
                self.ctx,
                unanswered.len()
            );
        }

        // 最后几次按键可能还在防抖窗口里，或已触发但尚未落地；关闭作答前全部等到
        let failures = scheduler.flush().await;
        if let Some((question_id, err)) = failures.into_iter().next() {
            error!(
                "{} 提交前保存题目 {} 失败，暂不提交: {}",
                self.ctx, question_id, err
            );
            return Err(err);
        }

        info!("{} 📤 正在提交第 {} 次作答...", self.ctx, attempt);

        let response = backend
            .submit_test(&self.ctx.student_id, &self.ctx.module_id, attempt)
            .await
            .map_err(|e| match e {
                AppError::Api(api) => AppError::submission_rejected(api),
                other => other,
            })?;

        if !response.success {
            let message = response
                .message
                .clone()
                .unwrap_or_else(|| "服务端拒绝了本次提交".to_string());
            error!("{} ❌ 提交被拒绝: {}", self.ctx, message);
            return Err(AppError::SubmissionRejected { message });
        }

        info!(
            "{} ✓ 第 {} 次作答提交成功: {} 道题",
            self.ctx, attempt, response.questions_submitted
        );

        // 边界之后不允许再修改已关闭作答的草稿
        scheduler.cancel_pending();
        attempts.mark_submitted(attempt);
        let transition = attempts.refresh(backend).await;
        match transition.entered_attempt() {
            Some(next_attempt) => store.reset(next_attempt),
            // 终态：草稿清空，但不编造新的作答次数
            None => store.reset(store.attempt()),
        }

        let has_more = transition.current != AttemptPhase::AllDone
            && attempts
                .status()
                .is_some_and(|s| s.has_attempt_after(attempt));

        let next = if has_more {
            NextStep::AwaitFeedback { attempt }
        } else {
            NextStep::SurveyCompletion
        };

        Ok(SubmitAttempt::Submitted(SubmissionOutcome {
            attempt,
            response,
            next,
        }))
    }
}

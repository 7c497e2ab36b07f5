//! 测试会话 - 编排层
//!
//! ## 职责
//!
//! 一个学生 × 一个模块的测试作答会话，是界面唯一需要持有的对象。
//!
//! ## 核心功能
//!
//! 1. **打开**：镜像服务端作答状态，从后端恢复当前作答的草稿
//! 2. **编辑**：写入草稿并安排保存（选择题立即，文本题防抖）
//! 3. **预填**：从历史作答复制答案
//! 4. **提交**：确认 → 保存剩余草稿 → 关闭作答 → 轮询反馈
//! 5. **关闭**：取消尚未触发的保存，停止轮询

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::clients::Backend;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    DraftAnswer, Origin, Question, QuestionFeedback, SessionCtx, SubmissionStatus,
};
use crate::services::{
    AttemptManager, AttemptPhase, DraftChange, DraftSnapshot, DraftStore, FeedbackBoard,
    FeedbackSnapshot, PersistenceScheduler, SaveStatus,
};
use crate::utils::logging;
use crate::workflow::{
    FeedbackPoller, NextStep, PollHandle, PollOutcome, PrefillReconciler, PrefillReport,
    SubmissionOrchestrator, SubmitAttempt, SubmitCheck, UnansweredQuestion,
};

/// 测试会话
pub struct TestSession {
    config: Config,
    ctx: SessionCtx,
    backend: Arc<dyn Backend>,
    questions: Vec<Question>,
    store: Arc<DraftStore>,
    scheduler: PersistenceScheduler,
    attempts: AttemptManager,
    prefill: PrefillReconciler,
    submission: SubmissionOrchestrator,
    board: Arc<FeedbackBoard>,
    poller: Option<PollHandle>,
}

impl TestSession {
    /// 打开会话
    ///
    /// 后端不可达时默认第一次作答；没有已保存的答案是正常的空状态。
    pub async fn open(
        config: Config,
        backend: Arc<dyn Backend>,
        ctx: SessionCtx,
        questions: Vec<Question>,
    ) -> Self {
        let mut attempts = AttemptManager::new(ctx.clone());
        attempts.refresh(backend.as_ref()).await;

        let attempt = match (attempts.phase(), attempts.status()) {
            (AttemptPhase::Editable(n), _) => n,
            (_, Some(status)) => status.current_attempt.max(1),
            _ => 1,
        };

        let store = Arc::new(DraftStore::new(attempt));
        let scheduler = PersistenceScheduler::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            ctx.clone(),
            &questions,
            config.debounce(),
            config.status_clear(),
        );

        let mut session = Self {
            prefill: PrefillReconciler::new(ctx.clone(), questions.clone()),
            submission: SubmissionOrchestrator::new(ctx.clone()),
            board: Arc::new(FeedbackBoard::new()),
            poller: None,
            config,
            ctx,
            backend,
            questions,
            store,
            scheduler,
            attempts,
        };

        let restored = match session.attempts.phase() {
            AttemptPhase::Editable(n) => session.hydrate(n).await,
            _ => 0,
        };

        logging::log_session_open(
            &session.ctx,
            session.attempts.phase(),
            session.questions.len(),
            restored,
        );

        // 上一次作答刚关闭，反馈可能仍在生成
        if let AttemptPhase::Editable(n) = session.attempts.phase() {
            if n > 1 {
                session.watch_feedback(n - 1);
            }
        }

        session
    }

    async fn hydrate(&self, attempt: u32) -> usize {
        match self
            .backend
            .my_answers(&self.ctx.student_id, &self.ctx.module_id, attempt)
            .await
        {
            Ok(answers) => self.store.hydrate(
                attempt,
                answers
                    .into_iter()
                    .filter(|a| a.attempt == attempt)
                    .map(|a| (a.question_id, a.value)),
            ),
            Err(e) => {
                warn!("{} ⚠️ 恢复第 {} 次作答的草稿失败: {}", self.ctx, attempt, e);
                0
            }
        }
    }

    // ========== 状态 ==========

    pub fn ctx(&self) -> &SessionCtx {
        &self.ctx
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn phase(&self) -> AttemptPhase {
        self.attempts.phase()
    }

    pub fn current_attempt(&self) -> Option<u32> {
        self.attempts.current_attempt()
    }

    pub fn submission_status(&self) -> Option<&SubmissionStatus> {
        self.attempts.status()
    }

    // ========== 草稿 ==========

    fn ensure_editable(&self) -> AppResult<u32> {
        match self.attempts.phase() {
            AttemptPhase::Editable(n) => Ok(n),
            AttemptPhase::AllDone => Err(AppError::AllAttemptsDone),
            AttemptPhase::Submitted(n) => Err(AppError::AttemptClosed { attempt: n }),
            AttemptPhase::Unstarted => Err(AppError::AttemptClosed { attempt: 0 }),
        }
    }

    fn ensure_question(&self, question_id: &str) -> AppResult<()> {
        if self.questions.iter().any(|q| q.id == question_id) {
            Ok(())
        } else {
            Err(AppError::UnknownQuestion {
                question_id: question_id.to_string(),
            })
        }
    }

    /// 写入答案；值有变化时安排保存
    pub fn set_answer(&self, question_id: &str, value: &str) -> AppResult<DraftChange> {
        self.ensure_editable()?;
        self.ensure_question(question_id)?;

        let change = self.store.set(question_id, value);
        if change.needs_save() {
            self.scheduler.schedule(question_id)?;
        }
        Ok(change)
    }

    /// 清空答案（会发送删除信号）
    pub fn clear_answer(&self, question_id: &str) -> AppResult<DraftChange> {
        self.ensure_editable()?;
        self.ensure_question(question_id)?;

        let change = self.store.clear(question_id);
        if change.needs_save() {
            self.scheduler.schedule(question_id)?;
        }
        Ok(change)
    }

    pub fn answer(&self, question_id: &str) -> Option<DraftAnswer> {
        self.store.get(question_id)
    }

    /// 是否仍显示"复制自第 n 次作答"标记
    pub fn prefilled_from(&self, question_id: &str) -> Option<u32> {
        match self.store.get(question_id)?.origin {
            Origin::Prefilled { from_attempt } => Some(from_attempt),
            Origin::Typed => None,
        }
    }

    pub fn drafts(&self) -> DraftSnapshot {
        self.store.snapshot()
    }

    pub fn answered_count(&self) -> usize {
        self.store.answered_count()
    }

    pub fn unanswered(&self) -> Vec<UnansweredQuestion> {
        SubmissionOrchestrator::unanswered(&self.questions, &self.store)
    }

    /// 手动保存（"保存进度"）
    pub async fn save_now(&self, question_id: &str) -> AppResult<()> {
        self.ensure_editable()?;
        self.scheduler.save_now(question_id).await
    }

    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.scheduler.status()
    }

    pub fn pending_saves(&self) -> usize {
        self.scheduler.pending_count()
    }

    // ========== 预填 ==========

    /// 加载可预填的历史作答，返回来源数量
    pub async fn load_prefill_sources(&mut self) -> usize {
        let completed = self.attempts.completed_attempts();
        self.prefill
            .load_sources(self.backend.as_ref(), &completed)
            .await
    }

    pub fn prefill(&self) -> &PrefillReconciler {
        &self.prefill
    }

    pub fn prefill_mut(&mut self) -> &mut PrefillReconciler {
        &mut self.prefill
    }

    pub async fn prefill_all(&self, from_attempt: u32) -> AppResult<PrefillReport> {
        self.ensure_editable()?;
        self.prefill
            .prefill_all(from_attempt, &self.store, &self.scheduler)
            .await
    }

    pub async fn prefill_selected(&mut self) -> AppResult<PrefillReport> {
        self.ensure_editable()?;
        self.prefill
            .prefill_selected(&self.store, &self.scheduler)
            .await
    }

    // ========== 提交 ==========

    pub fn check_submission(&self) -> AppResult<SubmitCheck> {
        let attempt = self.ensure_editable()?;
        self.submission
            .check(&self.questions, &self.store, &self.attempts, attempt)
    }

    /// 提交当前作答
    ///
    /// 成功且还有剩余作答机会时自动开始轮询反馈。
    pub async fn submit(&mut self, confirm_partial: bool) -> AppResult<SubmitAttempt> {
        let attempt = self.ensure_editable()?;
        // 提交成功后草稿会被清空，先记下哪些题有答案
        let answered: HashSet<String> = self.store.snapshot().entries.into_keys().collect();
        let result = self
            .submission
            .submit(
                self.backend.as_ref(),
                &self.questions,
                &self.store,
                &self.scheduler,
                &mut self.attempts,
                attempt,
                confirm_partial,
            )
            .await?;

        if let SubmitAttempt::Submitted(outcome) = &result {
            match outcome.next {
                NextStep::AwaitFeedback { attempt } => self.start_polling(attempt, answered),
                NextStep::SurveyCompletion => {
                    info!("{} 🎉 所有作答已完成，进入问卷", self.ctx)
                }
            }
        }

        Ok(result)
    }

    // ========== 反馈 ==========

    /// 开始（或重新开始）轮询某次已关闭作答的反馈
    pub fn watch_feedback(&mut self, attempt: u32) {
        self.start_polling(attempt, HashSet::new());
    }

    fn start_polling(&mut self, attempt: u32, known: HashSet<String>) {
        self.stop_feedback();
        let poller = FeedbackPoller::new(
            Arc::clone(&self.backend),
            self.ctx.clone(),
            Arc::clone(&self.board),
            self.config.poll_interval(),
            self.config.max_polls,
        );
        self.poller = Some(poller.spawn(attempt, known));
    }

    /// 超时后手动刷新
    pub fn refresh_feedback(&mut self) -> bool {
        let attempt = self
            .poller
            .as_ref()
            .map(PollHandle::attempt)
            .or(self.board.snapshot().attempt);
        match attempt {
            Some(attempt) => {
                self.watch_feedback(attempt);
                true
            }
            None => false,
        }
    }

    /// 等待当前轮询结束
    pub async fn wait_feedback(&mut self) -> Option<PollOutcome> {
        self.poller.take()?.join().await
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    pub fn feedback(&self) -> watch::Receiver<FeedbackSnapshot> {
        self.board.subscribe()
    }

    pub fn feedback_state(&self, question_id: &str) -> QuestionFeedback {
        self.board.snapshot().state_for(question_id)
    }

    fn stop_feedback(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    // ========== 生命周期 ==========

    /// 离开页面：不再安排新的保存，已触发的保存继续完成；停止轮询
    pub fn close(&mut self) {
        self.scheduler.shutdown();
        self.stop_feedback();
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        self.close();
    }
}

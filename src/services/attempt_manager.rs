//! 作答次数管理 - 业务能力层
//!
//! ```text
//! Unstarted → Editable(n) → Submitted(n) → Editable(n+1) → … → AllDone
//! ```
//!
//! 状态不在客户端计算，只镜像服务端的 `SubmissionStatus`；客户端从不自行编造作答次数。

use tracing::{info, warn};

use crate::clients::Backend;
use crate::error::{AppError, AppResult};
use crate::models::{SessionCtx, SubmissionStatus};

/// 作答阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Unstarted,
    /// 第 n 次作答，可编辑、可提交
    Editable(u32),
    /// 第 n 次作答已提交，等待服务端确认下一次作答
    Submitted(u32),
    /// 所有作答次数已用完（终态）
    AllDone,
}

/// 一次状态刷新前后的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTransition {
    pub previous: AttemptPhase,
    pub current: AttemptPhase,
}

impl AttemptTransition {
    /// 进入了一个新的可编辑作答（草稿必须清空）
    pub fn entered_attempt(&self) -> Option<u32> {
        match (self.previous, self.current) {
            (AttemptPhase::Editable(before), AttemptPhase::Editable(after)) if before == after => None,
            (_, AttemptPhase::Editable(after)) => Some(after),
            _ => None,
        }
    }
}

/// 作答次数管理器
#[derive(Debug)]
pub struct AttemptManager {
    ctx: SessionCtx,
    phase: AttemptPhase,
    status: Option<SubmissionStatus>,
    /// 当前状态中的作答上限是否来自服务端
    confirmed: bool,
}

impl AttemptManager {
    pub fn new(ctx: SessionCtx) -> Self {
        Self {
            ctx,
            phase: AttemptPhase::Unstarted,
            status: None,
            confirmed: false,
        }
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn status(&self) -> Option<&SubmissionStatus> {
        self.status.as_ref()
    }

    /// 当前可编辑的作答次数
    pub fn current_attempt(&self) -> Option<u32> {
        match self.phase {
            AttemptPhase::Editable(n) => Some(n),
            _ => None,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.status.as_ref().map_or(1, |s| s.max_attempts)
    }

    /// 已完成（已提交）的作答次数，升序
    pub fn completed_attempts(&self) -> Vec<u32> {
        match &self.status {
            Some(status) => (1..status.current_attempt.max(status.submission_count + 1)).collect(),
            None => Vec::new(),
        }
    }

    /// 从服务端重新读取状态
    ///
    /// 服务端不可达时：首次加载默认第一次作答（可恢复），绝不默认锁定。
    pub async fn refresh(&mut self, backend: &dyn Backend) -> AttemptTransition {
        match backend
            .submission_status(&self.ctx.student_id, &self.ctx.module_id)
            .await
        {
            Ok(status) => self.apply_status(status),
            Err(e) => {
                warn!("{} ⚠️ 获取提交状态失败: {}", self.ctx, e);
                let fallback = self.fallback_status();
                self.mirror(fallback)
            }
        }
    }

    fn fallback_status(&self) -> SubmissionStatus {
        match (&self.status, self.phase) {
            // 刚提交成功但状态读取失败：服务端已经关闭了第 n 次作答
            (Some(last), AttemptPhase::Submitted(n)) if self.confirmed => SubmissionStatus {
                current_attempt: n + 1,
                max_attempts: last.max_attempts,
                submission_count: last.submission_count.max(n),
                all_attempts_done: n >= last.max_attempts,
                can_submit_again: Some(n < last.max_attempts),
            },
            // 上限从未得到服务端确认：不能据此锁定学生
            (Some(last), AttemptPhase::Submitted(n)) => SubmissionStatus {
                current_attempt: n + 1,
                max_attempts: last.max_attempts.max(n + 1),
                submission_count: last.submission_count.max(n),
                all_attempts_done: false,
                can_submit_again: Some(true),
            },
            (Some(last), _) => last.clone(),
            (None, _) => SubmissionStatus::first_attempt(),
        }
    }

    /// 镜像服务端状态
    pub fn apply_status(&mut self, status: SubmissionStatus) -> AttemptTransition {
        self.confirmed = true;
        self.mirror(status)
    }

    fn mirror(&mut self, status: SubmissionStatus) -> AttemptTransition {
        let previous = self.phase;
        let current = if status.all_attempts_done {
            AttemptPhase::AllDone
        } else {
            AttemptPhase::Editable(status.current_attempt.max(1))
        };

        if previous != current {
            info!(
                "{} 作答状态: {:?} → {:?} (已提交 {}/{})",
                self.ctx, previous, current, status.submission_count, status.max_attempts
            );
        }

        self.phase = current;
        self.status = Some(status);
        AttemptTransition { previous, current }
    }

    /// 提交成功后调用；在重新读取状态之前不允许再次提交
    pub fn mark_submitted(&mut self, attempt: u32) {
        self.phase = AttemptPhase::Submitted(attempt);
    }

    /// 提交前置条件：不能是终态，且请求的作答次数必须是当前可编辑的那一次
    pub fn ensure_can_submit(&self, attempt: u32) -> AppResult<()> {
        match self.phase {
            AttemptPhase::AllDone => Err(AppError::AllAttemptsDone),
            AttemptPhase::Editable(current) if current == attempt => Ok(()),
            AttemptPhase::Editable(current) => Err(AppError::AttemptMismatch {
                current,
                requested: attempt,
            }),
            AttemptPhase::Submitted(n) => Err(AppError::AttemptClosed { attempt: n }),
            AttemptPhase::Unstarted => Err(AppError::AttemptMismatch {
                current: 0,
                requested: attempt,
            }),
        }
    }
}

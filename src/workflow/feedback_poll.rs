//! 反馈轮询 - 流程层
//!
//! 提交关闭某次作答后，按固定间隔查询反馈生成进度；每次查询同时重新拉取反馈内容，
//! 让界面随到随显示。全部完成或达到轮询上限时停止。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::Backend;
use crate::error::{AppError, AppResult};
use crate::models::SessionCtx;
use crate::services::{FeedbackBoard, PollPhase};

/// 轮询结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Complete { polls: u32 },
    TimedOut { polls: u32, ready: u32, total: u32 },
    /// 离开页面
    Stopped { polls: u32 },
}

impl PollOutcome {
    pub fn into_result(self, attempt: u32) -> AppResult<u32> {
        match self {
            PollOutcome::Complete { polls } | PollOutcome::Stopped { polls } => Ok(polls),
            PollOutcome::TimedOut { polls, ready, total } => Err(AppError::PollingTimeout {
                attempt,
                polls,
                ready,
                total,
            }),
        }
    }
}

/// 反馈轮询器
#[derive(Clone)]
pub struct FeedbackPoller {
    backend: Arc<dyn Backend>,
    ctx: SessionCtx,
    board: Arc<FeedbackBoard>,
    interval: Duration,
    max_polls: u32,
}

impl FeedbackPoller {
    pub fn new(
        backend: Arc<dyn Backend>,
        ctx: SessionCtx,
        board: Arc<FeedbackBoard>,
        interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            backend,
            ctx,
            board,
            interval,
            max_polls: max_polls.max(1),
        }
    }

    /// 在后台开始轮询
    ///
    /// `known` 为调用方已知有答案的题目（例如刚提交时的非空草稿），可以为空。
    pub fn spawn(self, attempt: u32, known: HashSet<String>) -> PollHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(attempt, known, shutdown_rx).await });
        PollHandle {
            attempt,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// 轮询直到完成、超时或收到停止信号
    ///
    /// 停止信号到达时正在进行的那一轮仍会把结果写入看板，然后退出。
    /// 已提交答案的集合读取失败时，之后每一轮都会重新读取，直到成功为止。
    pub async fn run(
        &self,
        attempt: u32,
        known: HashSet<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PollOutcome {
        let fetched = self.submitted_questions(attempt).await;
        let mut submitted_loaded = fetched.is_some();
        let mut submitted = known;
        submitted.extend(fetched.unwrap_or_default());
        info!(
            "{} 🔄 开始轮询第 {} 次作答的反馈 ({} 道已作答)",
            self.ctx,
            attempt,
            submitted.len()
        );
        self.board.begin(attempt, submitted);

        let mut last_seen_ready: Option<u32> = None;
        let mut last = (0, 0);

        for poll in 1..=self.max_polls {
            if !submitted_loaded && poll > 1 {
                if let Some(fetched) = self.submitted_questions(attempt).await {
                    self.board.add_submitted(fetched);
                    submitted_loaded = true;
                }
            }

            match self.poll_once(attempt).await {
                Ok((ready, total, all_complete)) => {
                    last = (ready, total);
                    if last_seen_ready != Some(ready) {
                        info!(
                            "{} 反馈进度: {}/{} (第 {} 次轮询)",
                            self.ctx, ready, total, poll
                        );
                        last_seen_ready = Some(ready);
                    }
                    if all_complete {
                        info!("{} ✓ 第 {} 次作答的反馈已全部生成", self.ctx, attempt);
                        self.board.set_phase(PollPhase::Complete);
                        return PollOutcome::Complete { polls: poll };
                    }
                }
                Err(e) => {
                    warn!("{} ⚠️ 第 {} 次轮询失败: {}", self.ctx, poll, e);
                }
            }

            if *shutdown.borrow() {
                return self.stopped(poll);
            }
            if poll == self.max_polls {
                break;
            }

            tokio::select! {
                _ = sleep(self.interval) => {}
                // 发送端被丢弃同样视为停止
                _ = shutdown.changed() => return self.stopped(poll),
            }
        }

        warn!(
            "{} ⏳ 反馈生成耗时较长: 已轮询 {} 次, 完成 {}/{}",
            self.ctx, self.max_polls, last.0, last.1
        );
        self.board.set_phase(PollPhase::TimedOut);
        PollOutcome::TimedOut {
            polls: self.max_polls,
            ready: last.0,
            total: last.1,
        }
    }

    /// 一轮查询：进度 + 反馈内容
    async fn poll_once(&self, attempt: u32) -> AppResult<(u32, u32, bool)> {
        let status = self
            .backend
            .feedback_status(&self.ctx.student_id, attempt)
            .await?;
        let items = self.backend.feedback(&self.ctx.student_id).await?;
        let added = self.board.merge(&status, items);
        if added > 0 {
            debug!("{} 新到达 {} 条反馈", self.ctx, added);
        }
        Ok((
            status.feedback_ready,
            status.total_questions,
            status.all_complete,
        ))
    }

    /// 本次作答中有已提交答案的题目（用于区分"未作答"与"生成中"）
    ///
    /// 读取失败返回 `None`：不知道不等于没有作答。
    async fn submitted_questions(&self, attempt: u32) -> Option<HashSet<String>> {
        match self
            .backend
            .my_answers(&self.ctx.student_id, &self.ctx.module_id, attempt)
            .await
        {
            Ok(answers) => Some(
                answers
                    .into_iter()
                    .filter(|a| a.has_value())
                    .map(|a| a.question_id)
                    .collect(),
            ),
            Err(e) => {
                warn!(
                    "{} ⚠️ 读取第 {} 次作答的答案失败，下一轮重试: {}",
                    self.ctx, attempt, e
                );
                None
            }
        }
    }

    fn stopped(&self, polls: u32) -> PollOutcome {
        debug!("{} 轮询已停止", self.ctx);
        self.board.set_phase(PollPhase::Stopped);
        PollOutcome::Stopped { polls }
    }
}

/// 后台轮询任务的句柄；丢弃句柄即停止轮询
pub struct PollHandle {
    attempt: u32,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待轮询结束
    pub async fn join(self) -> Option<PollOutcome> {
        let PollHandle { shutdown, task, .. } = self;
        let outcome = task.await.ok();
        drop(shutdown);
        outcome
    }
}

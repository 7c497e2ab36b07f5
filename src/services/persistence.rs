//! 持久化调度 - 业务能力层
//!
//! 把按键级别的频繁修改合并成少量后端写入，同时保证最终写入的一定是*最新*的值。
//!
//! - 选择题：立即保存（一次离散事件）
//! - 文本题：从该题最后一次修改开始计时，防抖窗口结束后保存
//! - 定时器只捕获 `question_id` 和作答次数；值在触发时从 [`DraftStore`] 读取，
//!   所以"输入 → 清空 → 定时器触发"最终保存的是空值（删除信号）
//! - 失败不自动重试：下一次编辑或最终提交会用最新状态覆盖

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::{Backend, SaveAnswerRequest};
use crate::error::{AppError, AppResult};
use crate::models::answer::answer_payload;
use crate::models::{is_blank, Question, QuestionKind, SessionCtx};
use crate::services::draft_store::DraftStore;

/// 保存状态（供界面显示"保存中 / 已保存 / 保存失败"）
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    Idle,
    Saving { question_id: String },
    Saved { question_id: String, at: DateTime<Local> },
    Error { question_id: String, message: String },
}

#[derive(Debug, Clone)]
struct QuestionMeta {
    kind: QuestionKind,
    document_id: Option<String>,
}

struct PendingSave {
    generation: u64,
    attempt: u32,
    handle: JoinHandle<AppResult<()>>,
}

/// 定时器已触发、请求仍在路上的保存
struct InFlightSave {
    question_id: String,
    handle: JoinHandle<AppResult<()>>,
}

struct SchedulerInner {
    backend: Arc<dyn Backend>,
    store: Arc<DraftStore>,
    ctx: SessionCtx,
    questions: HashMap<String, QuestionMeta>,
    debounce: Duration,
    status_clear: Duration,
    pending: Mutex<HashMap<String, PendingSave>>,
    /// generation → 已触发的保存
    in_flight: Mutex<HashMap<u64, InFlightSave>>,
    generation: AtomicU64,
    closed: AtomicBool,
    status: Arc<watch::Sender<SaveStatus>>,
}

/// 持久化调度器
///
/// 必须在 tokio 运行时内使用（定时器是 spawn 出来的任务）。
#[derive(Clone)]
pub struct PersistenceScheduler {
    inner: Arc<SchedulerInner>,
}

impl PersistenceScheduler {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<DraftStore>,
        ctx: SessionCtx,
        questions: &[Question],
        debounce: Duration,
        status_clear: Duration,
    ) -> Self {
        let questions = questions
            .iter()
            .map(|q| {
                (
                    q.id.clone(),
                    QuestionMeta {
                        kind: q.kind,
                        document_id: q.document_id.clone(),
                    },
                )
            })
            .collect();
        let (status, _) = watch::channel(SaveStatus::Idle);

        Self {
            inner: Arc::new(SchedulerInner {
                backend,
                store,
                ctx,
                questions,
                debounce,
                status_clear,
                pending: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                status: Arc::new(status),
            }),
        }
    }

    /// 订阅保存状态
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// 尚未触发的保存数量
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// 为某道题安排一次保存，取代该题之前尚未触发的定时器
    pub fn schedule(&self, question_id: &str) -> AppResult<()> {
        let meta = self.inner.meta(question_id)?;

        if self.inner.closed.load(Ordering::SeqCst) {
            debug!("{} 调度器已关闭，忽略题目 {} 的保存", self.inner.ctx, question_id);
            return Ok(());
        }

        let delay = if meta.kind.saves_immediately() {
            Duration::ZERO
        } else {
            self.inner.debounce
        };
        let attempt = self.inner.store.attempt();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // 持锁期间 spawn 并登记，保证定时器触发时能在表里找到自己
        let mut pending = self.inner.pending();
        if let Some(previous) = pending.remove(question_id) {
            previous.handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        let qid = question_id.to_string();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if !inner.detach(&qid, generation) {
                return Ok(());
            }
            // 已触发的保存脱离了待定表，之后的取消不会中断它
            let result = inner.fire(&qid, attempt).await;
            inner.in_flight().remove(&generation);
            result
        });

        pending.insert(
            question_id.to_string(),
            PendingSave {
                generation,
                attempt,
                handle,
            },
        );

        debug!(
            "{} 题目 {} 已安排保存 (延迟 {:?})",
            self.inner.ctx, question_id, delay
        );
        Ok(())
    }

    /// 立即保存某道题的最新值（手动保存、预填复制）
    pub async fn save_now(&self, question_id: &str) -> AppResult<()> {
        self.inner.meta(question_id)?;
        if let Some(previous) = self.inner.pending().remove(question_id) {
            previous.handle.abort();
        }
        let attempt = self.inner.store.attempt();
        self.inner.fire(question_id, attempt).await
    }

    /// 等待所有已触发的保存落地，再立即触发所有尚未触发的保存并等待完成
    ///
    /// 返回失败的题目及原因；单题失败不影响其他题目。
    /// 同一道题较早的保存先落地，较新的值最后写入。
    pub async fn flush(&self) -> Vec<(String, AppError)> {
        let in_flight: Vec<InFlightSave> = self
            .inner
            .in_flight()
            .drain()
            .map(|(_, save)| save)
            .collect();

        let mut in_flight_failures = Vec::new();
        if !in_flight.is_empty() {
            debug!("{} 等待 {} 个进行中的保存", self.inner.ctx, in_flight.len());
            let results = join_all(in_flight.into_iter().map(|save| async move {
                (save.question_id, save.handle.await)
            }))
            .await;
            for (qid, joined) in results {
                if let Ok(Err(e)) = joined {
                    in_flight_failures.push((qid, e));
                }
            }
        }

        let drained: Vec<(String, u32)> = {
            let mut pending = self.inner.pending();
            pending
                .drain()
                .map(|(qid, p)| {
                    p.handle.abort();
                    (qid, p.attempt)
                })
                .collect()
        };

        if !drained.is_empty() {
            debug!("{} 立即保存 {} 道待定题目", self.inner.ctx, drained.len());
        }

        let saves = drained.iter().map(|(qid, attempt)| {
            let inner = Arc::clone(&self.inner);
            async move { (qid.clone(), inner.fire(qid, *attempt).await) }
        });
        let mut failures: Vec<(String, AppError)> = join_all(saves)
            .await
            .into_iter()
            .filter_map(|(qid, result)| result.err().map(|e| (qid, e)))
            .collect();

        // 较早的失败已被同一道题更新的保存覆盖
        failures.extend(
            in_flight_failures
                .into_iter()
                .filter(|(qid, _)| !drained.iter().any(|(d, _)| d == qid)),
        );
        failures
    }

    /// 取消所有尚未触发的定时器（作答边界）；已在进行中的保存不受影响
    pub fn cancel_pending(&self) -> usize {
        let mut pending = self.inner.pending();
        let count = pending.len();
        for (_, p) in pending.drain() {
            p.handle.abort();
        }
        count
    }

    /// 离开页面：不再接受新的调度，并取消尚未触发的定时器
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let cancelled = self.cancel_pending();
        if cancelled > 0 {
            info!("{} 已取消 {} 个待定保存", self.inner.ctx, cancelled);
        }
    }
}

impl SchedulerInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingSave>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta(&self, question_id: &str) -> AppResult<&QuestionMeta> {
        self.questions
            .get(question_id)
            .ok_or_else(|| AppError::UnknownQuestion {
                question_id: question_id.to_string(),
            })
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<u64, InFlightSave>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 定时器触发：仅当自己仍是该题最新的调度时才从待定表移入进行中表并继续
    fn detach(&self, question_id: &str, generation: u64) -> bool {
        let mut pending = self.pending();
        match pending.get(question_id) {
            Some(p) if p.generation == generation => {
                if let Some(p) = pending.remove(question_id) {
                    self.in_flight().insert(
                        generation,
                        InFlightSave {
                            question_id: question_id.to_string(),
                            handle: p.handle,
                        },
                    );
                }
                true
            }
            _ => false,
        }
    }

    /// 执行一次保存，值在此刻从草稿存储读取
    async fn fire(&self, question_id: &str, attempt: u32) -> AppResult<()> {
        let meta = self.meta(question_id)?;

        if self.store.attempt() != attempt {
            debug!(
                "{} 第 {} 次作答已结束，丢弃题目 {} 的过期保存",
                self.ctx, attempt, question_id
            );
            return Ok(());
        }

        let value = self.store.current_value(question_id);
        let request = SaveAnswerRequest {
            student_id: self.ctx.student_id.clone(),
            question_id: question_id.to_string(),
            module_id: self.ctx.module_id.clone(),
            document_id: meta.document_id.clone(),
            answer: answer_payload(meta.kind, &value),
            attempt,
        };

        self.status.send_replace(SaveStatus::Saving {
            question_id: question_id.to_string(),
        });

        match self.backend.save_answer(&request).await {
            Ok(()) => {
                if is_blank(&value) {
                    debug!("{} 题目 {} 已清空", self.ctx, question_id);
                } else {
                    debug!("{} 题目 {} 已自动保存", self.ctx, question_id);
                }
                self.status.send_replace(SaveStatus::Saved {
                    question_id: question_id.to_string(),
                    at: Local::now(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("{} ⚠️ 题目 {} 自动保存失败: {}", self.ctx, question_id, e);
                self.status.send_replace(SaveStatus::Error {
                    question_id: question_id.to_string(),
                    message: e.to_string(),
                });
                self.clear_error_later(question_id.to_string());
                Err(AppError::save_failed(question_id, e))
            }
        }
    }

    /// 失败提示在几秒后自动消失（若期间没有新的状态）
    fn clear_error_later(&self, question_id: String) {
        let status = Arc::clone(&self.status);
        let delay = self.status_clear;
        tokio::spawn(async move {
            sleep(delay).await;
            status.send_if_modified(|current| match current {
                SaveStatus::Error { question_id: q, .. } if *q == question_id => {
                    *current = SaveStatus::Idle;
                    true
                }
                _ => false,
            });
        });
    }
}

//! 反馈看板 - 业务能力层
//!
//! 复习界面订阅的反馈存储。每次轮询合并新到达的反馈并广播新的快照。

use std::collections::{HashMap, HashSet};

use tokio::sync::watch;

use crate::models::{FeedbackItem, FeedbackStatus, Question, QuestionFeedback};

/// 轮询阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    /// 所有反馈已生成
    Complete,
    /// 超过轮询上限，显示"耗时较长"，允许手动刷新
    TimedOut,
    /// 离开页面后停止
    Stopped,
}

/// 某次作答的反馈快照
#[derive(Debug, Clone, Default)]
pub struct FeedbackSnapshot {
    pub attempt: Option<u32>,
    /// 本次作答中有已提交答案的题目
    pub submitted: HashSet<String>,
    pub items: HashMap<String, FeedbackItem>,
    pub ready_count: u32,
    pub total_count: u32,
    pub progress_percentage: f64,
    pub phase: PollPhase,
    pub polls: u32,
}

impl FeedbackSnapshot {
    /// 单题状态：只有已提交答案的题目才可能处于"生成中"
    pub fn state_for(&self, question_id: &str) -> QuestionFeedback {
        if let Some(item) = self.items.get(question_id) {
            QuestionFeedback::Ready(item.clone())
        } else if self.submitted.contains(question_id) {
            QuestionFeedback::Generating
        } else {
            QuestionFeedback::Unanswered
        }
    }

    /// 按题目顺序给出全部状态
    pub fn states(&self, questions: &[Question]) -> Vec<(String, QuestionFeedback)> {
        questions
            .iter()
            .map(|q| (q.id.clone(), self.state_for(&q.id)))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == PollPhase::Complete
    }
}

/// 反馈看板
pub struct FeedbackBoard {
    tx: watch::Sender<FeedbackSnapshot>,
}

impl Default for FeedbackBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(FeedbackSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedbackSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> FeedbackSnapshot {
        self.tx.borrow().clone()
    }

    /// 开始跟踪某次作答；切换到其他作答时丢弃旧数据
    pub fn begin(&self, attempt: u32, submitted: HashSet<String>) {
        self.tx.send_modify(|snap| {
            if snap.attempt != Some(attempt) {
                *snap = FeedbackSnapshot {
                    attempt: Some(attempt),
                    ..FeedbackSnapshot::default()
                };
            }
            snap.submitted.extend(submitted);
            snap.phase = PollPhase::Polling;
            snap.polls = 0;
        });
    }

    /// 补充已提交答案的题目（之前读取失败时）
    pub fn add_submitted(&self, question_ids: HashSet<String>) {
        self.tx.send_if_modified(|snap| {
            let before = snap.submitted.len();
            snap.submitted.extend(question_ids);
            snap.submitted.len() != before
        });
    }

    /// 合并一次轮询的结果，返回新到达的反馈数量
    pub fn merge(&self, status: &FeedbackStatus, items: Vec<FeedbackItem>) -> usize {
        let mut added = 0;
        self.tx.send_modify(|snap| {
            let Some(attempt) = snap.attempt else {
                return;
            };
            snap.polls += 1;
            snap.ready_count = status.feedback_ready;
            snap.total_count = status.total_questions;
            snap.progress_percentage = status.progress_percentage;

            for item in items.into_iter().filter(|i| i.attempt == attempt) {
                // 有反馈必然有已提交答案
                snap.submitted.insert(item.question_id.clone());
                if snap.items.get(&item.question_id) != Some(&item) {
                    snap.items.insert(item.question_id.clone(), item);
                    added += 1;
                }
            }
        });
        added
    }

    pub fn set_phase(&self, phase: PollPhase) {
        self.tx.send_if_modified(|snap| {
            if snap.phase == phase {
                false
            } else {
                snap.phase = phase;
                true
            }
        });
    }
}

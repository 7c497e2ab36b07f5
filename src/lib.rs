//! # Attempt Sync
//!
//! 学生端测试作答与反馈同步引擎
//!
//! ## 架构设计
//!
//! 本库采用四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 后端接口抽象 `Backend` 及其 HTTP 实现
//!
//! ### ② 业务能力层（Services）
//! - `DraftStore` - 当前作答的草稿，唯一数据来源
//! - `PersistenceScheduler` - 选择题立即保存、文本题防抖保存
//! - `AttemptManager` - 镜像服务端的作答次数与阶段
//! - `FeedbackBoard` - 每道题的反馈状态
//!
//! ### ③ 流程层（Workflow）
//! - `PrefillReconciler` - 从历史作答预填
//! - `SubmissionOrchestrator` - 确认 → 保存 → 提交 → 推进作答
//! - `FeedbackPoller` - 反馈生成进度轮询
//!
//! ### ④ 编排层（Orchestration）
//! - `TestSession` - 一个学生 × 一个模块的会话
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{Backend, HttpBackend, SaveAnswerRequest};
pub use config::Config;
pub use error::{ApiError, AppError, AppResult, ConfigError};
pub use models::{
    DraftAnswer, FeedbackItem, Origin, Question, QuestionFeedback, QuestionKind, SessionCtx,
    SubmissionStatus,
};
pub use orchestrator::TestSession;
pub use services::{AttemptPhase, DraftChange, PollPhase, SaveStatus};
pub use workflow::{NextStep, PollOutcome, SubmitAttempt, SubmitCheck};

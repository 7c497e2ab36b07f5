//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 把业务能力层和流程层组装成一个测试会话，是界面唯一直接使用的入口。
//!
//! ## 层次关系
//!
//! ```text
//! session::TestSession (一个学生 × 一个模块)
//!     ↓
//! workflow (预填 / 提交 / 反馈轮询)
//!     ↓
//! services (草稿 / 保存调度 / 作答状态 / 反馈看板)
//!     ↓
//! clients (后端接口)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层同时持有后端、草稿存储和后台任务
//! 2. **向下依赖**：编排层 → workflow → services → clients
//! 3. **无业务逻辑**：只做阶段检查和调度，不做具体业务判断

pub mod session;

pub use session::TestSession;

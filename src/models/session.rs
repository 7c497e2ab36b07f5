//! 会话上下文
//!
//! 封装"哪位学生在做哪个模块的测试"这一信息

use std::fmt::Display;

/// 会话上下文
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionCtx {
    pub student_id: String,
    pub module_id: String,
}

impl SessionCtx {
    pub fn new(student_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            module_id: module_id.into(),
        }
    }
}

impl Display for SessionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[学生 {} 模块 {}]", self.student_id, self.module_id)
    }
}

/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::SessionCtx;
use crate::services::AttemptPhase;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；否则默认 `info`，开启 `verbose_logging` 时为 `debug`。
/// 重复调用是安全的（测试中每个用例都可能调用）。
pub fn init(config: &Config) {
    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录会话打开信息
///
/// # 参数
/// - `ctx`: 会话上下文
/// - `phase`: 当前作答阶段
/// - `question_count`: 题目总数
/// - `restored`: 从后端恢复的草稿数量
pub fn log_session_open(ctx: &SessionCtx, phase: AttemptPhase, question_count: usize, restored: usize) {
    info!("{}", "=".repeat(60));
    info!("{} 🚀 打开测试", ctx);
    info!("{} 📊 作答阶段: {:?}", ctx, phase);
    info!("{} 📋 题目总数: {}, 已恢复草稿: {}", ctx, question_count, restored);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志和预览显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_chars_not_bytes() {
        assert_eq!(truncate_text("光合作用的产物", 4), "光合作用...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}

use thiserror::Error;

/// 应用程序错误类型
///
/// 本子系统内没有任何错误会导致页面崩溃：每个变体都对应一个可展示、可关闭的状态。
#[derive(Debug, Error)]
pub enum AppError {
    /// 单次保存失败（不自动重试，不阻塞后续编辑）
    #[error("答案保存失败 (题目: {question_id}): {source}")]
    TransientSaveFailure {
        question_id: String,
        #[source]
        source: Box<AppError>,
    },

    /// 后端拒绝提交（保留作答，允许重试）
    #[error("提交被拒绝: {message}")]
    SubmissionRejected { message: String },

    /// 反馈生成超出轮询上限
    #[error("反馈生成超时 (第 {attempt} 次作答, 已轮询 {polls} 次, 完成 {ready}/{total})")]
    PollingTimeout {
        attempt: u32,
        polls: u32,
        ready: u32,
        total: u32,
    },

    /// 预填部分成功：已填入的答案保留，失败的题目需要学生手动确认
    #[error("预填部分失败: 成功 {saved} 题, 失败 {} 题", failed.len())]
    PartialPrefillFailure { saved: usize, failed: Vec<String> },

    /// 没有任何非空答案
    #[error("请至少回答一道题目后再提交")]
    NoAnswers,

    /// 该次作答已经关闭
    #[error("第 {attempt} 次作答已提交，不能再修改")]
    AttemptClosed { attempt: u32 },

    /// 请求的作答次数与当前可编辑的作答不一致
    #[error("作答次数不匹配: 当前为第 {current} 次, 请求第 {requested} 次")]
    AttemptMismatch { current: u32, requested: u32 },

    /// 所有作答次数已用完
    #[error("所有作答次数已用完")]
    AllAttemptsDone,

    /// 题目不属于当前测试
    #[error("未知题目: {question_id}")]
    UnknownQuestion { question_id: String },

    /// 没有可用于预填的历史作答
    #[error("第 {attempt} 次作答没有可预填的答案")]
    NoPrefillSource { attempt: u32 },

    /// 后端调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): status={status}, message={message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    /// JSON 解析失败
    #[error("JSON解析失败 ({endpoint}): {source}")]
    JsonParseFailed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// 后端返回的原始错误信息（如果有）
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ApiError::BadResponse { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    TomlParseFailed(#[from] toml::de::Error),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 包装一次保存失败
    pub fn save_failed(question_id: impl Into<String>, source: AppError) -> Self {
        AppError::TransientSaveFailure {
            question_id: question_id.into(),
            source: Box::new(source),
        }
    }

    /// 从 API 错误构造提交拒绝，尽量保留后端原文
    pub fn submission_rejected(err: ApiError) -> Self {
        let message = err
            .backend_message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        AppError::SubmissionRejected { message }
    }

    /// 是否是"保存失败"类错误
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientSaveFailure { .. } | AppError::Api(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_rejected_prefers_backend_message() {
        let err = ApiError::BadResponse {
            endpoint: "submit-test".to_string(),
            status: 400,
            message: Some("No answers found for this attempt".to_string()),
        };
        match AppError::submission_rejected(err) {
            AppError::SubmissionRejected { message } => {
                assert_eq!(message, "No answers found for this attempt")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn submission_rejected_falls_back_to_display() {
        let err = ApiError::BadResponse {
            endpoint: "submit-test".to_string(),
            status: 502,
            message: None,
        };
        let AppError::SubmissionRejected { message } = AppError::submission_rejected(err) else {
            panic!("expected SubmissionRejected");
        };
        assert!(message.contains("502"));
    }

    #[test]
    fn partial_prefill_reports_counts() {
        let err = AppError::PartialPrefillFailure {
            saved: 3,
            failed: vec!["q4".into(), "q5".into()],
        };
        assert_eq!(err.to_string(), "预填部分失败: 成功 3 题, 失败 2 题");
    }
}

use crate::error::{AppResult, ConfigError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 后端 API 地址
    pub api_base_url: String,
    /// 文本题自动保存的防抖窗口（毫秒）
    pub debounce_ms: u64,
    /// 保存失败提示自动消失的时间（毫秒）
    pub status_clear_ms: u64,
    /// 反馈进度轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 最大轮询次数，超过后显示"耗时较长"
    pub max_polls: u32,
    /// 单个请求的超时（秒）
    pub request_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/student".to_string(),
            debounce_ms: 1000,
            status_clear_ms: 3000,
            poll_interval_ms: 3000,
            max_polls: 40,
            request_timeout_secs: 30,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文本加载，缺省字段取默认值
    pub fn from_toml_str(text: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(text).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// 从 TOML 文件加载，再叠加环境变量
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_toml_str(&text)?.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(self.api_base_url),
            debounce_ms: env_parse("DEBOUNCE_MS").unwrap_or(self.debounce_ms),
            status_clear_ms: env_parse("STATUS_CLEAR_MS").unwrap_or(self.status_clear_ms),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(self.poll_interval_ms),
            max_polls: env_parse("MAX_POLLS").unwrap_or(self.max_polls),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(self.request_timeout_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn status_clear(&self) -> Duration {
        Duration::from_millis(self.status_clear_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

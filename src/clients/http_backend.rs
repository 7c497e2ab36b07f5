/// 后端 REST 客户端
///
/// 封装所有与学生作答 API 相关的调用逻辑
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::clients::backend::{Backend, SaveAnswerRequest};
use crate::config::Config;
use crate::error::{ApiError, AppResult};
use crate::models::{FeedbackItem, FeedbackStatus, SubmissionStatus, SubmitTestResponse, SubmittedAnswer};

/// 基于 reqwest 的后端实现
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| ApiError::RequestFailed {
                endpoint: "client".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// 发送请求并解析 JSON 响应
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AppResult<T> {
        let body = self.send(endpoint, request).await?;
        serde_json::from_str(&body).map_err(|source| {
            ApiError::JsonParseFailed {
                endpoint: endpoint.to_string(),
                source,
            }
            .into()
        })
    }

    /// 发送请求，非 2xx 时尽量提取后端的 detail / message
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> AppResult<String> {
        let response = request.send().await.map_err(|source| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            source,
        })?;

        debug!("{} -> {} ({} bytes)", endpoint, status, body.len());

        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: extract_error_message(&body),
            }
            .into());
        }

        Ok(body)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submission_status(&self, student_id: &str, module_id: &str) -> AppResult<SubmissionStatus> {
        let request = self
            .client
            .get(self.url("submission-status"))
            .query(&[("student_id", student_id), ("module_id", module_id)]);
        self.send_json("submission-status", request).await
    }

    async fn save_answer(&self, payload: &SaveAnswerRequest) -> AppResult<()> {
        let request = self.client.post(self.url("save-answer")).json(payload);
        self.send("save-answer", request).await?;
        Ok(())
    }

    async fn my_answers(
        &self,
        student_id: &str,
        module_id: &str,
        attempt: u32,
    ) -> AppResult<Vec<SubmittedAnswer>> {
        let attempt = attempt.to_string();
        let request = self.client.get(self.url("my-answers")).query(&[
            ("student_id", student_id),
            ("module_id", module_id),
            ("attempt", attempt.as_str()),
        ]);
        self.send_json("my-answers", request).await
    }

    async fn submit_test(
        &self,
        student_id: &str,
        module_id: &str,
        attempt: u32,
    ) -> AppResult<SubmitTestResponse> {
        let attempt = attempt.to_string();
        let request = self.client.post(self.url("submit-test")).query(&[
            ("student_id", student_id),
            ("module_id", module_id),
            ("attempt", attempt.as_str()),
        ]);
        self.send_json("submit-test", request).await
    }

    async fn feedback_status(&self, student_id: &str, attempt: u32) -> AppResult<FeedbackStatus> {
        let attempt = attempt.to_string();
        let request = self
            .client
            .get(self.url("feedback-status"))
            .query(&[("student_id", student_id), ("attempt", attempt.as_str())]);
        self.send_json("feedback-status", request).await
    }

    async fn feedback(&self, student_id: &str) -> AppResult<Vec<FeedbackItem>> {
        let request = self
            .client
            .get(self.url("feedback"))
            .query(&[("student_id", student_id)]);
        self.send_json("feedback", request).await
    }
}

/// 提取错误信息：FastAPI 的 `detail`，或通用的 `message` / `error`
fn extract_error_message(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

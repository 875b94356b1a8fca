//! 下游文档服务客户端
//!
//! `DocumentService` 是网关与下游之间唯一的接缝：
//! - 每个下游能力对应一个方法，会话 token 作为关联头传递
//! - 不包含业务逻辑，错误原样交给重试执行器
//! - 下游以 2xx 返回 `{"error": ...}` 时视为业务错误

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::DownstreamConfig;
use crate::error::DownstreamError;
use crate::models::downstream::{
    AskRequest, AskResponse, CompareRequest, CompareResponse, ProcessDocumentRequest,
    ProcessDocumentResponse, StatusResponse, SummarizeRequest, SummarizeResponse, ASK_PATH,
    COMPARE_PATH, PROCESS_PDF_PATH, STATUS_PATH, SUMMARIZE_PATH,
};

#[async_trait]
pub trait DocumentService: Send + Sync {
    /// 提交文档处理（按文件路径）
    async fn process_document(
        &self,
        session_id: &str,
        request: &ProcessDocumentRequest,
    ) -> Result<ProcessDocumentResponse, DownstreamError>;

    async fn ask(&self, session_id: &str, request: &AskRequest)
        -> Result<AskResponse, DownstreamError>;

    async fn summarize(
        &self,
        session_id: &str,
        request: &SummarizeRequest,
    ) -> Result<SummarizeResponse, DownstreamError>;

    async fn compare(
        &self,
        session_id: &str,
        request: &CompareRequest,
    ) -> Result<CompareResponse, DownstreamError>;

    /// 查询会话对应的文档处理状态
    async fn status(&self, session_id: &str) -> Result<StatusResponse, DownstreamError>;
}

/// 基于 reqwest 的下游客户端
#[derive(Debug, Clone)]
pub struct HttpDocumentService {
    client: Client,
    base_url: String,
    correlation_header: String,
}

impl HttpDocumentService {
    pub fn new(config: &DownstreamConfig) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(&config.base_url)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            correlation_header: config.correlation_header.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, session_id: &str, path: &str, body: &B) -> Result<T, DownstreamError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.endpoint(path))
            .header(self.correlation_header.as_str(), session_id)
            .header("Accept", "application/json")
            .json(body);
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DownstreamError> {
        let resp = request.send().await.map_err(|e| {
            tracing::warn!("[DOWNSTREAM] {} request failed: {}", path, e);
            DownstreamError::Network(e.to_string())
        })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DownstreamError::Network(format!("failed to read response body: {e}")))?;
        tracing::debug!("[DOWNSTREAM] {} -> {} ({} bytes)", path, status, bytes.len());

        if !status.is_success() {
            let detail = error_detail(&bytes);
            tracing::warn!("[DOWNSTREAM] {} returned {}: {}", path, status, detail);
            return Err(DownstreamError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| DownstreamError::Decode(format!("{path}: {e}")))?;
        if let Some(message) = application_error(&value) {
            tracing::warn!("[DOWNSTREAM] {} reported error: {}", path, message);
            return Err(DownstreamError::Application(message));
        }
        serde_json::from_value(value).map_err(|e| DownstreamError::Decode(format!("{path}: {e}")))
    }
}

/// 2xx 响应体中的 `error` 字段
fn application_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

/// 非 2xx 响应的诊断信息：优先取 `detail` / `error` 字段，否则取原始文本
fn error_detail(bytes: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        for key in ["detail", "error", "message"] {
            match value.get(key) {
                Some(Value::String(text)) => return text.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[async_trait]
impl DocumentService for HttpDocumentService {
    async fn process_document(
        &self,
        session_id: &str,
        request: &ProcessDocumentRequest,
    ) -> Result<ProcessDocumentResponse, DownstreamError> {
        self.post(session_id, PROCESS_PDF_PATH, request).await
    }

    async fn ask(
        &self,
        session_id: &str,
        request: &AskRequest,
    ) -> Result<AskResponse, DownstreamError> {
        self.post(session_id, ASK_PATH, request).await
    }

    async fn summarize(
        &self,
        session_id: &str,
        request: &SummarizeRequest,
    ) -> Result<SummarizeResponse, DownstreamError> {
        self.post(session_id, SUMMARIZE_PATH, request).await
    }

    async fn compare(
        &self,
        session_id: &str,
        request: &CompareRequest,
    ) -> Result<CompareResponse, DownstreamError> {
        self.post(session_id, COMPARE_PATH, request).await
    }

    async fn status(&self, session_id: &str) -> Result<StatusResponse, DownstreamError> {
        let request = self
            .client
            .get(self.endpoint(STATUS_PATH))
            .header(self.correlation_header.as_str(), session_id)
            .header("Accept", "application/json");
        self.send(STATUS_PATH, request).await
    }
}

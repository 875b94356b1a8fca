//! 测试用的脚本化文档服务

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::DocumentService;
use crate::error::DownstreamError;
use crate::models::downstream::{
    AskRequest, AskResponse, CompareRequest, CompareResponse, ProcessDocumentRequest,
    ProcessDocumentResponse, StatusResponse, SummarizeRequest, SummarizeResponse,
};

/// 下一次调用的结果
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(Value),
    Fail(DownstreamError),
    /// 永不返回，用于触发截止时间
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub session_id: String,
    pub payload: Value,
}

/// 按队列返回预设结果，队列为空时返回默认成功响应
#[derive(Debug, Default)]
pub struct ScriptedDocumentService {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl ScriptedDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, step: Scripted) -> Self {
        self.push(step);
        self
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        session_id: &str,
        payload: Value,
        default: Value,
    ) -> Result<T, DownstreamError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RecordedCall {
            operation,
            session_id: session_id.to_string(),
            payload,
        });
        let step = self.script.lock().unwrap().pop_front();
        let value = match step {
            None => default,
            Some(Scripted::Reply(value)) => value,
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Hang) => std::future::pending::<Value>().await,
        };
        serde_json::from_value(value).map_err(|e| DownstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DocumentService for ScriptedDocumentService {
    async fn process_document(
        &self,
        session_id: &str,
        request: &ProcessDocumentRequest,
    ) -> Result<ProcessDocumentResponse, DownstreamError> {
        let default = json!({
            "message": "PDF processed successfully",
            "session_id": session_id,
            "upload_time": "2024-05-01T10:00:00",
            "chunks_created": 3,
        });
        self.respond("process_document", session_id, json!(request), default)
            .await
    }

    async fn ask(
        &self,
        session_id: &str,
        request: &AskRequest,
    ) -> Result<AskResponse, DownstreamError> {
        let default = json!({ "answer": format!("answer to {}", request.question) });
        self.respond("ask", session_id, json!(request), default).await
    }

    async fn summarize(
        &self,
        session_id: &str,
        request: &SummarizeRequest,
    ) -> Result<SummarizeResponse, DownstreamError> {
        let default = json!({ "summary": "a short summary" });
        self.respond("summarize", session_id, json!(request), default)
            .await
    }

    async fn compare(
        &self,
        session_id: &str,
        request: &CompareRequest,
    ) -> Result<CompareResponse, DownstreamError> {
        let default = json!({ "comparison": "they differ" });
        self.respond("compare", session_id, json!(request), default)
            .await
    }

    async fn status(&self, session_id: &str) -> Result<StatusResponse, DownstreamError> {
        let default = json!({ "pdf_loaded": false, "session_id": null, "upload_time": null });
        self.respond("status", session_id, Value::Null, default).await
    }
}

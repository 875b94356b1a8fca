//! 网关对外数据模型
//!
//! 校验后的请求载荷与返回给客户端的响应体（camelCase）。

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::downstream::ProcessDocumentResponse;
use crate::session::DocumentInfo;

/// 请求级的文档选择，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSelection {
    /// 去重后的文档 ID，保持调用方给出的顺序
    pub doc_ids: Vec<String>,
}

impl DocumentSelection {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskPayload {
    /// 去除首尾空白后的问题
    pub question: String,
    pub selection: Option<DocumentSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummarizePayload {
    pub selection: Option<DocumentSelection>,
}

/// 对比目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareTargets {
    /// 两个会话各自加载的文档
    Sessions { first: String, second: String },
    /// 按文档 ID 选择（至少两个）
    Documents(DocumentSelection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparePayload {
    pub question: String,
    pub targets: CompareTargets,
}

/// multipart 请求中的一个部分
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub field_name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub session_id: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_created: Option<u64>,
    /// 下游原始返回
    pub detail: ProcessDocumentResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub answer: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    pub comparison: String,
    pub compared: [String; 2],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearHistoryResponse {
    pub message: String,
    pub session_id: Option<String>,
    pub history_length: usize,
    pub has_session: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfStatusResponse {
    pub pdf_loaded: bool,
    pub upload_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
    pub has_session: bool,
    pub has_history: bool,
    pub history_length: usize,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
}

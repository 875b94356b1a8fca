//! 下游文档服务数据模型
//!
//! 下游服务的请求/响应契约：
//!
//! - `POST /process-pdf` `{filePath}` -> `{message, session_id, upload_time, chunks_created}`
//! - `POST /ask` `{question, history}` -> `{answer}`
//! - `POST /summarize` `{pdf}` -> `{summary}`
//! - `POST /compare` `{session_id_1, session_id_2, question}` -> `{comparison}`
//! - `GET /status` -> `{pdf_loaded, session_id, upload_time}`
//!
//! 下游在处理失败时可能以 200 返回 `{"error": "..."}`，由客户端适配层识别。
use serde::{Deserialize, Serialize};

use crate::session::ChatTurn;

pub const PROCESS_PDF_PATH: &str = "/process-pdf";
pub const ASK_PATH: &str = "/ask";
pub const SUMMARIZE_PATH: &str = "/summarize";
pub const COMPARE_PATH: &str = "/compare";
pub const STATUS_PATH: &str = "/status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocumentRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessDocumentResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub upload_time: Option<String>,
    #[serde(default)]
    pub chunks_created: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// 本轮之前的对话历史，按插入顺序
    pub history: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub pdf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    pub session_id_1: String,
    pub session_id_2: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub comparison: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub pdf_loaded: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub upload_time: Option<String>,
}

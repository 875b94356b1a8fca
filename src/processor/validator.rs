//! 请求校验
//!
//! 纯函数：把原始请求体转换为类型化载荷，或返回指明字段的校验错误。
//! 校验失败时不会触碰会话、限流器或下游服务。

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{
    AskPayload, ComparePayload, CompareTargets, DocumentSelection, SummarizePayload, UploadPart,
    UploadPayload,
};

/// 问题的最大字符数
pub const MAX_QUESTION_CHARS: usize = 2000;

/// 上传请求中文件字段的名称
pub const UPLOAD_FIELD: &str = "file";

pub const DEFAULT_COMPARE_QUESTION: &str = "Compare these documents";

/// 把请求体解析为 JSON，空请求体视为 `{}`
pub fn parse_body(body: &[u8]) -> Result<Value, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ValidationError::new("body", format!("request body is not valid JSON: {e}")))
}

pub fn validate_ask(body: &Value) -> Result<AskPayload, ValidationError> {
    let body = as_object(body)?;
    let question = match body.get("question") {
        None | Some(Value::Null) => {
            return Err(ValidationError::new("question", "question is required"))
        }
        Some(value) => validate_question(value, "question")?,
    };
    let selection = document_selection(body, 1)?;
    Ok(AskPayload {
        question,
        selection,
    })
}

pub fn validate_summarize(body: &Value) -> Result<SummarizePayload, ValidationError> {
    let body = as_object(body)?;
    Ok(SummarizePayload {
        selection: document_selection(body, 1)?,
    })
}

/// 对比请求：`sessionId1` + `sessionId2`，或至少两个不同的 `docIds`
pub fn validate_compare(body: &Value) -> Result<ComparePayload, ValidationError> {
    let body = as_object(body)?;

    let question = match body.get("question") {
        None | Some(Value::Null) => DEFAULT_COMPARE_QUESTION.to_string(),
        Some(value) => validate_question(value, "question")?,
    };

    let first = session_field(body, "sessionId1", "session_id_1")?;
    let second = session_field(body, "sessionId2", "session_id_2")?;

    let targets = match (first, second) {
        (Some(first), Some(second)) => {
            if first == second {
                return Err(ValidationError::new(
                    "sessionId2",
                    "sessionId1 and sessionId2 must refer to different documents",
                ));
            }
            CompareTargets::Sessions { first, second }
        }
        (Some(_), None) => {
            return Err(ValidationError::new(
                "sessionId2",
                "sessionId2 is required when sessionId1 is given",
            ))
        }
        (None, Some(_)) => {
            return Err(ValidationError::new(
                "sessionId1",
                "sessionId1 is required when sessionId2 is given",
            ))
        }
        (None, None) => match document_selection(body, 2)? {
            Some(selection) => CompareTargets::Documents(selection),
            None => {
                return Err(ValidationError::new(
                    "docIds",
                    "provide sessionId1 and sessionId2, or docIds with at least two documents",
                ))
            }
        },
    };

    Ok(ComparePayload { question, targets })
}

/// 上传请求必须恰好包含一个名为 `file` 的文件部分
pub fn validate_upload(parts: &[UploadPart]) -> Result<UploadPayload, ValidationError> {
    let mut files = parts
        .iter()
        .filter(|part| part.field_name.as_deref() == Some(UPLOAD_FIELD));

    let Some(part) = files.next() else {
        return Err(ValidationError::new(UPLOAD_FIELD, "no file uploaded"));
    };
    if files.next().is_some() {
        return Err(ValidationError::new(
            UPLOAD_FIELD,
            "exactly one file must be uploaded",
        ));
    }

    let file_name = part
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ValidationError::new(UPLOAD_FIELD, "uploaded file has no file name"))?;
    if part.data.is_empty() {
        return Err(ValidationError::new(UPLOAD_FIELD, "uploaded file is empty"));
    }

    Ok(UploadPayload {
        file_name: file_name.to_string(),
        content_type: part.content_type.clone(),
        data: part.data.clone(),
    })
}

fn as_object(body: &Value) -> Result<&serde_json::Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::new("body", "request body must be a JSON object"))
}

fn validate_question(value: &Value, field: &str) -> Result<String, ValidationError> {
    let Some(text) = value.as_str() else {
        return Err(ValidationError::new(field, format!("{field} must be a string")));
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, format!("{field} must not be empty")));
    }
    // 上限作用于转发给下游的去空白文本
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(ValidationError::new(
            field,
            format!("{field} must be at most {MAX_QUESTION_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn session_field(
    body: &serde_json::Map<String, Value>,
    name: &str,
    alias: &str,
) -> Result<Option<String>, ValidationError> {
    let value = match body.get(name).or_else(|| body.get(alias)) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    match value.as_str().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(Some(id.to_string())),
        Some(_) => Err(ValidationError::new(name, format!("{name} must not be empty"))),
        None => Err(ValidationError::new(name, format!("{name} must be a string"))),
    }
}

/// 解析可选的 `docIds`；出现时必须至少包含 `min` 个不同的非空 ID
fn document_selection(
    body: &serde_json::Map<String, Value>,
    min: usize,
) -> Result<Option<DocumentSelection>, ValidationError> {
    let field = "docIds";
    let value = match body.get(field).or_else(|| body.get("doc_ids")) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let Some(items) = value.as_array() else {
        return Err(ValidationError::new(field, "docIds must be an array of strings"));
    };

    let mut doc_ids: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ValidationError::new(field, "docIds must contain only non-empty strings")
            })?;
        if !doc_ids.iter().any(|existing| existing == id) {
            doc_ids.push(id.to_string());
        }
    }

    if doc_ids.len() < min {
        let message = if min == 1 {
            "docIds must not be empty".to_string()
        } else {
            format!("docIds must contain at least {min} distinct documents")
        };
        return Err(ValidationError::new(field, message));
    }
    Ok(Some(DocumentSelection { doc_ids }))
}

//! 响应转换
//!
//! 把网关错误映射为客户端可见的状态码与错误体，
//! 并把下游成功结果整理为对外的 `answer` / `summary` / `comparison` 格式。
//!
//! 错误体格式：`{"error": {"type": "...", "message": "...", ...}}`

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{FailureKind, GatewayError, RetryFailure};
use crate::models::downstream::{
    AskResponse, CompareResponse, ProcessDocumentResponse, SummarizeResponse,
};
use crate::models::{AnswerResponse, ComparisonResponse, SummaryResponse, UploadResponse};

pub const TIMEOUT_MESSAGE: &str =
    "The document service took too long to respond. Please try again.";

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Downstream(failure) => downstream_status(failure),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 超时 → 504；否则使用下游状态码（仅限 4xx/5xx），没有时为 500
fn downstream_status(failure: &RetryFailure) -> StatusCode {
    if failure.kind == FailureKind::Timeout {
        return StatusCode::GATEWAY_TIMEOUT;
    }
    failure
        .last_error
        .status()
        .filter(|code| (400..=599).contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.category();

        let body = match &self {
            Self::Validation(err) => json!({
                "error": {
                    "type": category,
                    "field": err.field,
                    "message": err.message,
                }
            }),
            Self::QuotaExceeded {
                class,
                retry_after,
                message,
            } => json!({
                "error": {
                    "type": category,
                    "operation": class,
                    "message": message,
                    "retryAfterSecs": retry_after_secs(retry_after),
                }
            }),
            Self::Downstream(failure) => {
                let message = match failure.kind {
                    FailureKind::Timeout => TIMEOUT_MESSAGE.to_string(),
                    FailureKind::Downstream => {
                        format!("The document service failed to {}", failure.operation)
                    }
                };
                json!({
                    "error": {
                        "type": category,
                        "message": message,
                        "attempts": failure.attempts,
                        "detail": failure.last_error.detail(),
                    }
                })
            }
            Self::Internal(detail) => json!({
                "error": {
                    "type": category,
                    "message": "Internal gateway error",
                    "detail": detail,
                }
            }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::QuotaExceeded { retry_after, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs(retry_after).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// 向上取整到秒，至少 1 秒
fn retry_after_secs(retry_after: &std::time::Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    };
    secs.max(1)
}

pub fn answer_body(response: AskResponse, session_id: &str) -> AnswerResponse {
    AnswerResponse {
        answer: response.answer,
        session_id: session_id.to_string(),
    }
}

pub fn summary_body(response: SummarizeResponse, session_id: &str) -> SummaryResponse {
    SummaryResponse {
        summary: response.summary,
        session_id: session_id.to_string(),
    }
}

pub fn comparison_body(response: CompareResponse, compared: [String; 2]) -> ComparisonResponse {
    ComparisonResponse {
        comparison: response.comparison,
        compared,
    }
}

pub fn upload_body(
    detail: ProcessDocumentResponse,
    session_id: &str,
    file_name: &str,
) -> UploadResponse {
    UploadResponse {
        message: detail
            .message
            .clone()
            .unwrap_or_else(|| "PDF processed successfully".to_string()),
        session_id: session_id.to_string(),
        file_name: file_name.to_string(),
        upload_time: detail.upload_time.clone(),
        chunks_created: detail.chunks_created,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DownstreamError, ValidationError};
    use crate::session::OperationClass;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn failure(kind: FailureKind, last_error: DownstreamError) -> GatewayError {
        GatewayError::Downstream(RetryFailure {
            operation: "ask".to_string(),
            kind,
            attempts: 3,
            last_error,
        })
    }

    #[tokio::test]
    async fn test_validation_maps_to_400() {
        let response =
            GatewayError::from(ValidationError::new("question", "must not be empty"))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(body["error"]["field"], "question");
    }

    #[tokio::test]
    async fn test_quota_sets_retry_after() {
        let response = GatewayError::QuotaExceeded {
            class: OperationClass::Upload,
            retry_after: Duration::from_millis(840_200),
            message: "Too many uploads".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "841");
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "quota_exceeded");
        assert_eq!(body["error"]["operation"], "upload");
        assert_eq!(body["error"]["retryAfterSecs"], 841);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_504() {
        let response = failure(
            FailureKind::Timeout,
            DownstreamError::Timeout(Duration::from_secs(45)),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "timeout");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("took too long"));
    }

    #[tokio::test]
    async fn test_downstream_status_passthrough() {
        let response = failure(
            FailureKind::Downstream,
            DownstreamError::Status {
                status: 422,
                detail: "unreadable pdf".to_string(),
            },
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "downstream_failure");
        assert_eq!(body["error"]["detail"], "unreadable pdf");
    }

    #[tokio::test]
    async fn test_downstream_without_status_is_500() {
        let response = failure(
            FailureKind::Downstream,
            DownstreamError::Application("No PDF loaded".to_string()),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["detail"], "No PDF loaded");

        let err = failure(
            FailureKind::Downstream,
            DownstreamError::Status {
                status: 302,
                detail: String::new(),
            },
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upload_body_defaults_message() {
        let body = upload_body(
            ProcessDocumentResponse {
                chunks_created: Some(12),
                ..Default::default()
            },
            "token",
            "a.pdf",
        );
        assert_eq!(body.message, "PDF processed successfully");
        assert_eq!(body.chunks_created, Some(12));
    }
}

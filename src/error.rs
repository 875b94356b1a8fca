//! 错误类型
//!
//! 网关对外的错误分类：
//! - 校验错误（客户端造成，不重试，4xx）
//! - 配额超限（客户端造成，不重试，429）
//! - 超时（可重试，耗尽后返回 504）
//! - 下游失败（5xx 可重试，4xx 立即返回）
//! - 网络失败（总是视为暂时性错误）

use std::time::Duration;

use thiserror::Error;

use crate::session::OperationClass;

/// 请求校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// 违反约束的字段名
    pub field: String,
    /// 可读的错误描述
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 会话存储错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
}

/// 下游文档服务调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    /// 连接失败、连接重置等网络层错误
    #[error("network failure: {0}")]
    Network(String),
    /// 单次调用超过截止时间
    #[error("downstream call exceeded {0:?}")]
    Timeout(Duration),
    /// 下游返回非 2xx 状态码
    #[error("downstream returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    /// 下游以 2xx 返回了业务错误（响应体中的 `error` 字段）
    #[error("downstream reported an error: {0}")]
    Application(String),
    /// 响应体无法解析
    #[error("invalid downstream response: {0}")]
    Decode(String),
}

impl DownstreamError {
    /// 只有 500/502/503/504、网络错误和超时可以重试
    ///
    /// 其他 5xx（如 501）视为永久错误。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Application(_) | Self::Decode(_) => false,
        }
    }

    /// 下游返回的状态码（如果有）
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 下游提供的诊断信息
    pub fn detail(&self) -> String {
        match self {
            Self::Status { detail, .. } => detail.clone(),
            Self::Application(detail) | Self::Network(detail) | Self::Decode(detail) => {
                detail.clone()
            }
            Self::Timeout(deadline) => format!("no response within {}ms", deadline.as_millis()),
        }
    }
}

/// 重试耗尽后的失败标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 至少有一次尝试超过了截止时间
    Timeout,
    /// 其他下游失败
    Downstream,
}

/// 重试执行器返回的失败结果
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryFailure {
    pub operation: String,
    pub kind: FailureKind,
    pub attempts: u32,
    pub last_error: DownstreamError,
}

/// 网关对外错误
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("quota exceeded for {class}: {message}")]
    QuotaExceeded {
        class: OperationClass,
        retry_after: Duration,
        message: String,
    },

    #[error(transparent)]
    Downstream(#[from] RetryFailure),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for GatewayError {
    fn from(error: SessionError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl GatewayError {
    /// 机器可识别的错误类别
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Downstream(failure) => match failure.kind {
                FailureKind::Timeout => "timeout",
                FailureKind::Downstream => "downstream_failure",
            },
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [500, 502, 503, 504] {
            let err = DownstreamError::Status {
                status,
                detail: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
        for status in [400, 404, 422, 501, 505, 511] {
            let err = DownstreamError::Status {
                status,
                detail: String::new(),
            };
            assert!(!err.is_retryable(), "{status} should not be retryable");
        }
        assert!(DownstreamError::Network("reset".into()).is_retryable());
        assert!(DownstreamError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!DownstreamError::Application("empty pdf".into()).is_retryable());
    }

    #[test]
    fn test_category() {
        let failure = RetryFailure {
            operation: "ask".into(),
            kind: FailureKind::Timeout,
            attempts: 3,
            last_error: DownstreamError::Timeout(Duration::from_secs(45)),
        };
        assert_eq!(GatewayError::from(failure).category(), "timeout");
        let err = GatewayError::from(ValidationError::new("question", "required"));
        assert_eq!(err.category(), "validation_error");
    }
}

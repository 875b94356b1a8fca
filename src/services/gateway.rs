//! 网关编排服务
//!
//! 每个请求按固定顺序经过：
//! 校验 → 限流 → 会话读写 → 重试执行器 → 下游客户端 → 响应转换 → 会话追加
//!
//! 校验失败和配额超限在本地处理，不会触达下游，也不会修改会话。
//! 会话 token 由调用方显式传入，每个方法都返回最终使用的 token。

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::error::{GatewayError, ValidationError};
use crate::models::downstream::{
    AskRequest, CompareRequest, ProcessDocumentRequest, SummarizeRequest,
};
use crate::models::{
    AnswerResponse, ClearHistoryResponse, CompareTargets, ComparisonResponse, PdfStatusResponse,
    SummaryResponse, UploadPart, UploadResponse,
};
use crate::processor::translator::{answer_body, comparison_body, summary_body, upload_body};
use crate::processor::validator;
use crate::processor::{RetryExecutor, RetryPolicy};
use crate::providers::DocumentService;
use crate::services::upload_store::UploadStore;
use crate::session::{Admission, ChatRole, DocumentInfo, OperationClass, RateLimiter, SessionStore};

/// 成功结果及本次请求关联的会话 token
#[derive(Debug)]
pub struct Reply<T> {
    pub session_id: Option<String>,
    pub body: T,
}

/// 失败结果；会话已创建时仍带回 token，客户端可以继续使用该会话
#[derive(Debug)]
pub struct Failure {
    pub session_id: Option<String>,
    pub error: GatewayError,
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self {
            session_id: None,
            error,
        }
    }
}

impl From<ValidationError> for Failure {
    fn from(error: ValidationError) -> Self {
        GatewayError::from(error).into()
    }
}

trait WithSession<T> {
    fn in_session(self, session_id: &str) -> Result<T, Failure>;
}

impl<T, E: Into<GatewayError>> WithSession<T> for Result<T, E> {
    fn in_session(self, session_id: &str) -> Result<T, Failure> {
        self.map_err(|e| Failure {
            session_id: Some(session_id.to_string()),
            error: e.into(),
        })
    }
}

pub struct Gateway {
    sessions: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    executor: RetryExecutor,
    service: Arc<dyn DocumentService>,
    uploads: UploadStore,
}

impl Gateway {
    pub fn new(config: &Config, service: Arc<dyn DocumentService>) -> Self {
        let ttl_secs = i64::try_from(config.session.ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        let ttl = chrono::Duration::seconds(ttl_secs);
        Self {
            sessions: Arc::new(SessionStore::new(ttl)),
            limiter: Arc::new(RateLimiter::new(config.rate_limits.clone())),
            executor: RetryExecutor::new(RetryPolicy::from(&config.retry)),
            service,
            uploads: UploadStore::new(&config.upload),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor = RetryExecutor::new(policy);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 清理过期会话与限流桶
    pub fn sweep(&self) -> (usize, usize) {
        (self.sessions.cleanup_expired(), self.limiter.cleanup_expired())
    }

    fn admit(&self, client: &str, class: OperationClass) -> Result<(), GatewayError> {
        match self.limiter.admit(client, class) {
            Admission::Allowed { remaining } => {
                tracing::debug!(client, %class, remaining, "[RATE_LIMIT] admitted");
                Ok(())
            }
            Admission::Rejected {
                retry_after,
                message,
            } => Err(GatewayError::QuotaExceeded {
                class,
                retry_after,
                message,
            }),
        }
    }

    /// 上传文档并交给下游处理
    pub async fn upload(
        &self,
        client: &str,
        token: Option<&str>,
        parts: &[UploadPart],
    ) -> Result<Reply<UploadResponse>, Failure> {
        let payload = validator::validate_upload(parts)?;
        self.admit(client, OperationClass::Upload)?;
        let (session_id, _) = self.sessions.get_or_create(token);

        let path = self
            .uploads
            .save(&payload.file_name, &payload.data)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to stage upload: {e}")))
            .in_session(&session_id)?;
        let request = ProcessDocumentRequest {
            file_path: path.to_string_lossy().into_owned(),
        };

        tracing::info!(
            session_id = %session_id,
            file_name = %payload.file_name,
            bytes = payload.data.len(),
            "[GATEWAY] forwarding upload"
        );
        let result = self
            .executor
            .execute("process the document", |_| {
                self.service.process_document(&session_id, &request)
            })
            .await;
        self.uploads.discard(&path).await;
        let detail = result.in_session(&session_id)?;

        self.sessions
            .record_document(
                &session_id,
                DocumentInfo {
                    file_name: payload.file_name.clone(),
                    uploaded_at: Utc::now(),
                    chunks_created: detail.chunks_created,
                    downstream_upload_time: detail.upload_time.clone(),
                },
            )
            .in_session(&session_id)?;

        let body = upload_body(detail, &session_id, &payload.file_name);
        Ok(Reply {
            session_id: Some(session_id),
            body,
        })
    }

    /// 提问
    ///
    /// 用户发言在下游调用前写入历史，助手回答仅在成功时写入；
    /// 下游失败或超时时用户发言保留在历史中。
    pub async fn ask(
        &self,
        client: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Reply<AnswerResponse>, Failure> {
        let payload = validator::validate_ask(body)?;
        self.admit(client, OperationClass::Ask)?;
        let (session_id, session) = self.sessions.get_or_create(token);

        let request = AskRequest {
            question: payload.question.clone(),
            history: session.chat_history,
            doc_ids: payload.selection.map(|s| s.doc_ids),
        };
        self.sessions
            .append_turn(&session_id, ChatRole::User, payload.question)
            .in_session(&session_id)?;

        tracing::info!(
            session_id = %session_id,
            history_len = request.history.len(),
            "[GATEWAY] forwarding question"
        );
        let answer = self
            .executor
            .execute("answer the question", |_| {
                self.service.ask(&session_id, &request)
            })
            .await
            .in_session(&session_id)?;

        self.sessions
            .append_turn(&session_id, ChatRole::Assistant, answer.answer.clone())
            .in_session(&session_id)?;

        let body = answer_body(answer, &session_id);
        Ok(Reply {
            session_id: Some(session_id),
            body,
        })
    }

    pub async fn summarize(
        &self,
        client: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Reply<SummaryResponse>, Failure> {
        let payload = validator::validate_summarize(body)?;
        self.admit(client, OperationClass::Summarize)?;
        let (session_id, session) = self.sessions.get_or_create(token);

        let request = SummarizeRequest {
            pdf: session.document.map(|d| d.file_name),
            doc_ids: payload.selection.map(|s| s.doc_ids),
        };
        tracing::info!(session_id = %session_id, "[GATEWAY] forwarding summarize");
        let summary = self
            .executor
            .execute("summarize the document", |_| {
                self.service.summarize(&session_id, &request)
            })
            .await
            .in_session(&session_id)?;

        let body = summary_body(summary, &session_id);
        Ok(Reply {
            session_id: Some(session_id),
            body,
        })
    }

    /// 对比两个文档；`docIds` 超过两个时取前两个
    ///
    /// 两个标识都必须是已加载文档的会话，否则按校验失败处理，不计配额也不触达下游。
    pub async fn compare(
        &self,
        client: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Reply<ComparisonResponse>, Failure> {
        let payload = validator::validate_compare(body)?;
        let [first, second] = self.resolve_compare_targets(payload.targets)?;
        self.admit(client, OperationClass::Compare)?;
        let (session_id, _) = self.sessions.get_or_create(token);

        let request = CompareRequest {
            session_id_1: first.clone(),
            session_id_2: second.clone(),
            question: payload.question,
        };
        tracing::info!(
            session_id = %session_id,
            first = %first,
            second = %second,
            "[GATEWAY] forwarding compare"
        );
        let comparison = self
            .executor
            .execute("compare the documents", |_| {
                self.service.compare(&session_id, &request)
            })
            .await
            .in_session(&session_id)?;

        let body = comparison_body(comparison, [first, second]);
        Ok(Reply {
            session_id: Some(session_id),
            body,
        })
    }

    fn resolve_compare_targets(&self, targets: CompareTargets) -> Result<[String; 2], Failure> {
        let (pair, fields) = match targets {
            CompareTargets::Sessions { first, second } => {
                ([first, second], ["sessionId1", "sessionId2"])
            }
            CompareTargets::Documents(selection) => {
                let mut ids = selection.doc_ids.into_iter();
                match (ids.next(), ids.next()) {
                    (Some(first), Some(second)) => ([first, second], ["docIds", "docIds"]),
                    _ => {
                        return Err(
                            ValidationError::new("docIds", "Select two documents to compare").into(),
                        )
                    }
                }
            }
        };
        for (id, field) in pair.iter().zip(fields) {
            let loaded = self
                .sessions
                .get(id)
                .is_some_and(|session| session.document.is_some());
            if !loaded {
                tracing::info!(target_id = %id, "[GATEWAY] compare target not resolvable");
                return Err(ValidationError::new(
                    field,
                    format!("Session {id} not found or has no document loaded"),
                )
                .into());
            }
        }
        Ok(pair)
    }

    /// 清空聊天历史；不会创建新会话，重复调用结果相同
    pub fn clear_history(&self, client: &str, token: Option<&str>) -> Reply<ClearHistoryResponse> {
        let known = token.filter(|t| self.sessions.reset(t).is_ok());
        tracing::info!(client, known = known.is_some(), "[GATEWAY] clear history");
        Reply {
            session_id: known.map(str::to_string),
            body: ClearHistoryResponse {
                message: "Chat history cleared".to_string(),
                session_id: known.map(str::to_string),
                history_length: 0,
                has_session: known.is_some(),
            },
        }
    }

    /// 下游处理状态加本地会话摘要；不会创建新会话
    pub async fn status(
        &self,
        client: &str,
        token: Option<&str>,
    ) -> Result<Reply<PdfStatusResponse>, Failure> {
        let Some(session) = token.and_then(|t| self.sessions.get(t)) else {
            tracing::debug!(client, "[GATEWAY] status without session");
            return Ok(Reply {
                session_id: None,
                body: PdfStatusResponse {
                    pdf_loaded: false,
                    upload_time: None,
                    document: None,
                    has_session: false,
                    has_history: false,
                    history_length: 0,
                    session_id: None,
                },
            });
        };

        let session_id = session.id.clone();
        let status = self
            .executor
            .execute("report document status", |_| self.service.status(&session_id))
            .await
            .in_session(&session_id)?;

        let history_length = session.chat_history.len();
        let upload_time = status.upload_time.or_else(|| {
            session
                .document
                .as_ref()
                .and_then(|d| d.downstream_upload_time.clone())
        });
        Ok(Reply {
            session_id: Some(session_id.clone()),
            body: PdfStatusResponse {
                pdf_loaded: status.pdf_loaded,
                upload_time,
                document: session.document,
                has_session: true,
                has_history: history_length > 0,
                history_length,
                session_id: Some(session_id),
            },
        })
    }
}

//! 路由处理函数
//!
//! 处理函数只负责 HTTP 层的工作：解析客户端标识与会话 token、
//! 读取请求体、写回 cookie；业务流程全部交给 `Gateway`。

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::{AppState, SESSION_HEADER};
use crate::error::{GatewayError, ValidationError};
use crate::models::{HealthResponse, UploadPart};
use crate::processor::validator::{self, UPLOAD_FIELD};
use crate::services::{Failure, Reply};

/// 每个请求的上下文：客户端标识与客户端提供的 token
struct Caller {
    client: String,
    token: Option<String>,
}

impl Caller {
    fn resolve(
        state: &AppState,
        connect: Option<ConnectInfo<SocketAddr>>,
        headers: &HeaderMap,
    ) -> Self {
        let peer = connect.map(|ConnectInfo(addr)| addr);
        Self {
            client: state.identity.resolve(peer, headers),
            token: session_token(headers, &state.cookie_name),
        }
    }
}

/// 先读 `X-Session-ID` 头，再读 cookie
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn attach_session(mut response: Response, cookie_name: &str, session_id: Option<&str>) -> Response {
    let Some(session_id) = session_id else {
        return response;
    };
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    let cookie = format!("{cookie_name}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn respond<T: Serialize>(state: &AppState, result: Result<Reply<T>, Failure>) -> Response {
    match result {
        Ok(reply) => attach_session(
            Json(reply.body).into_response(),
            &state.cookie_name,
            reply.session_id.as_deref(),
        ),
        Err(failure) => {
            if let GatewayError::Downstream(retry) = &failure.error {
                tracing::warn!(
                    operation = %retry.operation,
                    attempts = retry.attempts,
                    "[GATEWAY] request failed: {}",
                    retry.last_error
                );
            }
            attach_session(
                failure.error.into_response(),
                &state.cookie_name,
                failure.session_id.as_deref(),
            )
        }
    }
}

fn parse_json(body: &Bytes) -> Result<serde_json::Value, Failure> {
    validator::parse_body(body).map_err(Failure::from)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: state.gateway.sessions().len(),
    })
}

pub async fn upload(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let result = match collect_parts(multipart).await {
        Ok(parts) => {
            state
                .gateway
                .upload(&caller.client, caller.token.as_deref(), &parts)
                .await
        }
        Err(e) => Err(Failure::from(e)),
    };
    respond(&state, result)
}

async fn collect_parts(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<UploadPart>, ValidationError> {
    let mut multipart = multipart.map_err(|e| {
        ValidationError::new(UPLOAD_FIELD, format!("expected a multipart/form-data upload: {e}"))
    })?;

    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ValidationError::new(UPLOAD_FIELD, format!("could not read upload: {e}"))
    })? {
        let field_name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            ValidationError::new(UPLOAD_FIELD, format!("could not read upload: {e}"))
        })?;
        parts.push(UploadPart {
            field_name,
            file_name,
            content_type,
            data,
        });
    }
    Ok(parts)
}

pub async fn ask(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let result = match parse_json(&body) {
        Ok(body) => {
            state
                .gateway
                .ask(&caller.client, caller.token.as_deref(), &body)
                .await
        }
        Err(failure) => Err(failure),
    };
    respond(&state, result)
}

pub async fn summarize(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let result = match parse_json(&body) {
        Ok(body) => {
            state
                .gateway
                .summarize(&caller.client, caller.token.as_deref(), &body)
                .await
        }
        Err(failure) => Err(failure),
    };
    respond(&state, result)
}

pub async fn compare(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let result = match parse_json(&body) {
        Ok(body) => {
            state
                .gateway
                .compare(&caller.client, caller.token.as_deref(), &body)
                .await
        }
        Err(failure) => Err(failure),
    };
    respond(&state, result)
}

pub async fn clear_history(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let reply = state
        .gateway
        .clear_history(&caller.client, caller.token.as_deref());
    respond(&state, Ok(reply))
}

pub async fn pdf_status(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let caller = Caller::resolve(&state, connect, &headers);
    let result = state
        .gateway
        .status(&caller.client, caller.token.as_deref())
        .await;
    respond(&state, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; docgate_session=from-cookie".parse().unwrap());
        assert_eq!(
            session_token(&headers, "docgate_session").as_deref(),
            Some("from-cookie")
        );

        headers.insert(SESSION_HEADER, "from-header".parse().unwrap());
        assert_eq!(
            session_token(&headers, "docgate_session").as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn test_session_token_ignores_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "docgate_session_old=x; other=y".parse().unwrap());
        assert!(session_token(&headers, "docgate_session").is_none());
        headers.insert(header::COOKIE, "docgate_session=".parse().unwrap());
        assert!(session_token(&headers, "docgate_session").is_none());
    }
}

//! HTTP 服务器模块
//!
//! 基于 Axum 的网关服务：
//! - 路由与中间件（请求体限制、CORS）
//! - 会话 token 通过 `X-Session-ID` 头或 cookie 往返
//! - 后台定期清理过期会话与限流桶
//! - 收到 Ctrl+C / SIGTERM 时优雅关闭

mod handlers;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::providers::DocumentService;
use crate::services::Gateway;
use crate::session::ClientIdentityResolver;

/// 客户端与网关之间传递会话 token 的头
pub const SESSION_HEADER: &str = "x-session-id";

/// multipart 分隔符与字段头的额外余量
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub identity: ClientIdentityResolver,
    pub cookie_name: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            identity: ClientIdentityResolver::new(config.server.trusted_proxy_depth),
            cookie_name: Arc::from(config.session.cookie_name.as_str()),
            started_at: Instant::now(),
        }
    }
}

/// 构建路由
pub fn build_router(config: &Config, state: AppState) -> Router {
    let body_limit = config.upload.max_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/ask", post(handlers::ask))
        .route("/summarize", post(handlers::summarize))
        .route("/compare", post(handlers::compare))
        .route("/clear-history", post(handlers::clear_history))
        .route("/pdf-status", get(handlers::pdf_status))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit))
                .layer(cors_layer(&config.server.cors_origins)),
        )
        .with_state(state)
}

/// 未配置来源时放开所有来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[GATEWAY] ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    let session_header = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, session_header.clone()])
        .expose_headers([session_header])
        .allow_credentials(true)
}

/// 定期清理过期会话与限流桶
pub fn spawn_sweeper(gateway: Arc<Gateway>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (sessions, buckets) = gateway.sweep();
            if sessions > 0 || buckets > 0 {
                tracing::info!(sessions, buckets, "[SESSION] sweeper removed expired entries");
            }
        }
    })
}

/// 启动网关并阻塞直到收到关闭信号
pub async fn run_server(config: Config, service: Arc<dyn DocumentService>) -> anyhow::Result<()> {
    let gateway = Arc::new(Gateway::new(&config, service));
    let state = AppState::new(&config, gateway.clone());
    let app = build_router(&config, state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let sweeper = spawn_sweeper(
        gateway,
        Duration::from_secs(config.session.cleanup_interval_secs),
    );

    tracing::info!(
        "[GATEWAY] listening on {} (downstream {}, trusted proxy depth {})",
        addr,
        config.downstream.base_url,
        config.server.trusted_proxy_depth
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweeper.abort();
    tracing::info!("[GATEWAY] stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("[GATEWAY] failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("[GATEWAY] failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("[GATEWAY] shutdown signal received");
}

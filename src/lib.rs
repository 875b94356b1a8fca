//! docgate：文档问答服务前的有状态请求网关
//!
//! 负责请求校验、按客户端限流、会话聊天历史、
//! 带截止时间的有界重试，以及下游结果到客户端响应的转换。

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod processor;
pub mod providers;
pub mod server;
pub mod services;
pub mod session;

pub use config::Config;
pub use error::{DownstreamError, GatewayError};
pub use providers::{DocumentService, HttpDocumentService};
pub use server::run_server;
pub use services::Gateway;

//! 会话与配额模块
//!
//! 提供以下功能：
//! - 会话存储（token -> 聊天历史，惰性创建、按 TTL 过期）
//! - 按客户端与操作类别的固定窗口限流
//! - 基于可信代理层数的客户端标识解析

mod identity;
mod rate_limit;
mod session_store;

pub use identity::{ClientIdentityResolver, FORWARDED_FOR_HEADER};
pub use rate_limit::{Admission, OperationClass, RateLimitBucket, RateLimiter};
pub use session_store::{ChatRole, ChatTurn, DocumentInfo, Session, SessionStore};

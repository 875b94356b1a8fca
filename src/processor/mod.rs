//! 请求处理流水线的纯逻辑部分：校验、重试、响应转换

pub mod retry;
pub mod translator;
pub mod validator;

pub use retry::{RetryExecutor, RetryPolicy};

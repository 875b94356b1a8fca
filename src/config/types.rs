//! 配置类型定义

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// 限流窗口上限（30 天）
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// 网关配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub downstream: DownstreamConfig,
    pub rate_limits: RateLimitConfig,
    pub retry: RetrySettings,
    pub session: SessionConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// 校验配置，拒绝会让网关无法正常工作的取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.timeout_secs must be greater than 0".to_string(),
            ));
        }
        for (name, rule) in [
            ("upload", &self.rate_limits.upload),
            ("ask", &self.rate_limits.ask),
            ("summarize", &self.rate_limits.summarize),
            ("compare", &self.rate_limits.compare),
        ] {
            if rule.max_requests == 0 || rule.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limits.{name} needs max_requests > 0 and window_secs > 0"
                )));
            }
            if rule.window_secs > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid(format!(
                    "rate_limits.{name}.window_secs must be at most {MAX_WINDOW_SECS}"
                )));
            }
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "upload.max_bytes must be greater than 0".to_string(),
            ));
        }
        let url = url::Url::parse(&self.downstream.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "downstream.base_url '{}' is not a valid URL: {}",
                self.downstream.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "downstream.base_url must use http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}

/// 监听配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 网关前方可信反向代理的层数，0 表示直接使用对端地址
    pub trusted_proxy_depth: usize,
    /// 允许跨域的来源，为空时放开所有来源
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            trusted_proxy_depth: 0,
            cors_origins: Vec::new(),
        }
    }
}

/// 下游文档服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub base_url: String,
    /// 携带会话 token 的关联头
    pub correlation_header: String,
    pub connect_timeout_secs: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            correlation_header: "X-Session-ID".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// 单个操作类别的限流规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    const fn per_fifteen_minutes(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 15 * 60,
        }
    }
}

/// 各操作类别的限流规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub upload: RateLimitRule,
    pub ask: RateLimitRule,
    pub summarize: RateLimitRule,
    pub compare: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upload: RateLimitRule::per_fifteen_minutes(5),
            ask: RateLimitRule::per_fifteen_minutes(30),
            summarize: RateLimitRule::per_fifteen_minutes(10),
            compare: RateLimitRule::per_fifteen_minutes(10),
        }
    }
}

/// 重试设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// 单次尝试的截止时间
    pub timeout_secs: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 45,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 空闲多久后过期
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 2 * 60 * 60,
            cleanup_interval_secs: 5 * 60,
            cookie_name: "docgate_session".to_string(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 暂存目录，未设置时使用系统临时目录下的 docgate-uploads
    pub dir: Option<PathBuf>,
    pub max_bytes: usize,
    /// 下游处理完成后是否保留暂存文件
    pub keep_files: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: 20 * 1024 * 1024,
            keep_files: false,
        }
    }
}

impl UploadConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("docgate-uploads"))
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace / debug / info / warn / error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

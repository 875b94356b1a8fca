//! 配置管理模块
//!
//! 提供 YAML 配置文件支持：
//! - 每个段落都有默认值，文件中只需写需要覆盖的字段
//! - 配置路径可通过 `DOCGATE_CONFIG` 环境变量指定
//! - 加载后统一校验

mod types;
mod yaml;

pub use types::{
    Config, DownstreamConfig, LoggingConfig, RateLimitConfig, RateLimitRule, RetrySettings,
    ServerConfig, SessionConfig, UploadConfig, MAX_WINDOW_SECS,
};
pub use yaml::{
    default_config_path, load_config, parse_config, resolve_config_path, ConfigError,
    CONFIG_PATH_ENV,
};

#[cfg(test)]
mod tests;

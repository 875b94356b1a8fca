//! 日志初始化
//!
//! `RUST_LOG` 存在时优先使用，否则使用配置中的 `logging.level`。

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static TRACING_INIT: Once = Once::new();

/// 初始化全局 tracing subscriber，重复调用无副作用
pub fn init_tracing(config: &LoggingConfig) {
    let level = config.level.clone();
    TRACING_INIT.call_once(move || {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(&level));
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(filter)
            .try_init();
    });
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| {
        eprintln!("[LOGGING] invalid level '{level}', falling back to info");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert_eq!(build_filter("debug").to_string(), "debug");
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}

//! YAML 配置加载

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Config;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "DOCGATE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 默认配置路径：~/.docgate/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docgate")
        .join("config.yaml")
}

/// 解析配置路径，环境变量优先
pub fn resolve_config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// 从 YAML 字符串解析并校验配置
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };
    config.validate()?;
    Ok(config)
}

/// 加载配置文件，文件不存在时使用默认配置
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config = parse_config(&content)?;
            tracing::info!("[CONFIG] loaded {}", path.display());
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("[CONFIG] {} not found, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

use super::*;
use std::io::Write;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.server.trusted_proxy_depth, 0);
    assert_eq!(config.rate_limits.upload, RateLimitRule { max_requests: 5, window_secs: 900 });
    assert_eq!(config.rate_limits.ask.max_requests, 30);
    assert_eq!(config.rate_limits.summarize.max_requests, 10);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.timeout_secs, 45);
    assert_eq!(config.downstream.correlation_header, "X-Session-ID");
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
server:
  port: 8080
  trusted_proxy_depth: 1
rate_limits:
  ask:
    max_requests: 100
    window_secs: 60
retry:
  max_attempts: 5
"#;
    let config = parse_config(yaml).unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.trusted_proxy_depth, 1);
    assert_eq!(config.rate_limits.ask.max_requests, 100);
    assert_eq!(config.rate_limits.upload.max_requests, 5);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.timeout_secs, 45);
}

#[test]
fn test_empty_yaml_is_default() {
    assert_eq!(parse_config("").unwrap(), Config::default());
}

#[test]
fn test_invalid_values_rejected() {
    let err = parse_config("retry:\n  max_attempts: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let err = parse_config("rate_limits:\n  upload:\n    max_requests: 0\n    window_secs: 60\n")
        .unwrap_err();
    assert!(err.to_string().contains("rate_limits.upload"));

    let err = parse_config("downstream:\n  base_url: not a url\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let err = parse_config("downstream:\n  base_url: ftp://files.local\n").unwrap_err();
    assert!(err.to_string().contains("http"));
}

#[test]
fn test_oversized_rate_limit_window_rejected() {
    let mut config = Config::default();
    config.rate_limits.ask.window_secs = 100_000_000_000_000_000;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("rate_limits.ask.window_secs"));

    config.rate_limits.ask.window_secs = MAX_WINDOW_SECS;
    assert!(config.validate().is_ok());

    let err = parse_config("rate_limits:\n  compare:\n    max_requests: 3\n    window_secs: 2592001\n")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_malformed_yaml() {
    let err = parse_config("server: [1, 2").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "session:\n  ttl_secs: 60\n  cookie_name: sid").unwrap();
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.session.ttl_secs, 60);
    assert_eq!(config.session.cookie_name, "sid");
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config, Config::default());
}

//! 重试与超时执行器
//!
//! 为下游调用加上单次截止时间，并按指数退避重试暂时性失败：
//! - 每次尝试都用 `tokio::time::timeout` 包裹，超时只取消当前调用
//! - 网络错误、超时、500/502/503/504 会重试，其余错误立即返回
//! - 重试耗尽后返回最后一次错误，并标记为超时或下游失败

use std::future::Future;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::error::{DownstreamError, FailureKind, RetryFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// 单次尝试的截止时间
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            attempt_timeout: Duration::from_secs(settings.timeout_secs),
            backoff_base: Duration::from_millis(settings.base_backoff_ms),
            backoff_max: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    fn normalized(self) -> Self {
        let max_attempts = self.max_attempts.max(1);
        let attempt_timeout = if self.attempt_timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            self.attempt_timeout
        };
        let backoff_max = self.backoff_max.max(self.backoff_base);
        Self {
            max_attempts,
            attempt_timeout,
            backoff_base: self.backoff_base,
            backoff_max,
        }
    }

    /// 第 `attempt` 次尝试失败后的等待时间：`base * 2^(attempt-1)`，不超过上限
    pub fn backoff_delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let factor = 1_u128 << shift;
        let base = self.backoff_base.as_millis();
        let max = self.backoff_max.as_millis();
        let delay_ms = base.saturating_mul(factor).min(max);
        Duration::from_millis(u64::try_from(delay_ms).unwrap_or(u64::MAX))
    }
}

/// 默认的重试判定
pub fn is_retryable(error: &DownstreamError) -> bool {
    error.is_retryable()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: policy.normalized(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 使用默认判定执行 `call`，`call` 接收从 1 开始的尝试序号
    pub async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DownstreamError>>,
    {
        self.execute_with(operation, call, is_retryable).await
    }

    pub async fn execute_with<T, F, Fut, P>(
        &self,
        operation: &str,
        mut call: F,
        retryable: P,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DownstreamError>>,
        P: Fn(&DownstreamError) -> bool,
    {
        let policy = self.policy;
        let mut timed_out = false;
        let mut attempt = 1_u32;

        loop {
            let error = match tokio::time::timeout(policy.attempt_timeout, call(attempt)).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "[RETRY] succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(_) => DownstreamError::Timeout(policy.attempt_timeout),
            };
            let hit_deadline = matches!(error, DownstreamError::Timeout(_));
            timed_out |= hit_deadline;

            if !retryable(&error) {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    "[RETRY] permanent failure, not retrying"
                );
                let kind = if hit_deadline {
                    FailureKind::Timeout
                } else {
                    FailureKind::Downstream
                };
                return Err(RetryFailure {
                    operation: operation.to_string(),
                    kind,
                    attempts: attempt,
                    last_error: error,
                });
            }

            if attempt >= policy.max_attempts {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    timed_out,
                    error = %error,
                    "[RETRY] attempts exhausted"
                );
                let kind = if timed_out {
                    FailureKind::Timeout
                } else {
                    FailureKind::Downstream
                };
                return Err(RetryFailure {
                    operation: operation.to_string(),
                    kind,
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = policy.backoff_delay_for_attempt(attempt);
            tracing::warn!(
                operation,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "[RETRY] transient failure, backing off"
            );
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_secs(45),
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
        }
    }

    fn status(code: u16) -> DownstreamError {
        DownstreamError::Status {
            status: code,
            detail: format!("status {code}"),
        }
    }

    #[test]
    fn test_backoff_is_monotone_and_capped() {
        let policy = policy(10);
        let delays: Vec<_> = (1..=10).map(|a| policy.backoff_delay_for_attempt(a)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_from_settings() {
        let defaults = RetryPolicy::default();
        assert_eq!(defaults.max_attempts, 3);
        assert_eq!(defaults.attempt_timeout, Duration::from_secs(45));
        assert_eq!(RetryExecutor::new(policy(0)).policy().max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retry_until_exhausted() {
        let executor = RetryExecutor::new(policy(3));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();

        let result: Result<(), _> = executor
            .execute("ask", |attempt| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push((attempt, Instant::now()));
                    Err(status(503))
                }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.kind, FailureKind::Downstream);
        assert_eq!(failure.last_error.status(), Some(503));

        let calls = calls.lock().unwrap();
        let attempts: Vec<u32> = calls.iter().map(|(a, _)| *a).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(gaps, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        let executor = RetryExecutor::new(policy(3));
        for code in [400, 404, 422, 501] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = executor
                .execute("summarize", |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(status(code)) }
                })
                .await;
            let failure = result.unwrap_err();
            assert_eq!(calls.load(Ordering::SeqCst), 1, "status {code}");
            assert_eq!(failure.attempts, 1);
            assert_eq!(failure.kind, FailureKind::Downstream);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let executor = RetryExecutor::new(policy(3));
        let calls = AtomicU32::new(0);
        let result = executor
            .execute("ask", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(DownstreamError::Network("connection reset".into()))
                    } else {
                        Ok("answer")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_on_every_attempt() {
        let executor = RetryExecutor::new(policy(3));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor
            .execute("ask", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending()
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            failure.last_error,
            DownstreamError::Timeout(Duration::from_secs(45))
        );
        assert!(started.elapsed() >= Duration::from_secs(135));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_timeout_tags_exhaustion_as_timeout() {
        let executor = RetryExecutor::new(policy(2));
        let result: Result<(), _> = executor
            .execute("compare", |attempt| async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Err(status(502))
            })
            .await;
        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.last_error.status(), Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let executor = RetryExecutor::new(policy(4));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor
            .execute_with(
                "upload",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(status(503)) }
                },
                |_| false,
            )
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! 客户端配额限流模块
//!
//! 提供以下功能：
//! - 按 (客户端标识, 操作类别) 维护固定窗口计数
//! - 每个操作类别独立的上限与窗口时长
//! - 原子的"检查并递增"，突发并发下不会超额放行
//! - 拒绝时给出 retry-after 提示

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::{RateLimitConfig, RateLimitRule};

/// 操作类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    Upload,
    Ask,
    Summarize,
    Compare,
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Ask => write!(f, "ask"),
            Self::Summarize => write!(f, "summarize"),
            Self::Compare => write!(f, "compare"),
        }
    }
}

/// 限流桶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBucket {
    /// 当前窗口开始时间
    pub window_start: DateTime<Utc>,
    /// 当前窗口内已放行的请求数
    pub count: u32,
}

/// 准入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 放行，`remaining` 为本窗口剩余额度
    Allowed { remaining: u32 },
    /// 拒绝
    Rejected {
        retry_after: StdDuration,
        message: String,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// 配额限流器
#[derive(Debug)]
pub struct RateLimiter {
    /// (client, class) -> bucket
    buckets: DashMap<(String, OperationClass), RateLimitBucket>,
    rules: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(rules: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rules,
        }
    }

    fn rule(&self, class: OperationClass) -> &RateLimitRule {
        match class {
            OperationClass::Upload => &self.rules.upload,
            OperationClass::Ask => &self.rules.ask,
            OperationClass::Summarize => &self.rules.summarize,
            OperationClass::Compare => &self.rules.compare,
        }
    }

    /// 请求准入
    pub fn admit(&self, client: &str, class: OperationClass) -> Admission {
        self.admit_at(client, class, Utc::now())
    }

    /// 以指定时间点进行准入判断
    ///
    /// 窗口过期检查在递增之前执行；被拒绝的请求不计数。
    /// entry 持有分片写锁，检查与递增在同一临界区内完成。
    pub fn admit_at(&self, client: &str, class: OperationClass, now: DateTime<Utc>) -> Admission {
        let rule = self.rule(class);
        let window = window_of(rule);

        let mut bucket = self
            .buckets
            .entry((client.to_string(), class))
            .or_insert(RateLimitBucket {
                window_start: now,
                count: 0,
            });

        if now >= window_end(bucket.window_start, window) {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= rule.max_requests {
            let reset_at = window_end(bucket.window_start, window);
            let retry_after = (reset_at - now).to_std().unwrap_or(StdDuration::ZERO);
            let retry_secs = retry_after.as_secs().max(1);

            tracing::warn!(
                client = %client,
                class = %class,
                limit = rule.max_requests,
                retry_after_secs = retry_secs,
                "[RATE_LIMIT] quota exceeded"
            );

            return Admission::Rejected {
                retry_after,
                message: format!(
                    "Too many {} requests: limit is {} per {}. Try again in {} seconds.",
                    class,
                    rule.max_requests,
                    describe_window(rule.window_secs),
                    retry_secs
                ),
            };
        }

        bucket.count += 1;
        Admission::Allowed {
            remaining: rule.max_requests - bucket.count,
        }
    }

    /// 查看某个桶当前状态（窗口已过期时视为空）
    pub fn bucket(&self, client: &str, class: OperationClass) -> Option<RateLimitBucket> {
        self.bucket_at(client, class, Utc::now())
    }

    pub fn bucket_at(
        &self,
        client: &str,
        class: OperationClass,
        now: DateTime<Utc>,
    ) -> Option<RateLimitBucket> {
        let window = window_of(self.rule(class));
        self.buckets
            .get(&(client.to_string(), class))
            .map(|b| *b)
            .filter(|b| now < window_end(b.window_start, window))
    }

    /// 清理窗口已过期的桶
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|(_, class), bucket| {
            now < window_end(bucket.window_start, window_of(self.rule(*class)))
        });
        before.saturating_sub(self.buckets.len())
    }
}

/// 规则窗口长度；超出 chrono 表示范围时饱和到最大值
fn window_of(rule: &RateLimitRule) -> Duration {
    i64::try_from(rule.window_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn window_end(start: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    start
        .checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn describe_window(window_secs: u64) -> String {
    if window_secs >= 60 && window_secs % 60 == 0 {
        format!("{} minutes", window_secs / 60)
    } else {
        format!("{} seconds", window_secs)
    }
}

//! 客户端标识解析
//!
//! 限流使用的客户端标识来自请求的来源地址。部署在反向代理之后时，
//! 由配置的可信代理层数决定 `X-Forwarded-For` 中哪一项是可信的，
//! 不会根据请求内容临时推断。

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// 客户端标识解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIdentityResolver {
    /// 网关前方可信代理的层数（0 表示直接面向客户端）
    trusted_proxy_depth: usize,
}

impl ClientIdentityResolver {
    pub fn new(trusted_proxy_depth: usize) -> Self {
        Self {
            trusted_proxy_depth,
        }
    }

    pub fn trusted_proxy_depth(&self) -> usize {
        self.trusted_proxy_depth
    }

    /// 解析客户端标识
    ///
    /// 每一层代理都会把它看到的对端地址追加到 `X-Forwarded-For` 末尾，
    /// 因此有 n 层可信代理时，从右数第 n 项是最外层代理看到的客户端地址。
    /// 左侧更多的项由客户端自行填写，不可信。
    /// 头部项数不足 n 时回退到对端地址。
    pub fn resolve(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
        let peer_ip = peer.map(|addr| addr.ip().to_string());

        if self.trusted_proxy_depth == 0 {
            return peer_ip.unwrap_or_else(|| "unknown".to_string());
        }

        let forwarded: Vec<&str> = headers
            .get_all(FORWARDED_FOR_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();

        if forwarded.len() < self.trusted_proxy_depth {
            tracing::debug!(
                entries = forwarded.len(),
                depth = self.trusted_proxy_depth,
                "[IDENTITY] forwarded chain shorter than trusted depth, using peer address"
            );
            return peer_ip.unwrap_or_else(|| "unknown".to_string());
        }

        let candidate = forwarded[forwarded.len() - self.trusted_proxy_depth];
        match candidate.parse::<IpAddr>() {
            Ok(ip) => ip.to_string(),
            Err(_) => {
                tracing::debug!(
                    candidate = %candidate,
                    "[IDENTITY] forwarded entry is not an IP address, using peer address"
                );
                peer_ip.unwrap_or_else(|| "unknown".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:51234".parse().unwrap())
    }

    fn headers(xff: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_str(xff).unwrap());
        headers
    }

    #[test]
    fn test_depth_zero_ignores_forwarded_header() {
        let resolver = ClientIdentityResolver::new(0);
        assert_eq!(resolver.resolve(peer(), &headers("203.0.113.5")), "192.0.2.10");
        assert_eq!(resolver.resolve(None, &HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_single_proxy_uses_rightmost_entry() {
        let resolver = ClientIdentityResolver::new(1);
        assert_eq!(resolver.resolve(peer(), &headers("203.0.113.5")), "203.0.113.5");
        // 客户端伪造的左侧项被忽略
        assert_eq!(
            resolver.resolve(peer(), &headers("6.6.6.6, 203.0.113.5")),
            "203.0.113.5"
        );
    }

    #[test]
    fn test_two_proxies() {
        let resolver = ClientIdentityResolver::new(2);
        assert_eq!(
            resolver.resolve(peer(), &headers("1.1.1.1, 203.0.113.5, 10.0.0.2")),
            "203.0.113.5"
        );
    }

    #[test]
    fn test_short_chain_falls_back_to_peer() {
        let resolver = ClientIdentityResolver::new(2);
        assert_eq!(resolver.resolve(peer(), &headers("203.0.113.5")), "192.0.2.10");
        assert_eq!(resolver.resolve(peer(), &HeaderMap::new()), "192.0.2.10");
    }

    #[test]
    fn test_garbage_entry_falls_back_to_peer() {
        let resolver = ClientIdentityResolver::new(1);
        assert_eq!(resolver.resolve(peer(), &headers("not-an-ip")), "192.0.2.10");
    }
}

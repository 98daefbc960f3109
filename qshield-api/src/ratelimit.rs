//! In-memory token-bucket rate limiting per (client IP, operation class).
//!
//! State is process-local and resets on restart; the limiter protects against
//! accidental hammering, not distributed abuse.

use crate::response;
use crate::state::Shared;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;
use tokio::sync::Mutex;

/// Coarse operation classes with separate budgets. Auth probes get the
/// tightest bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpClass {
    Auth,
    Mutate,
    Read,
}

impl OpClass {
    pub fn classify(path: &str, method: &Method) -> Self {
        if path.starts_with("/api/auth/") {
            OpClass::Auth
        } else if matches!(*method, Method::POST | Method::PUT | Method::DELETE) {
            OpClass::Mutate
        } else {
            OpClass::Read
        }
    }
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<(IpAddr, OpClass), TokenBucket>>,
    rps: f64,
    burst: u32,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps,
            burst,
        }
    }

    /// Per-class budget derived from the base rate.
    fn limits(&self, class: OpClass) -> (f64, f64) {
        match class {
            OpClass::Auth => (self.rps / 4.0, (self.burst / 4).max(1) as f64),
            OpClass::Mutate => (self.rps / 2.0, (self.burst / 2).max(1) as f64),
            OpClass::Read => (self.rps, self.burst as f64),
        }
    }

    pub async fn check(&self, ip: IpAddr, class: OpClass) -> bool {
        let (rps, burst) = self.limits(class);
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets.entry((ip, class)).or_insert(TokenBucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rps).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for five minutes.
    pub async fn cleanup(&self) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill).as_secs() < 300);
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Shared>,
    addr: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" {
        return next.run(req).await;
    }

    // Test harnesses drive the router without a socket; fall back to loopback.
    let ip = addr
        .map(|ConnectInfo(a)| a.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let class = OpClass::classify(path, req.method());

    if !state.rate_limiter.check(ip, class).await {
        tracing::warn!(ip = %ip, path = %path, class = ?class, "rate limit exceeded");
        return (
            [(header::RETRY_AFTER, "1")],
            response::fail(
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "rate limit exceeded",
            ),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buckets_exhaust_and_refill() {
        let limiter = RateLimiter::new(10.0, 4);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut granted = 0;
        for _ in 0..10 {
            if limiter.check(ip, OpClass::Read).await {
                granted += 1;
            }
        }
        assert_eq!(granted, 4);

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert!(limiter.check(ip, OpClass::Read).await);
    }

    #[tokio::test]
    async fn classes_have_independent_buckets() {
        let limiter = RateLimiter::new(10.0, 4);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..4 {
            assert!(limiter.check(ip, OpClass::Read).await);
        }
        assert!(!limiter.check(ip, OpClass::Read).await);
        // The auth bucket is untouched, if smaller.
        assert!(limiter.check(ip, OpClass::Auth).await);
    }

    #[test]
    fn classification_by_path_and_method() {
        assert_eq!(OpClass::classify("/api/auth/login", &Method::POST), OpClass::Auth);
        assert_eq!(OpClass::classify("/api/keys", &Method::POST), OpClass::Mutate);
        assert_eq!(OpClass::classify("/api/keys", &Method::GET), OpClass::Read);
        assert_eq!(OpClass::classify("/api/config", &Method::PUT), OpClass::Mutate);
    }
}

//! Per-IP rate limiting.
//!
//! Token bucket per client IP with a periodic cleanup task. The bucket map
//! is process-local: behind a load balancer each instance enforces its own
//! budget.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, warn};

use super::errors::ApiError;
use super::handlers::AppState;
use super::middleware::RequestId;

/// Rate limiter using token bucket algorithm
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: SystemTime,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration) -> Self {
        let refill_rate = capacity as f64 / window.as_secs_f64().max(1.0);
        Self {
            tokens: capacity as f64,
            last_refill: SystemTime::now(),
            capacity: capacity as f64,
            refill_rate,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = SystemTime::now();
        let elapsed = now
            .duration_since(self.last_refill)
            .unwrap_or_default()
            .as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn is_full(&mut self) -> bool {
        self.refill();
        self.tokens >= self.capacity
    }
}

/// Per-IP request limiter.
pub struct RateLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    buckets: DashMap<IpAddr, TokenBucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_requests: u32, window: Duration) -> Self {
        Self {
            enabled,
            max_requests,
            window,
            buckets: DashMap::new(),
        }
    }

    /// True if the request fits in the client's budget.
    pub fn check(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        self.buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(self.max_requests, self.window))
            .try_consume()
    }

    /// Drop buckets that have refilled completely; an idle client costs
    /// nothing.
    pub fn cleanup(&self) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_full());
        before - self.buckets.len()
    }

    /// Start cleanup task for idle buckets
    pub fn start_cleanup_task(limiter: Arc<RateLimiter>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!("Rate limiter cleanup dropped {} idle buckets", removed);
                }
            }
        });
    }
}

/// Axum middleware enforcing the per-IP budget before the handler runs.
/// Rejections carry the same structured error body as handler failures.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(request.headers(), Some(addr));

    if !state.rate_limiter.check(client_ip) {
        warn!("Rate limit exceeded for {}", client_ip);
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        return ApiError::rate_limited(request_id).into_response();
    }

    next.run(request).await
}

/// Extract client IP from request, handling proxies
pub fn extract_client_ip(headers: &HeaderMap, connect_info: Option<std::net::SocketAddr>) -> IpAddr {
    // X-Forwarded-For from a load balancer/proxy
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    // X-Real-IP from Nginx
    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(real_ip_str) = real_ip.to_str() {
            if let Ok(ip) = real_ip_str.parse::<IpAddr>() {
                return ip;
            }
        }
    }

    connect_info
        .map(|addr| addr.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

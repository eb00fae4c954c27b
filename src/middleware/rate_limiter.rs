//! Fixed-window rate limiting for the credential endpoints
//!
//! Counters are keyed by `<caller-address>:<path>` and live only in this
//! process; limits are not shared across instances.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::ApiError;

/// Window length in seconds
pub const WINDOW_SECONDS: i64 = 60;

/// Key count above which stale windows are swept
pub const SWEEP_THRESHOLD: usize = 2_000;

/// Windows that started longer ago than this are dropped by a sweep
pub const RETENTION_SECONDS: i64 = 5 * 60;

/// Counter for one key
#[derive(Debug, Clone)]
struct RateWindow {
    window_start: DateTime<Utc>,
    count: u32,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Rate limiter state
///
/// Cloning is cheap; clones share the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Arc<Mutex<RateWindow>>>>,
    max_per_window: u32,
    trust_proxy_headers: bool,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter allowing `max_per_window` requests per minute per key
    pub fn new(max_per_window: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_per_window,
            trust_proxy_headers: false,
            clock,
        }
    }

    /// Prefer `X-Forwarded-For` / `X-Real-IP` over the socket peer address
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Check if a request is allowed
    pub fn allow(&self, key: &str) -> bool {
        self.check(key) == RateDecision::Allowed
    }

    /// Count a request against `key`
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();

        // Clone the handle out so the map shard is not held while counting.
        let window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RateWindow {
                    window_start: now,
                    count: 0,
                }))
            })
            .clone();

        let decision = {
            let mut window = window.lock();

            if now - window.window_start >= Duration::seconds(WINDOW_SECONDS) {
                window.window_start = now;
                window.count = 0;
            }

            if window.count >= self.max_per_window {
                let elapsed = (now - window.window_start).num_seconds();
                let remaining = (WINDOW_SECONDS - elapsed).clamp(1, WINDOW_SECONDS);
                RateDecision::Limited {
                    retry_after_secs: remaining as u64,
                }
            } else {
                window.count += 1;
                RateDecision::Allowed
            }
        };

        if decision == RateDecision::Allowed {
            self.sweep_if_needed(now);
        }

        decision
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop stale windows once the map grows past the threshold
    fn sweep_if_needed(&self, now: DateTime<Utc>) {
        if self.windows.len() < SWEEP_THRESHOLD {
            return;
        }

        let horizon = Duration::seconds(RETENTION_SECONDS);
        let before = self.windows.len();
        // try_lock: a window that is busy right now is by definition not stale.
        self.windows.retain(|_, window| match window.try_lock() {
            Some(window) => now - window.window_start <= horizon,
            None => true,
        });

        tracing::debug!(
            before = before,
            after = self.windows.len(),
            "Swept stale rate limit windows"
        );
    }

    fn client_address(&self, request: &Request) -> String {
        if self.trust_proxy_headers {
            if let Some(ip) = forwarded_client_ip(request) {
                return ip;
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Rate limiting middleware for the register and login routes
pub async fn auth_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let client = limiter.client_address(&request);
    let key = format!("{}:{}", client, path);

    if let RateDecision::Limited { retry_after_secs } = limiter.check(&key) {
        tracing::warn!(client = %client, path = %path, "Rate limit exceeded");
        return ApiError::TooManyRequests {
            message: "Too many authentication attempts. Please retry in a minute.".to_string(),
            retry_after_secs,
        }
        .into_response();
    }

    next.run(request).await
}

/// Extract client IP from proxy headers
fn forwarded_client_ip(request: &Request) -> Option<String> {
    // Try X-Forwarded-For first
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(ip) = s.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    // Try X-Real-IP
    request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RateLimiter::new(max, clock.clone()), clock)
    }

    #[test]
    fn test_rate_limiter() {
        let (limiter, _) = limiter(5);

        for _ in 0..5 {
            assert!(limiter.allow("10.0.0.1:/auth/login"));
        }

        assert_eq!(
            limiter.check("10.0.0.1:/auth/login"),
            RateDecision::Limited {
                retry_after_secs: 60
            }
        );
    }

    #[test]
    fn test_window_resets_after_sixty_seconds() {
        let (limiter, clock) = limiter(5);
        let key = "10.0.0.1:/auth/login";

        for _ in 0..5 {
            assert!(limiter.allow(key));
        }

        clock.advance(45);
        assert_eq!(
            limiter.check(key),
            RateDecision::Limited {
                retry_after_secs: 15
            }
        );

        clock.advance(15);
        assert!(limiter.allow(key));
    }

    #[test]
    fn test_rejected_requests_do_not_extend_window() {
        let (limiter, clock) = limiter(1);
        let key = "10.0.0.1:/auth/register";

        assert!(limiter.allow(key));
        for _ in 0..10 {
            clock.advance(5);
            assert!(!limiter.allow(key));
        }
        clock.advance(10);
        assert!(limiter.allow(key));
    }

    #[test]
    fn test_rate_limiter_different_clients() {
        let (limiter, _) = limiter(1);

        // Different keys have separate windows
        assert!(limiter.allow("10.0.0.1:/auth/login"));
        assert!(limiter.allow("10.0.0.2:/auth/login"));
        assert!(limiter.allow("10.0.0.1:/auth/register"));
        assert!(!limiter.allow("10.0.0.1:/auth/login"));
    }

    #[test]
    fn test_sweep_drops_stale_windows() {
        let (limiter, clock) = limiter(5);

        for i in 0..SWEEP_THRESHOLD - 1 {
            limiter.allow(&format!("stale-{}:/auth/login", i));
        }
        assert_eq!(limiter.tracked_keys(), SWEEP_THRESHOLD - 1);

        clock.advance(RETENTION_SECONDS + 1);
        limiter.allow("fresh:/auth/login");

        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.allow("fresh:/auth/login"));
    }

    #[test]
    fn test_forwarded_client_ip() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(forwarded_client_ip(&request).as_deref(), Some("203.0.113.7"));

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.4")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(forwarded_client_ip(&request).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_client_address_ignores_proxy_headers_by_default() {
        let (limiter, _) = limiter(5);
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(limiter.client_address(&request), "unknown");

        let limiter = limiter.trust_proxy_headers(true);
        assert_eq!(limiter.client_address(&request), "203.0.113.7");
    }
}

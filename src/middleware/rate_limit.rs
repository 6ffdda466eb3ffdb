use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::response::AppError;
use crate::state::AppState;

/// Form endpoints that accept a password or trigger mail.
const AUTH_PATHS: &[&str] = &["/login", "/register", "/account/passwordreset"];

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u64,
    window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window_secs: u64,
    max_requests: u64,
    entries: Arc<Mutex<HashMap<IpAddr, WindowEntry>>>,
}

#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
    pub retry_after: u64,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        let now = Instant::now();
        let mut map = self.entries.lock().await;

        let entry = map.entry(ip).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start).as_secs() >= self.window_secs {
            entry.count = 0;
            entry.window_start = now;
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        let remaining = self.max_requests.saturating_sub(entry.count);
        let elapsed = now.duration_since(entry.window_start).as_secs();
        let reset_after = self.window_secs.saturating_sub(elapsed);
        let reset_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + reset_after;

        RateLimitResult {
            allowed,
            limit: self.max_requests,
            remaining,
            reset_at,
            retry_after: reset_after.max(1),
        }
    }

    /// Drops windows that ended more than one window ago. Returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        let before = map.len();
        map.retain(|_, value| {
            now.duration_since(value.window_start).as_secs() <= self.window_secs * 2
        });
        before - map.len()
    }

    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[derive(Debug, Clone)]
pub struct AuthRateLimitState {
    pub limiter: RateLimiter,
}

impl AuthRateLimitState {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            limiter: RateLimiter::new(window_secs, max_requests),
        }
    }
}

pub async fn auth_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !is_auth_submission(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(req.headers(), peer, state.config().trust_proxy);
    let result = state.auth_rate_limit().limiter.check(ip).await;

    if !result.allowed {
        tracing::warn!(%ip, path = %req.uri().path(), "Auth rate limit exceeded");
        let mut response =
            AppError::too_many_requests("Too many requests, please try again later")
                .into_response();
        apply_rate_limit_headers(&mut response, &result);
        if let Ok(v) = result.retry_after.to_string().parse() {
            response.headers_mut().insert("retry-after", v);
        }
        return response;
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(&mut response, &result);
    response
}

fn is_auth_submission(method: &Method, path: &str) -> bool {
    method == Method::POST && AUTH_PATHS.contains(&path.trim_end_matches('/'))
}

fn apply_rate_limit_headers(response: &mut Response, result: &RateLimitResult) {
    if let Ok(v) = result.limit.to_string().parse() {
        response.headers_mut().insert("ratelimit-limit", v);
    }
    if let Ok(v) = result.remaining.to_string().parse() {
        response.headers_mut().insert("ratelimit-remaining", v);
    }
    if let Ok(v) = result.reset_at.to_string().parse() {
        response.headers_mut().insert("ratelimit-reset", v);
    }
}

/// Client address from proxy headers, `X-Forwarded-For` then `X-Real-IP`.
/// Both are ignored unless the proxy is trusted.
pub fn extract_client_ip(headers: &HeaderMap, trust_proxy: bool) -> Option<IpAddr> {
    if !trust_proxy {
        return None;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    })
}

/// Proxy headers first, then the socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    extract_client_ip(headers, trust_proxy)
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[tokio::test]
    async fn within_limit_is_allowed() {
        let limiter = RateLimiter::new(60, 2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.check(ip).await.allowed);
        assert!(limiter.check(ip).await.allowed);
        let blocked = limiter.check(ip).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert!(blocked.retry_after >= 1);
    }

    #[tokio::test]
    async fn windows_are_per_ip() {
        let limiter = RateLimiter::new(60, 1);
        assert!(limiter.check("10.0.0.1".parse().unwrap()).await.allowed);
        assert!(limiter.check("10.0.0.2".parse().unwrap()).await.allowed);
        assert!(!limiter.check("10.0.0.1".parse().unwrap()).await.allowed);
    }

    #[tokio::test]
    async fn cleanup_keeps_fresh_windows() {
        let limiter = RateLimiter::new(60, 5);
        limiter.check(IpAddr::V4(Ipv4Addr::LOCALHOST)).await;
        assert_eq!(limiter.cleanup().await, 0);
        assert_eq!(limiter.tracked().await, 1);
    }

    #[test]
    fn extract_ip_fallbacks() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, false), None);
        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer), false), peer);
        assert_eq!(
            client_ip(&headers, None, false),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn forwarded_for_needs_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.3"));

        assert_eq!(
            extract_client_ip(&headers, true),
            Some("203.0.113.9".parse().unwrap())
        );
        assert_eq!(extract_client_ip(&headers, false), None);

        headers.remove("x-forwarded-for");
        assert_eq!(
            extract_client_ip(&headers, true),
            Some("198.51.100.3".parse().unwrap())
        );
        assert_eq!(extract_client_ip(&headers, false), None);

        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer), false), peer);
    }

    #[test]
    fn only_auth_posts_are_limited() {
        assert!(is_auth_submission(&Method::POST, "/login"));
        assert!(is_auth_submission(&Method::POST, "/account/passwordreset/"));
        assert!(!is_auth_submission(&Method::GET, "/login"));
        assert!(!is_auth_submission(&Method::POST, "/account/edit"));
    }
}

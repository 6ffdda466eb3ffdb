use crate::middleware::rate_limit::AuthRateLimitState;

/// 丢弃过期的限流窗口
pub async fn run(state: &AuthRateLimitState) {
    let dropped = state.limiter.cleanup().await;
    if dropped > 0 {
        tracing::debug!(dropped, "rate_limit_cleanup: done");
    }
}

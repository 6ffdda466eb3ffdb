use crate::store::Store;

/// 清理过期的密码重置记录
pub async fn run(store: &Store) {
    tracing::debug!("password_reset_cleanup: start");
    match store.cleanup_expired_password_resets(chrono::Utc::now()) {
        Ok(count) => {
            if count > 0 {
                tracing::info!(cleaned = count, "password_reset_cleanup: done");
            }
        }
        Err(e) => tracing::error!(error=%e, "password_reset_cleanup failed"),
    }
}

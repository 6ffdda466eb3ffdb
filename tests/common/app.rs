use std::sync::Arc;

use axum::Router;
use regex::{Regex, RegexBuilder};
use tempfile::TempDir;
use tokio::sync::broadcast;

use streamchat_web::config::{
    Config, HttpConfig, HttpsConfig, MailConfig, RateLimitConfig, ReservedNames, WorkerConfig,
};
use streamchat_web::routes::build_router;
use streamchat_web::services::channel_hub::ChannelHub;
use streamchat_web::services::mailer::{Mailer, RecordingMailer};
use streamchat_web::state::AppState;
use streamchat_web::store::Store;

pub const ROOT_DOMAIN: &str = "localhost";
pub const ALT_DOMAIN: &str = "alt.test";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub mailer: Option<Arc<RecordingMailer>>,
    _temp_dir: TempDir,
}

fn reserved(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("reserved pattern")
}

fn test_config(temp_dir: &TempDir, auth_limit: u64, mail_enabled: bool) -> Config {
    let sled_path = temp_dir.path().join("streamchat-test.sled");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 8080,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        session_secret: format!("integration-test-session-secret-{}", uuid::Uuid::new_v4()),
        session_days: 7,
        cookie_secret: format!("integration-test-cookie-secret-{}", uuid::Uuid::new_v4()),
        trust_proxy: false,
        http: HttpConfig {
            domain: "http://localhost:8080".to_string(),
            full_address: "http://localhost:8080".to_string(),
            root_domain: ROOT_DOMAIN.to_string(),
            root_domain_dotted: format!(".{ROOT_DOMAIN}"),
            alt_domains: vec![ALT_DOMAIN.to_string()],
        },
        https: HttpsConfig {
            enabled: false,
            full_address: "https://localhost:8443".to_string(),
        },
        reserved_names: ReservedNames {
            usernames: reserved("^(admin|administrator|server|system|anonymous)$"),
            channels: reserved("^(admin|api|static|account)$"),
        },
        max_channels_per_user: 2,
        auth_rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: auth_limit,
        },
        mail: MailConfig {
            enabled: mail_enabled,
            from_name: "streamchat".to_string(),
            from_address: "noreply@localhost".to_string(),
            api_url: String::new(),
            api_key: String::new(),
        },
        worker: WorkerConfig { is_leader: false },
    }
}

async fn spawn(auth_limit: u64, mailer: Option<RecordingMailer>, tweak: impl FnOnce(&mut Config)) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&temp_dir, auth_limit, mailer.is_some());
    tweak(&mut config);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let mailer = mailer.map(Arc::new);
    let dyn_mailer = mailer.clone().map(|m| m as Arc<dyn Mailer>);
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(
        store,
        Arc::new(ChannelHub::new()),
        dyn_mailer,
        &config,
        shutdown_tx,
    );
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        mailer,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn(1000, Some(RecordingMailer::new()), |_| {}).await
}

pub async fn spawn_test_app_without_mail() -> TestApp {
    spawn(1000, None, |_| {}).await
}

pub async fn spawn_test_app_with_failing_mail() -> TestApp {
    spawn(1000, Some(RecordingMailer::failing()), |_| {}).await
}

pub async fn spawn_test_app_with_auth_limit(auth_limit: u64) -> TestApp {
    spawn(auth_limit, Some(RecordingMailer::new()), |_| {}).await
}

pub async fn spawn_test_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    spawn(1000, Some(RecordingMailer::new()), tweak).await
}

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Target for account and channel audit events.
pub const EVENT_LOG: &str = "eventlog";
/// Target for operational failures worth an operator's attention.
pub const ERROR_LOG: &str = "errlog";
/// Target for deployment warnings.
pub const SYS_LOG: &str = "syslog";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let registry = Registry::default().with(stdout_layer.with_filter(env_filter));

    if config.enable_file_logs {
        let file_appender = rolling_appender(&config.log_dir, "streamchat");
        let events_appender = rolling_appender(&config.log_dir, "events");

        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new(&config.log_level));
        let events_layer = fmt::layer()
            .with_writer(events_appender)
            .with_ansi(false)
            .with_target(false)
            .with_filter(Targets::new().with_target(EVENT_LOG, tracing::Level::INFO));

        // 已设置全局 subscriber 时（如测试环境）忽略错误
        if let Err(e) = registry.with(file_layer).with(events_layer).try_init() {
            let msg = e.to_string();
            if !msg.contains("already been set") {
                panic!("Failed to initialize tracing with file logs: {e}");
            }
        }
    } else if let Err(e) = registry.try_init() {
        let msg = e.to_string();
        if !msg.contains("already been set") {
            panic!("Failed to initialize tracing: {e}");
        }
    }
}

fn rolling_appender(dir: &str, prefix: &str) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(30)
        .build(dir)
        .expect("Failed to create rolling file appender")
}

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

use regex::{Regex, RegexBuilder};

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub session_secret: String,
    pub session_days: u64,
    pub cookie_secret: String,
    pub trust_proxy: bool,
    pub http: HttpConfig,
    pub https: HttpsConfig,
    pub reserved_names: ReservedNames,
    pub max_channels_per_user: usize,
    pub auth_rate_limit: RateLimitConfig,
    pub mail: MailConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Public site address used in mail bodies, e.g. `http://localhost:8080`.
    pub domain: String,
    pub full_address: String,
    pub root_domain: String,
    pub root_domain_dotted: String,
    pub alt_domains: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpsConfig {
    pub enabled: bool,
    pub full_address: String,
}

#[derive(Debug, Clone)]
pub struct ReservedNames {
    pub usernames: Regex,
    pub channels: Regex,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 20,
        }
    }
}

#[derive(Clone)]
pub struct MailConfig {
    pub enabled: bool,
    pub from_name: String,
    pub from_address: String,
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("session_secret", &"***REDACTED***")
            .field("session_days", &self.session_days)
            .field("cookie_secret", &"***REDACTED***")
            .field("trust_proxy", &self.trust_proxy)
            .field("http", &self.http)
            .field("https", &self.https)
            .field("reserved_names", &self.reserved_names)
            .field("max_channels_per_user", &self.max_channels_per_user)
            .field("auth_rate_limit", &self.auth_rate_limit)
            .field("mail", &self.mail)
            .field("worker", &self.worker)
            .finish()
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("enabled", &self.enabled)
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .finish()
    }
}

const DEFAULT_RESERVED_USERNAMES: &str = "^(admin|administrator|server|system|anonymous)$";
const DEFAULT_RESERVED_CHANNELS: &str = "^(admin|api|static|account)$";

impl Config {
    pub fn from_env() -> Self {
        let root_domain = env_or("HTTP_ROOT_DOMAIN", "localhost");
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8080_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/streamchat.sled"),
            session_secret: env_or(
                "SESSION_SECRET",
                "change_me_to_random_64_chars_change_me_to_random_64_chars",
            ),
            session_days: env_or_parse("SESSION_DAYS", 7_u64),
            cookie_secret: env_or(
                "COOKIE_SECRET",
                "change_me_to_another_random_64_chars_change_me_to_another",
            ),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
            http: HttpConfig {
                domain: env_or("HTTP_DOMAIN", "http://localhost:8080"),
                full_address: env_or("HTTP_FULL_ADDRESS", "http://localhost:8080"),
                root_domain_dotted: format!(".{root_domain}"),
                root_domain,
                alt_domains: env_or_list("HTTP_ALT_DOMAINS"),
            },
            https: HttpsConfig {
                enabled: env_or_bool("HTTPS_ENABLED", false),
                full_address: env_or("HTTPS_FULL_ADDRESS", "https://localhost:8443"),
            },
            reserved_names: ReservedNames {
                usernames: env_or_regex("RESERVED_USERNAMES", DEFAULT_RESERVED_USERNAMES),
                channels: env_or_regex("RESERVED_CHANNELS", DEFAULT_RESERVED_CHANNELS),
            },
            max_channels_per_user: env_or_parse("MAX_CHANNELS_PER_USER", 5_usize),
            auth_rate_limit: RateLimitConfig {
                window_secs: env_or_parse("AUTH_RATE_LIMIT_WINDOW_SECS", 60_u64),
                max_requests: env_or_parse("AUTH_RATE_LIMIT_MAX", 20_u64),
            },
            mail: MailConfig {
                enabled: env_or_bool("MAIL_ENABLED", false),
                from_name: env_or("MAIL_FROM_NAME", "streamchat"),
                from_address: env_or("MAIL_FROM_ADDRESS", "noreply@localhost"),
                api_url: env_or("MAIL_API_URL", ""),
                api_key: env_or("MAIL_API_KEY", ""),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
            },
        }
    }

    /// Address the site is reachable at, preferring HTTPS when it is enabled.
    pub fn public_address(&self) -> &str {
        if self.https.enabled {
            &self.https.full_address
        } else {
            &self.http.full_address
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

pub fn env_or_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn env_or_regex(key: &str, default: &str) -> Regex {
    if let Ok(raw) = env::var(key) {
        match case_insensitive(&raw) {
            Ok(re) => return re,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "Invalid regex in env var, using default");
            }
        }
    }
    case_insensitive(default).expect("default reserved-name pattern is valid")
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

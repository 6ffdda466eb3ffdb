use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// `Name <address>` form.
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail network error: {0}")]
    Network(String),
    #[error("mail api error: status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("mail rejected: {0}")]
    Rejected(String),
}

#[axum::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

#[derive(Debug, Clone, Serialize)]
struct ApiAddress {
    email: String,
    name: String,
}

#[derive(Debug, Clone, Serialize)]
struct ApiPersonalization {
    to: Vec<ApiAddress>,
}

#[derive(Debug, Clone, Serialize)]
struct ApiContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    personalizations: Vec<ApiPersonalization>,
    from: ApiAddress,
    subject: String,
    content: Vec<ApiContent>,
}

/// Splits `Name <address>`; a bare address doubles as its own name.
fn parse_address(raw: &str) -> ApiAddress {
    let trimmed = raw.trim();
    match (trimmed.find('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => ApiAddress {
            name: trimmed[..start].trim().to_string(),
            email: trimmed[start + 1..end].trim().to_string(),
        },
        _ => ApiAddress {
            email: trimmed.to_string(),
            name: trimmed.to_string(),
        },
    }
}

/// Sends plain-text mail through a transactional-mail HTTP API.
pub struct HttpMailer {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            client,
        }
    }
}

#[axum::async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let request = ApiRequest {
            personalizations: vec![ApiPersonalization {
                to: vec![parse_address(&message.to)],
            }],
            from: parse_address(&message.from),
            subject: message.subject,
            content: vec![ApiContent {
                content_type: "text/plain",
                value: message.text,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(MailError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Keeps sent messages in memory. Used by tests and local development.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[axum::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Rejected("recording mailer set to fail".into()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Rejected("recording mailer poisoned".into()))?;
        sent.push(message);
        Ok(())
    }
}

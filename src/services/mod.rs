pub mod channel_hub;
pub mod mailer;

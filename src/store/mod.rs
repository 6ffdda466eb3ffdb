pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub channels: sled::Tree,
    pub password_resets: sled::Tree,
    pub profiles: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    /// Text safe to show on a rendered page.
    ///
    /// Storage-level failures are logged here and replaced by a generic
    /// message so internal details never reach the browser.
    pub fn public_message(&self) -> String {
        match self {
            StoreError::Validation(msg) => msg.clone(),
            StoreError::NotFound { entity, .. } => match entity.as_str() {
                "user" => "User does not exist".to_string(),
                "channel" => "Channel does not exist".to_string(),
                "password_reset" => "Invalid password reset link".to_string(),
                _ => "Not found".to_string(),
            },
            StoreError::Conflict { entity, key } => match entity.as_str() {
                "user" => format!("The username {key} is already taken"),
                "channel" => "Channel name is already taken".to_string(),
                _ => "Already exists".to_string(),
            },
            other => {
                tracing::error!(error = %other, "Store operation failed");
                "Database error.  Please contact an administrator if this persists.".to_string()
            }
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let channels = db.open_tree(trees::CHANNELS)?;
        let password_resets = db.open_tree(trees::PASSWORD_RESETS)?;
        let profiles = db.open_tree(trees::PROFILES)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            users,
            channels,
            password_resets,
            profiles,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn transaction_error(e: sled::transaction::TransactionError<()>) -> StoreError {
    match e {
        sled::transaction::TransactionError::Abort(()) => {
            StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
        }
        sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_messages_hide_storage_errors() {
        let err = StoreError::Sled(sled::Error::Unsupported("disk on fire".into()));
        let msg = err.public_message();
        assert!(!msg.contains("disk on fire"));
        assert!(msg.starts_with("Database error"));
    }

    #[test]
    fn public_messages_for_domain_errors() {
        let missing = StoreError::NotFound {
            entity: "channel".into(),
            key: "lobby".into(),
        };
        assert_eq!(missing.public_message(), "Channel does not exist");

        let taken = StoreError::Conflict {
            entity: "user".into(),
            key: "Calvin".into(),
        };
        assert_eq!(taken.public_message(), "The username Calvin is already taken");
    }
}

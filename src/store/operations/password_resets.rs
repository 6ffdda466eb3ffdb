use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{transaction_error, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub ip: String,
    pub name: String,
    pub email: String,
    pub hash: String,
    pub expire: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire
    }
}

/// Reset hashes are 64 hex characters; anything else cannot name a reset
/// and never reaches the tree, where the `name:` index rows also live.
pub fn is_reset_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

fn reset_not_found(hash: &str) -> StoreError {
    StoreError::NotFound {
        entity: "password_reset".to_string(),
        key: hash.to_string(),
    }
}

impl Store {
    /// Stores `reset`, replacing any reset still pending for the same user.
    pub fn add_password_reset(&self, reset: &PasswordReset) -> Result<(), StoreError> {
        if !is_reset_hash(&reset.hash) {
            return Err(StoreError::Validation("Invalid password reset hash".to_string()));
        }
        let key = keys::password_reset_key(&reset.hash);
        let index_key = keys::password_reset_name_index_key(&reset.name);
        let bytes = Self::serialize(reset)?;
        let hash = reset.hash.clone();

        self.password_resets
            .transaction(move |tx| {
                if let Some(previous) = tx.insert(index_key.as_bytes(), hash.as_bytes())? {
                    if previous.as_ref() != hash.as_bytes() {
                        tx.remove(previous)?;
                    }
                }
                tx.insert(key.as_bytes(), bytes.as_slice())?;
                Ok(())
            })
            .map_err(transaction_error)?;

        Ok(())
    }

    pub fn lookup_password_reset(&self, hash: &str) -> Result<PasswordReset, StoreError> {
        if !is_reset_hash(hash) {
            return Err(reset_not_found(hash));
        }
        let key = keys::password_reset_key(hash);
        match self.password_resets.get(key.as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(reset_not_found(hash)),
        }
    }

    pub fn delete_password_reset(&self, hash: &str) -> Result<(), StoreError> {
        if !is_reset_hash(hash) {
            return Ok(());
        }
        let key = keys::password_reset_key(hash);
        let hash = hash.to_string();

        self.password_resets
            .transaction(move |tx| {
                let Some(raw) = tx.remove(key.as_bytes())? else {
                    return Ok(());
                };
                if let Ok(reset) = serde_json::from_slice::<PasswordReset>(&raw) {
                    let index_key = keys::password_reset_name_index_key(&reset.name);
                    // 仅当索引仍指向本条记录时才删除
                    if tx.get(index_key.as_bytes())?.as_deref() == Some(hash.as_bytes()) {
                        tx.remove(index_key.as_bytes())?;
                    }
                }
                Ok(())
            })
            .map_err(transaction_error)?;

        Ok(())
    }

    /// Removes resets whose expiry has passed. Returns how many were removed.
    pub fn cleanup_expired_password_resets(&self, now: DateTime<Utc>) -> Result<u32, StoreError> {
        let mut expired = Vec::new();
        for item in self.password_resets.iter() {
            let (k, v) = item?;
            if k.starts_with(keys::PASSWORD_RESET_INDEX_PREFIX.as_bytes()) {
                continue;
            }
            match Self::deserialize::<PasswordReset>(&v) {
                Ok(reset) if reset.is_expired(now) => expired.push(reset.hash),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable password reset"),
            }
        }

        let count = expired.len() as u32;
        for hash in expired {
            self.delete_password_reset(&hash)?;
        }
        Ok(count)
    }
}

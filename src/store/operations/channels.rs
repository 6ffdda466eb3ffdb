use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{transaction_error, Store, StoreError};
use crate::validation::is_valid_channel_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn list_user_channels(&self, owner: &str) -> Result<Vec<Channel>, StoreError> {
        let prefix = keys::channel_owner_index_prefix(owner);
        let mut channels = Vec::new();

        for item in self.channels.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let Some(name) = k
                .get(prefix.len()..)
                .and_then(|rest| std::str::from_utf8(rest).ok())
            else {
                tracing::warn!("Skipping channel owner index key with invalid UTF-8");
                continue;
            };
            match self.find_channel(name)? {
                Some(channel) => channels.push(channel),
                None => tracing::warn!(channel = name, owner, "Dangling channel owner index"),
            }
        }

        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    pub fn register_channel(&self, name: &str, owner: &str) -> Result<Channel, StoreError> {
        if !is_valid_channel_name(name) {
            return Err(StoreError::Validation(
                "Invalid channel name.  Channel names may consist of 1-30 characters a-z, \
                 A-Z, 0-9, -, and _"
                    .to_string(),
            ));
        }

        let channel = Channel {
            name: name.to_lowercase(),
            owner: owner.to_string(),
            created_at: Utc::now(),
        };

        let key = keys::channel_key(name);
        let index_key = keys::channel_owner_index_key(owner, name);
        let bytes = Self::serialize(&channel)?;

        let inserted = self
            .channels
            .transaction(move |tx| {
                if tx.get(key.as_bytes())?.is_some() {
                    return Ok(false);
                }
                tx.insert(key.as_bytes(), bytes.as_slice())?;
                tx.insert(index_key.as_bytes(), &[] as &[u8])?;
                Ok(true)
            })
            .map_err(transaction_error)?;

        if !inserted {
            return Err(StoreError::Conflict {
                entity: "channel".to_string(),
                key: name.to_string(),
            });
        }

        Ok(channel)
    }

    pub fn lookup_channel(&self, name: &str) -> Result<Channel, StoreError> {
        self.find_channel(name)?.ok_or_else(|| StoreError::NotFound {
            entity: "channel".to_string(),
            key: name.to_string(),
        })
    }

    /// Names outside the channel-name alphabet never reach the tree, so they
    /// cannot address the `owner:` index rows.
    pub fn find_channel(&self, name: &str) -> Result<Option<Channel>, StoreError> {
        if !is_valid_channel_name(name) {
            return Ok(None);
        }
        let key = keys::channel_key(name);
        match self.channels.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn drop_channel(&self, name: &str) -> Result<(), StoreError> {
        let channel = self.lookup_channel(name)?;
        let key = keys::channel_key(name);
        let index_key = keys::channel_owner_index_key(&channel.owner, &channel.name);

        self.channels
            .transaction(move |tx| {
                tx.remove(key.as_bytes())?;
                tx.remove(index_key.as_bytes())?;
                Ok(())
            })
            .map_err(transaction_error)?;

        Ok(())
    }
}

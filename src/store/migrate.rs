use crate::store::operations::channels::Channel;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_channel_owner_index", m002_channel_owner_index),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// Every migration must be idempotent: the process can stop after a
/// migration ran but before its version was persisted, and it is then run
/// again on the next start. Versions only move forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().unwrap_or([0; 4]);
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the `owner:` index from the channel records.
fn m002_channel_owner_index(store: &Store) -> Result<(), StoreError> {
    for item in store.channels.iter() {
        let (key, value) = item?;
        if key.starts_with(keys::CHANNEL_INDEX_PREFIX.as_bytes()) {
            continue;
        }
        let channel: Channel = Store::deserialize(&value)?;
        let index_key = keys::channel_owner_index_key(&channel.owner, &channel.name);
        store.channels.insert(index_key.as_bytes(), &[] as &[u8])?;
    }

    Ok(())
}

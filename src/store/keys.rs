//! Key layout. User and channel names are case-insensitive, so every key
//! built from a name uses its lower-cased form.

pub fn user_key(name: &str) -> String {
    name.to_lowercase()
}

pub fn channel_key(name: &str) -> String {
    name.to_lowercase()
}

/// Secondary index entry `owner:{owner}:{channel}` with an empty value.
pub fn channel_owner_index_key(owner: &str, channel: &str) -> String {
    format!("owner:{}:{}", owner.to_lowercase(), channel.to_lowercase())
}

pub fn channel_owner_index_prefix(owner: &str) -> String {
    format!("owner:{}:", owner.to_lowercase())
}

pub const CHANNEL_INDEX_PREFIX: &str = "owner:";

pub fn password_reset_key(hash: &str) -> String {
    hash.to_string()
}

/// Points from a user to their single pending reset hash.
pub fn password_reset_name_index_key(name: &str) -> String {
    format!("name:{}", name.to_lowercase())
}

pub const PASSWORD_RESET_INDEX_PREFIX: &str = "name:";

pub fn profile_key(name: &str) -> String {
    name.to_lowercase()
}

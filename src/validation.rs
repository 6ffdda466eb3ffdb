//! 公共验证函数模块
//! Shared by the registration, account and persistence layers.

/// Longest password that is hashed; longer input is truncated.
pub const MAX_PASSWORD_CHARS: usize = 100;

/// Maximum stored length of a profile image URL and profile text.
pub const MAX_PROFILE_FIELD_CHARS: usize = 255;

/// 1-20 characters from `a-z A-Z 0-9 - _`.
pub fn is_valid_user_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=20).contains(&len) && name.chars().all(is_name_char)
}

/// 1-30 characters from `a-z A-Z 0-9 - _`.
pub fn is_valid_channel_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=30).contains(&len) && name.chars().all(is_name_char)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// 验证邮箱格式：user@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'+' || b == b'-')
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return false;
    }
    domain
        .split('.')
        .all(|part| !part.is_empty() && !part.starts_with('-') && !part.ends_with('-'))
}

/// Absolute `http` or `https` URL with a host.
pub fn is_http_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

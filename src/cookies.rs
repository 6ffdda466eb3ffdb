use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

use crate::response::AppError;

pub const AUTH_COOKIE: &str = "auth";
pub const RANK_COOKIE: &str = "rank";
pub const CSRF_COOKIE: &str = "csrf";

#[derive(Debug, Clone, Default)]
pub struct CookieOptions<'a> {
    pub domain: Option<&'a str>,
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    /// Adds `Secure` so the browser only sends the cookie over HTTPS.
    pub secure: bool,
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|part| part.trim().strip_prefix(&prefix).map(str::to_string))
        .filter(|value| !value.is_empty())
}

pub fn set_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    options: &CookieOptions<'_>,
) -> Result<(), AppError> {
    let mut cookie = format!("{name}={value}; Path=/; SameSite=Lax");
    if let Some(domain) = options.domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    if let Some(expires) = options.expires {
        cookie.push_str(&format!("; Expires={}", http_date(expires)));
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    append_set_cookie(headers, &cookie)
}

pub fn clear_cookie(
    headers: &mut HeaderMap,
    name: &str,
    domain: Option<&str>,
) -> Result<(), AppError> {
    let mut cookie = format!("{name}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    if let Some(domain) = domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    append_set_cookie(headers, &cookie)
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::internal(&format!("cookie header invalid: {e}")))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

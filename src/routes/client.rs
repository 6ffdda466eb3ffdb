//! Request helpers shared by the page handlers.

use axum::http::header::{HOST, REFERER};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use reqwest::Url;

use crate::config::Config;

/// Whether the request reached the proxy over HTTPS. Without a trusted
/// proxy the server only ever sees plain HTTP.
pub fn is_secure(headers: &HeaderMap, trust_proxy: bool) -> bool {
    trust_proxy
        && headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Permanent redirect to the HTTPS address for page requests made over
/// plain HTTP while HTTPS is enabled.
pub fn redirect_https(config: &Config, headers: &HeaderMap, uri: &Uri) -> Option<Response> {
    if !config.https.enabled || is_secure(headers, config.trust_proxy) {
        return None;
    }
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let target = format!("{}{}", config.https.full_address.trim_end_matches('/'), path);
    Some(Redirect::permanent(&target).into_response())
}

/// Host the request was addressed to, without the port.
pub fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn referer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

pub fn in_root_domain(host: &str, root_domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let root = root_domain.to_ascii_lowercase();
    host == root || host.ends_with(&format!(".{root}"))
}

fn is_auth_page(target: &str) -> bool {
    target.contains("login") || target.contains("logout")
}

/// Where a page should send the browser after a login or logout step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Same site: relative path or a host inside the root domain.
    Local(String),
    /// An approved alternate domain, which needs its own cookies.
    AltDomain { origin: String, target: String },
    /// Nothing usable; render the page instead.
    None,
}

/// Classifies a redirect candidate. Targets pointing at the login or
/// logout pages, unparsable URLs and hosts outside the approved set are
/// dropped; unapproved hosts are reported to the system log.
pub fn classify_redirect(config: &Config, candidate: &str) -> RedirectTarget {
    let candidate = candidate.trim();
    if candidate.is_empty() || is_auth_page(candidate) {
        return RedirectTarget::None;
    }

    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(_) => {
            // 仅接受站内相对路径，排除 `//host` 形式
            return if candidate.starts_with('/') && !candidate.starts_with("//") {
                RedirectTarget::Local(candidate.to_string())
            } else {
                RedirectTarget::None
            };
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return RedirectTarget::None;
    }
    let Some(host) = url.host_str() else {
        return RedirectTarget::None;
    };

    if in_root_domain(host, &config.http.root_domain) {
        return RedirectTarget::Local(candidate.to_string());
    }

    if config
        .http
        .alt_domains
        .iter()
        .any(|alt| alt.eq_ignore_ascii_case(host))
    {
        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        return RedirectTarget::AltDomain {
            origin,
            target: candidate.to_string(),
        };
    }

    tracing::warn!(
        target: crate::logging::SYS_LOG,
        host,
        "WARNING: Attempted login from non-approved domain {host}"
    );
    RedirectTarget::None
}

/// `{base}{path}?k=v&…` with the query properly encoded.
pub fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> Option<String> {
    let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), path)).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Some(url.to_string())
}

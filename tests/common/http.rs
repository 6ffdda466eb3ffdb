use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::util::ServiceExt;

/// `application/x-www-form-urlencoded` encoding of `fields`.
pub fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    form: Option<&[(&str, &str)]>,
    headers: &[(&str, String)],
) -> Response {
    let mut builder = Request::builder().method(method).uri(path);

    for (k, v) in headers {
        builder = builder.header(*k, v.as_str());
    }

    let req = if let Some(fields) = form {
        builder
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(fields)))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("empty body")
    };

    app.clone().oneshot(req).await.expect("oneshot response")
}

pub async fn response_text(resp: Response) -> (StatusCode, HeaderMap, String) {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body bytes");
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// 从 Set-Cookie header 中提取指定 cookie 的值（忽略清除 cookie 的空值）
pub fn cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    set_cookies(headers).into_iter().find_map(|s| {
        let rest = s.strip_prefix(&format!("{cookie_name}="))?;
        let val = rest.split(';').next().unwrap_or("");
        (!val.is_empty()).then(|| val.to_string())
    })
}

pub fn location(headers: &HeaderMap) -> String {
    headers
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn assert_page_ok(status: StatusCode, body: &str) {
    assert_eq!(status, StatusCode::OK, "unexpected status, body: {body}");
    assert!(body.contains("<html"), "not an html page: {body}");
}

mod common;

use axum::http::{Method, StatusCode};

use common::app::{spawn_test_app_with, spawn_test_app_with_auth_limit};
use common::auth::Browser;
use common::http::{request, response_text};

#[tokio::test]
async fn it_auth_rate_limit_blocks_after_max() {
    let app = spawn_test_app_with_auth_limit(2).await;
    let browser = Browser::anonymous(&app.config);

    for expected_remaining in ["1", "0"] {
        let (status, headers, _) = browser
            .post(&app.app, "/login", &[("name", "nobody"), ("password", "pw")])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("ratelimit-limit").unwrap(), "2");
        assert_eq!(headers.get("ratelimit-remaining").unwrap(), expected_remaining);
    }

    let (status, headers, body) = browser
        .post(&app.app, "/register", &[("name", "nobody"), ("password", "pw")])
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.get("retry-after").is_some());
    assert!(body.contains("Too many requests"));
}

#[tokio::test]
async fn it_rate_limit_only_covers_auth_submissions() {
    let app = spawn_test_app_with_auth_limit(1).await;
    let browser = Browser::anonymous(&app.config);

    let (status, _, _) = browser
        .post(&app.app, "/login", &[("name", "nobody"), ("password", "pw")])
        .await;
    assert_eq!(status, StatusCode::OK);

    for path in ["/login", "/register", "/account/passwordreset"] {
        let (status, headers, _) = browser.get(&app.app, path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(headers.get("ratelimit-limit").is_none());
    }

    let (status, _, _) = browser
        .post(&app.app, "/account/profile", &[("text", "hi")])
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = browser
        .post(
            &app.app,
            "/account/passwordreset",
            &[("name", "nobody"), ("email", "")],
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn it_rate_limit_keys_on_forwarded_ip_behind_trusted_proxy() {
    let app = spawn_test_app_with(|config| {
        config.trust_proxy = true;
        config.auth_rate_limit.max_requests = 1;
    })
    .await;
    let browser = Browser::anonymous(&app.config);
    let form_for = |ip: &str| {
        let mut headers = browser.headers();
        headers.push(("x-forwarded-for", ip.to_string()));
        headers
    };
    let fields: &[(&str, &str)] = &[
        ("_csrf", browser.csrf_token.as_str()),
        ("name", "nobody"),
        ("password", "pw"),
    ];

    let first = request(&app.app, Method::POST, "/login", Some(fields), &form_for("203.0.113.7")).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = request(&app.app, Method::POST, "/login", Some(fields), &form_for("203.0.113.7")).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = request(&app.app, Method::POST, "/login", Some(fields), &form_for("198.51.100.2")).await;
    let (status, _, _) = response_text(other).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.state.auth_rate_limit().limiter.tracked().await, 2);
}

#[tokio::test]
async fn it_rate_limit_ignores_real_ip_header_without_trusted_proxy() {
    let app = spawn_test_app_with_auth_limit(2).await;
    assert!(!app.config.trust_proxy);
    let browser = Browser::anonymous(&app.config);
    let fields: &[(&str, &str)] = &[
        ("_csrf", browser.csrf_token.as_str()),
        ("name", "nobody"),
        ("password", "pw"),
    ];

    for i in 0..6 {
        let mut headers = browser.headers();
        headers.push(("x-real-ip", format!("10.9.0.{i}")));
        headers.push(("x-forwarded-for", format!("10.8.0.{i}")));
        let response = request(&app.app, Method::POST, "/login", Some(fields), &headers).await;
        let expected = if i < 2 {
            StatusCode::OK
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(response.status(), expected, "request {i}");
    }

    assert_eq!(app.state.auth_rate_limit().limiter.tracked().await, 1);
}

use axum::http::{Method, StatusCode};
use axum::Router;

use streamchat_web::config::Config;
use streamchat_web::csrf::{generate_nonce, token_for};

use super::app::{TestApp, ROOT_DOMAIN};
use super::fixtures::seed_user;
use super::http::{cookie_value, request, response_text};

/// Cookie jar of a single simulated browser.
#[derive(Debug, Clone)]
pub struct Browser {
    pub nonce: String,
    pub csrf_token: String,
    pub auth: Option<String>,
}

impl Browser {
    pub fn anonymous(config: &Config) -> Self {
        let nonce = generate_nonce();
        Self {
            csrf_token: token_for(&config.cookie_secret, &nonce),
            nonce,
            auth: None,
        }
    }

    pub fn cookie_header(&self) -> String {
        match &self.auth {
            Some(token) => format!("csrf={}; auth={token}", self.nonce),
            None => format!("csrf={}", self.nonce),
        }
    }

    /// Headers for a request to the main site.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("cookie", self.cookie_header()),
            ("host", ROOT_DOMAIN.to_string()),
        ]
    }

    pub async fn get(&self, app: &Router, path: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        response_text(request(app, Method::GET, path, None, &self.headers()).await).await
    }

    /// Submits a form with this browser's CSRF token prepended.
    pub async fn post(
        &self,
        app: &Router,
        path: &str,
        fields: &[(&str, &str)],
    ) -> (StatusCode, axum::http::HeaderMap, String) {
        let mut form = vec![("_csrf", self.csrf_token.as_str())];
        form.extend_from_slice(fields);
        response_text(request(app, Method::POST, path, Some(form.as_slice()), &self.headers()).await).await
    }
}

/// Posts the login form and stores the issued `auth` cookie.
pub async fn login(app: &Router, browser: &mut Browser, name: &str, password: &str) {
    let (status, headers, body) = browser
        .post(app, "/login", &[("name", name), ("password", password)])
        .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    let token = cookie_value(&headers, "auth").expect("auth cookie issued");
    browser.auth = Some(token);
}

/// Seeds `name` and returns a browser logged in as that user.
pub async fn logged_in_browser(app: &TestApp, name: &str, password: &str) -> Browser {
    seed_user(app.state.store(), name, password, "");
    let mut browser = Browser::anonymous(&app.config);
    login(&app.app, &mut browser, name, password).await;
    browser
}

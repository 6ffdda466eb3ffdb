use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::auth::{gen_session, sign_cookie_value, verify_session, CurrentUser, SessionUser};
use crate::config::Config;
use crate::cookies::{clear_cookie, set_cookie, CookieOptions, AUTH_COOKIE, RANK_COOKIE};
use crate::csrf::Csrf;
use crate::extractors::{require, ClientIp, FormBody, QueryParams};
use crate::logging::EVENT_LOG;
use crate::response::AppError;
use crate::routes::client::{
    build_url, classify_redirect, in_root_domain, redirect_https, referer, request_host,
    RedirectTarget,
};
use crate::state::AppState;
use crate::store::operations::users::INVALID_LOGIN;
use crate::store::StoreError;
use crate::validation::{is_valid_email, truncate_chars, MAX_PASSWORD_CHARS};
use crate::views::{render_template, LoginPage, LogoutPage, PageContext, RegisterPage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
        .route("/register", get(register_page).post(register))
        .route("/shimcookie", get(shim_cookie))
        .route("/shimlogout", get(shim_logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShimCookieQuery {
    pub auth: Option<String>,
    pub rank: Option<String>,
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub redirect: Option<String>,
}

/// Sets the `auth` cookie. `domain` is `None` for a host-only cookie.
pub(crate) fn set_auth_cookie(
    headers: &mut HeaderMap,
    config: &Config,
    token: &str,
    expires: DateTime<Utc>,
    domain: Option<&str>,
) -> Result<(), AppError> {
    set_cookie(
        headers,
        AUTH_COOKIE,
        token,
        &CookieOptions {
            domain,
            expires: Some(expires),
            http_only: true,
            secure: config.https.enabled,
        },
    )
}

fn set_rank_cookie(
    headers: &mut HeaderMap,
    config: &Config,
    rank: u8,
    expires: DateTime<Utc>,
    domain: Option<&str>,
) -> Result<String, AppError> {
    let signed = sign_cookie_value(&rank.to_string(), &config.cookie_secret);
    set_cookie(
        headers,
        RANK_COOKIE,
        &signed,
        &CookieOptions {
            domain,
            expires: Some(expires),
            http_only: false,
            secure: config.https.enabled,
        },
    )?;
    Ok(signed)
}

fn clear_session_cookies(headers: &mut HeaderMap, domain: Option<&str>) -> Result<(), AppError> {
    clear_cookie(headers, AUTH_COOKIE, domain)?;
    clear_cookie(headers, RANK_COOKIE, domain)
}

async fn login_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if let Some(redirect) = redirect_https(state.config(), &headers, &uri) {
        return Ok(redirect);
    }

    let ctx = PageContext::new(user.as_ref(), &csrf, state.config());
    render_template(LoginPage {
        ctx,
        login_error: None,
        was_already_logged_in: user.is_some(),
        redirect: if user.is_some() {
            String::new()
        } else {
            referer(&headers).unwrap_or_default()
        },
    })
}

async fn login(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    headers: HeaderMap,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let name = require(&form.name, "name")?;
    let password = truncate_chars(require(&form.password, "password")?, MAX_PASSWORD_CHARS);
    let config = state.config();
    let ctx = PageContext::new(current.as_ref(), &csrf, config);

    let user = match state.store().verify_login(name, password) {
        Ok(user) => user,
        Err(e) => {
            if matches!(&e, StoreError::Validation(msg) if msg == INVALID_LOGIN) {
                tracing::info!(
                    target: EVENT_LOG,
                    "[loginfail] Login failed (bad password): {name}@{ip}"
                );
            }
            return render_template(LoginPage {
                ctx,
                login_error: Some(e.public_message()),
                was_already_logged_in: false,
                redirect: form.redirect.clone().unwrap_or_default(),
            });
        }
    };

    let expires = Utc::now() + Duration::days(config.session_days as i64);
    let token = gen_session(&user, expires, &config.session_secret)?;
    let dotted = Some(config.http.root_domain_dotted.as_str());

    let mut cookies = HeaderMap::new();
    set_auth_cookie(&mut cookies, config, &token, expires, None)?;
    set_auth_cookie(&mut cookies, config, &token, expires, dotted)?;
    let rank = set_rank_cookie(&mut cookies, config, user.global_rank, expires, dotted)?;

    let candidate = referer(&headers)
        .or_else(|| form.redirect.clone())
        .unwrap_or_default();

    match classify_redirect(config, &candidate) {
        RedirectTarget::AltDomain { origin, target } => {
            let dest = build_url(
                &origin,
                "/shimcookie",
                &[
                    ("auth", token.as_str()),
                    ("rank", rank.as_str()),
                    ("redirect", target.as_str()),
                ],
            )
            .ok_or_else(|| AppError::internal("failed to build shimcookie url"))?;
            Ok((cookies, Redirect::to(&dest)).into_response())
        }
        RedirectTarget::Local(target) => Ok((cookies, Redirect::to(&target)).into_response()),
        RedirectTarget::None => {
            let page = render_template(LoginPage {
                ctx: ctx.logged_in_as(&user.name, user.is_site_admin()),
                login_error: None,
                was_already_logged_in: false,
                redirect: String::new(),
            })?;
            Ok((cookies, page).into_response())
        }
    }
}

/// Receives the session on an alternate domain after a login on the main one.
async fn shim_cookie(
    State(state): State<AppState>,
    csrf: Csrf,
    QueryParams(query): QueryParams<ShimCookieQuery>,
) -> Result<Response, AppError> {
    let token = require(&query.auth, "auth")?;
    require(&query.rank, "rank")?;
    let redirect = require(&query.redirect, "redirect")?;

    let config = state.config();
    let session = verify_session(token, &config.session_secret, state.store())?;

    let mut cookies = HeaderMap::new();
    set_auth_cookie(&mut cookies, config, token, session.expires_at, None)?;
    set_rank_cookie(&mut cookies, config, session.global_rank, session.expires_at, None)?;

    match classify_redirect(config, redirect) {
        RedirectTarget::Local(target) | RedirectTarget::AltDomain { target, .. } => {
            Ok((cookies, Redirect::to(&target)).into_response())
        }
        RedirectTarget::None => {
            let ctx = PageContext::new(Some(&session), &csrf, config);
            let page = render_template(LoginPage {
                ctx,
                login_error: None,
                was_already_logged_in: false,
                redirect: String::new(),
            })?;
            Ok((cookies, page).into_response())
        }
    }
}

async fn shim_logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    QueryParams(query): QueryParams<RedirectQuery>,
) -> Result<Response, AppError> {
    let redirect = require(&query.redirect, "redirect")?;
    let config = state.config();

    let mut cookies = HeaderMap::new();
    clear_session_cookies(&mut cookies, None)?;
    clear_session_cookies(&mut cookies, Some(config.http.root_domain_dotted.as_str()))?;

    logout_destination(config, user.as_ref(), &csrf, cookies, redirect)
}

async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    headers: HeaderMap,
    QueryParams(query): QueryParams<RedirectQuery>,
) -> Result<Response, AppError> {
    let config = state.config();
    let mut cookies = HeaderMap::new();
    clear_session_cookies(&mut cookies, None)?;

    let candidate = referer(&headers)
        .or_else(|| query.redirect.clone())
        .unwrap_or_default();

    if !in_root_domain(&request_host(&headers), &config.http.root_domain) {
        let dest = build_url(
            config.public_address(),
            "/shimlogout",
            &[("redirect", candidate.as_str())],
        )
        .ok_or_else(|| AppError::internal("failed to build shimlogout url"))?;
        return Ok((cookies, Redirect::to(&dest)).into_response());
    }

    clear_session_cookies(&mut cookies, Some(config.http.root_domain_dotted.as_str()))?;
    logout_destination(config, user.as_ref(), &csrf, cookies, &candidate)
}

fn logout_destination(
    config: &Config,
    user: Option<&SessionUser>,
    csrf: &Csrf,
    cookies: HeaderMap,
    candidate: &str,
) -> Result<Response, AppError> {
    match classify_redirect(config, candidate) {
        RedirectTarget::Local(target) | RedirectTarget::AltDomain { target, .. } => {
            Ok((cookies, Redirect::to(&target)).into_response())
        }
        RedirectTarget::None => {
            let ctx = PageContext::new(user, csrf, config).logged_out();
            let page = render_template(LogoutPage { ctx })?;
            Ok((cookies, page).into_response())
        }
    }
}

async fn register_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if let Some(redirect) = redirect_https(state.config(), &headers, &uri) {
        return Ok(redirect);
    }

    render_template(RegisterPage {
        ctx: PageContext::new(user.as_ref(), &csrf, state.config()),
        registered: false,
        register_error: None,
        register_name: String::new(),
        redirect: String::new(),
    })
}

async fn register(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    FormBody(form): FormBody<RegisterForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let name = require(&form.name, "name")?;
    let password = require(&form.password, "password")?;
    let email = form.email.as_deref().unwrap_or("");
    let config = state.config();
    let ctx = PageContext::new(current.as_ref(), &csrf, config);

    let failed = |ctx: PageContext, message: String| {
        render_template(RegisterPage {
            ctx,
            registered: false,
            register_error: Some(message),
            register_name: String::new(),
            redirect: form.redirect.clone().unwrap_or_default(),
        })
    };

    if name.is_empty() {
        return failed(ctx, "Username must not be empty".to_string());
    }
    if config.reserved_names.usernames.is_match(name) {
        return failed(ctx, "That username is reserved".to_string());
    }
    if password.is_empty() {
        return failed(ctx, "Password must not be empty".to_string());
    }
    let password = truncate_chars(password, MAX_PASSWORD_CHARS);
    if !email.is_empty() && !is_valid_email(email) {
        return failed(ctx, "Invalid email address".to_string());
    }

    if let Err(e) = state
        .store()
        .register_user(name, password, email, &ip.to_string())
    {
        return failed(ctx, e.public_message());
    }

    if email.is_empty() {
        tracing::info!(target: EVENT_LOG, "[register] {ip} registered account: {name}");
    } else {
        tracing::info!(target: EVENT_LOG, "[register] {ip} registered account: {name} <{email}>");
    }

    render_template(RegisterPage {
        ctx,
        registered: true,
        register_error: None,
        register_name: name.to_string(),
        redirect: form.redirect.clone().unwrap_or_default(),
    })
}

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::auth::{gen_session, CurrentUser, SessionUser};
use crate::csrf::Csrf;
use crate::extractors::{require, ClientIp, FormBody};
use crate::logging::EVENT_LOG;
use crate::response::AppError;
use crate::routes::auth::set_auth_cookie;
use crate::routes::client::{in_root_domain, redirect_https, request_host};
use crate::state::AppState;
use crate::validation::{is_valid_email, truncate_chars, MAX_PASSWORD_CHARS};
use crate::views::{render_template, AccountEditPage, PageContext};

#[derive(Debug, Deserialize)]
pub struct AccountEditForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub action: Option<String>,
    pub name: Option<String>,
    pub oldpassword: Option<String>,
    pub newpassword: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

fn edit_result(ctx: PageContext, outcome: Result<&str, String>) -> Result<Response, AppError> {
    let (error_message, success_message) = match outcome {
        Ok(msg) => (None, Some(msg.to_string())),
        Err(err) => (Some(err), None),
    };
    render_template(AccountEditPage {
        ctx,
        error_message,
        success_message,
    })
}

pub async fn edit_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if let Some(redirect) = redirect_https(state.config(), &headers, &uri) {
        return Ok(redirect);
    }

    render_template(AccountEditPage {
        ctx: PageContext::new(user.as_ref(), &csrf, state.config()),
        error_message: None,
        success_message: None,
    })
}

pub async fn account_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    headers: HeaderMap,
    FormBody(form): FormBody<AccountEditForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let ip = ip.to_string();
    match form.action.as_deref() {
        Some("change_password") => {
            change_password(&state, user.as_ref(), &csrf, &ip, &headers, &form)
        }
        Some("change_email") => change_email(&state, user.as_ref(), &csrf, &ip, &form),
        _ => Err(AppError::bad_request("UNKNOWN_ACTION", "unknown account action")),
    }
}

fn change_password(
    state: &AppState,
    user: Option<&SessionUser>,
    csrf: &Csrf,
    ip: &str,
    headers: &HeaderMap,
    form: &AccountEditForm,
) -> Result<Response, AppError> {
    let name = require(&form.name, "name")?;
    let oldpassword = require(&form.oldpassword, "oldpassword")?;
    let newpassword = require(&form.newpassword, "newpassword")?;

    let config = state.config();
    let ctx = PageContext::new(user, csrf, config);

    if newpassword.is_empty() {
        return edit_result(ctx, Err("New password must not be empty".into()));
    }
    let Some(session) = user else {
        return edit_result(
            ctx,
            Err("You must be logged in to change your password".into()),
        );
    };
    if !session.name.eq_ignore_ascii_case(name) {
        return edit_result(
            ctx,
            Err("You can only change the password of your own account".into()),
        );
    }

    let newpassword = truncate_chars(newpassword, MAX_PASSWORD_CHARS);
    let store = state.store();

    if let Err(e) = store.verify_login(name, oldpassword) {
        return edit_result(ctx, Err(e.public_message()));
    }
    if let Err(e) = store.set_password(name, newpassword) {
        return edit_result(ctx, Err(e.public_message()));
    }
    tracing::info!(target: EVENT_LOG, "[account] {ip} changed password for {name}");

    let updated = match store.get_user(name) {
        Ok(user) => user,
        Err(e) => return edit_result(ctx, Err(e.public_message())),
    };

    // 保留原会话的过期时间
    let token = match gen_session(&updated, session.expires_at, &config.session_secret) {
        Ok(token) => token,
        Err(e) => return edit_result(ctx, Err(e.message)),
    };

    let mut cookies = HeaderMap::new();
    set_auth_cookie(&mut cookies, config, &token, session.expires_at, None)?;
    if in_root_domain(&request_host(headers), &config.http.root_domain) {
        set_auth_cookie(
            &mut cookies,
            config,
            &token,
            session.expires_at,
            Some(config.http.root_domain_dotted.as_str()),
        )?;
    }

    let page = edit_result(ctx, Ok("Password changed."))?;
    Ok((cookies, page).into_response())
}

fn change_email(
    state: &AppState,
    user: Option<&SessionUser>,
    csrf: &Csrf,
    ip: &str,
    form: &AccountEditForm,
) -> Result<Response, AppError> {
    let name = require(&form.name, "name")?;
    let password = require(&form.password, "password")?;
    let email = require(&form.email, "email")?;

    let ctx = PageContext::new(user, csrf, state.config());

    if !email.is_empty() && !is_valid_email(email) {
        return edit_result(ctx, Err("Invalid email address".into()));
    }

    let store = state.store();
    if let Err(e) = store.verify_login(name, password) {
        return edit_result(ctx, Err(e.public_message()));
    }
    if let Err(e) = store.set_email(name, email) {
        return edit_result(ctx, Err(e.public_message()));
    }

    tracing::info!(target: EVENT_LOG, "[account] {ip} changed email for {name} to {email}");
    edit_result(ctx, Ok("Email address changed."))
}

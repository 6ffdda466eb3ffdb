use axum::extract::{Path, State};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use chrono::{Duration, Utc};
use rand::{Rng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::CurrentUser;
use crate::csrf::Csrf;
use crate::extractors::{require, ClientIp, FormBody};
use crate::logging::{ERROR_LOG, EVENT_LOG};
use crate::response::AppError;
use crate::routes::client::redirect_https;
use crate::services::mailer::MailMessage;
use crate::state::AppState;
use crate::store::operations::password_resets::PasswordReset;
use crate::validation::is_valid_user_name;
use crate::views::{render_template, PageContext, PasswordRecoverPage, PasswordResetPage};

pub const RESET_VALID_HOURS: i64 = 24;

const RECOVERED_PASSWORD_LEN: usize = 10;
const RECOVERED_PASSWORD_CHARS: &[u8] = b"abcdefgihkmnpqrstuvwxyz0123456789";

#[derive(Debug, Deserialize)]
pub struct PasswordResetForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Hex SHA-256 of 64 random bytes.
pub fn generate_reset_hash() -> String {
    let mut salt = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(Sha256::digest(salt))
}

pub fn generate_recovered_password() -> String {
    let mut rng = rand::thread_rng();
    (0..RECOVERED_PASSWORD_LEN)
        .map(|_| RECOVERED_PASSWORD_CHARS[rng.gen_range(0..RECOVERED_PASSWORD_CHARS.len())] as char)
        .collect()
}

fn reset_mail_text(name: &str, domain: &str, hash: &str) -> String {
    format!(
        "A password reset request was issued for your account `{name}` on {domain}.  \
         This request is valid for {RESET_VALID_HOURS} hours.  If you did not initiate this, \
         there is no need to take action.  To reset your password, copy and paste the \
         following link into your browser: {domain}/account/passwordrecover/{hash}"
    )
}

fn reset_view(
    ctx: PageContext,
    reset: bool,
    reset_email: &str,
    reset_err: Option<String>,
) -> Result<Response, AppError> {
    render_template(PasswordResetPage {
        ctx,
        reset,
        reset_email: reset_email.to_string(),
        reset_err,
    })
}

pub async fn password_reset_page(
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
    reset_view(ctx, false, "", None)
}

pub async fn password_reset(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    FormBody(form): FormBody<PasswordResetForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let name = require(&form.name, "name")?;
    let email = require(&form.email, "email")?;
    let config = state.config();
    let ctx = PageContext::new(user.as_ref(), &csrf, config);

    if !is_valid_user_name(name) {
        return reset_view(ctx, false, "", Some(format!("Invalid username '{name}'")));
    }

    let store = state.store();
    let actual = match store.get_email(name) {
        Ok(actual) => actual,
        Err(e) => return reset_view(ctx, false, "", Some(e.public_message())),
    };

    if actual != email.trim() {
        return reset_view(
            ctx,
            false,
            "",
            Some(format!(
                "Provided email does not match the email address on record for {name}"
            )),
        );
    }
    if actual.is_empty() {
        return reset_view(
            ctx,
            false,
            "",
            Some(format!(
                "{name} doesn't have an email address on record.  Please contact an \
                 administrator to manually reset your password."
            )),
        );
    }

    let hash = generate_reset_hash();
    let ip = ip.to_string();
    let reset = PasswordReset {
        ip: ip.clone(),
        name: name.to_string(),
        email: email.to_string(),
        hash: hash.clone(),
        expire: Utc::now() + Duration::hours(RESET_VALID_HOURS),
    };
    if let Err(e) = store.add_password_reset(&reset) {
        return reset_view(ctx, false, "", Some(e.public_message()));
    }

    tracing::info!(
        target: EVENT_LOG,
        "[account] {ip} requested password recovery for {name} <{email}>"
    );

    let Some(mailer) = state.mailer() else {
        return reset_view(
            ctx,
            false,
            email,
            Some(
                "This server does not have mail support enabled.  Please contact an \
                 administrator for assistance."
                    .into(),
            ),
        );
    };

    // 收件人取档案中的地址，提交值仅用于比对
    let message = MailMessage {
        from: format!("{} <{}>", config.mail.from_name, config.mail.from_address),
        to: actual.clone(),
        subject: "Password reset request".to_string(),
        text: reset_mail_text(name, &config.http.domain, &hash),
    };

    match mailer.send(message).await {
        Ok(()) => reset_view(ctx, true, email, None),
        Err(e) => {
            tracing::error!(target: ERROR_LOG, error = %e, "mail fail: {e}");
            reset_view(
                ctx,
                false,
                email,
                Some(
                    "Sending reset email failed.  Please contact an administrator for \
                     assistance."
                        .into(),
                ),
            )
        }
    }
}

pub async fn password_recover(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    Path(hash): Path<String>,
) -> Result<Response, AppError> {
    let ctx = PageContext::new(user.as_ref(), &csrf, state.config());
    let failed = |ctx: PageContext, message: String| {
        render_template(PasswordRecoverPage {
            ctx,
            recovered: false,
            recover_err: Some(message),
            recover_pw: String::new(),
        })
    };

    let store = state.store();
    let reset = match store.lookup_password_reset(&hash) {
        Ok(reset) => reset,
        Err(e) => return failed(ctx, e.public_message()),
    };

    if reset.is_expired(Utc::now()) {
        return failed(
            ctx,
            "This password recovery link has expired.  Password recovery links are valid \
             only for 24 hours after submission."
                .into(),
        );
    }

    let new_password = generate_recovered_password();
    if let Err(e) = store.set_password(&reset.name, &new_password) {
        tracing::error!(target: ERROR_LOG, user = %reset.name, error = %e, "Password recovery failed");
        return failed(
            ctx,
            "Database error.  Please contact an administrator if this persists.".into(),
        );
    }

    if let Err(e) = store.delete_password_reset(&hash) {
        tracing::warn!(error = %e, "Failed to delete used password reset");
    }
    tracing::info!(target: EVENT_LOG, "[account] {ip} recovered password for {}", reset.name);

    render_template(PasswordRecoverPage {
        ctx,
        recovered: true,
        recover_err: None,
        recover_pw: new_password,
    })
}

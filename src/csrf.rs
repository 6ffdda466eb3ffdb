//! Double-submit CSRF protection.
//!
//! The browser holds a random nonce in the `csrf` cookie. Forms carry
//! `hex(hmac(cookie_secret, nonce))` in a hidden `_csrf` field; a POST is
//! accepted only when the submitted token matches the cookie it came with.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::cookies::{read_cookie, CSRF_COOKIE};
use crate::response::AppError;
use crate::state::AppState;

pub const CSRF_FIELD: &str = "_csrf";

/// Nonce attached to the request by the CSRF cookie middleware.
#[derive(Debug, Clone)]
pub struct CsrfNonce(pub String);

pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn is_well_formed_nonce(nonce: &str) -> bool {
    nonce.len() == 64 && nonce.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn token_for(secret: &str, nonce: &str) -> String {
    hex::encode(crate::auth::hmac_bytes(secret, nonce.as_bytes()))
}

pub fn verify(secret: &str, nonce: &str, submitted: Option<&str>) -> Result<(), AppError> {
    let rejected = || AppError::forbidden("CSRF_INVALID", "Invalid CSRF token");
    let submitted = submitted.ok_or_else(rejected)?;
    let sig = hex::decode(submitted).map_err(|_| rejected())?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| rejected())?;
    mac.update(nonce.as_bytes());
    mac.verify_slice(&sig).map_err(|_| rejected())
}

/// Per-request CSRF state: the token to embed in rendered forms and the
/// check to run on submitted ones.
#[derive(Debug, Clone)]
pub struct Csrf {
    nonce: String,
    secret: String,
}

impl Csrf {
    pub fn token(&self) -> String {
        token_for(&self.secret, &self.nonce)
    }

    pub fn verify(&self, submitted: Option<&str>) -> Result<(), AppError> {
        verify(&self.secret, &self.nonce, submitted)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Csrf
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let nonce = match parts.extensions.get::<CsrfNonce>() {
            Some(CsrfNonce(nonce)) => nonce.clone(),
            None => read_cookie(&parts.headers, CSRF_COOKIE)
                .filter(|n| is_well_formed_nonce(n))
                .ok_or_else(|| AppError::forbidden("CSRF_INVALID", "Missing CSRF cookie"))?,
        };

        Ok(Csrf {
            nonce,
            secret: app_state.config().cookie_secret.clone(),
        })
    }
}

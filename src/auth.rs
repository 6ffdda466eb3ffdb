use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cookies::{read_cookie, AUTH_COOKIE};
use crate::response::AppError;
use crate::state::AppState;
use crate::store::operations::users::{User, SITE_ADMIN_RANK};
use crate::store::{Store, StoreError};

type HmacSha256 = Hmac<Sha256>;

pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|v| v.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(hash).map_err(|e| StoreError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Pre-computed argon2 hash verified against when the account does not
/// exist, so both login failures take the same time.
pub fn dummy_password_hash() -> &'static str {
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXk$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY"
}

/// Short digest of the stored password hash carried in every session token.
/// A new password changes it, which invalidates all earlier sessions.
pub fn password_fingerprint(password_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password_hash.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub rank: u8,
    pub fp: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub name: String,
    pub global_rank: u8,
    pub expires_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn is_site_admin(&self) -> bool {
        self.global_rank >= SITE_ADMIN_RANK
    }
}

pub fn gen_session(
    user: &User,
    expires_at: DateTime<Utc>,
    secret: &str,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.name.clone(),
        rank: user.global_rank,
        fp: password_fingerprint(&user.password_hash),
        iat: Utc::now().timestamp(),
        exp: expires_at.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(&format!("session sign failed: {e}")))
}

pub fn decode_session(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.algorithms = vec![Algorithm::HS256];

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::forbidden("SESSION_INVALID", "Invalid or expired session"))
}

/// Checks signature, expiry and that the password has not changed since
/// the token was issued. The rank comes from the stored user, not the token.
pub fn verify_session(token: &str, secret: &str, store: &Store) -> Result<SessionUser, AppError> {
    let claims = decode_session(token, secret)?;
    let user = store
        .find_user(&claims.sub)?
        .ok_or_else(|| AppError::forbidden("SESSION_INVALID", "Session user no longer exists"))?;

    if password_fingerprint(&user.password_hash) != claims.fp {
        return Err(AppError::forbidden(
            "SESSION_INVALID",
            "Session predates a password change",
        ));
    }

    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| AppError::forbidden("SESSION_INVALID", "Invalid session expiry"))?;

    Ok(SessionUser {
        name: user.name,
        global_rank: user.global_rank,
        expires_at,
    })
}

/// `value.hex(hmac)` form used for cookies the browser may read but must not forge.
pub fn sign_cookie_value(value: &str, secret: &str) -> String {
    format!("{value}.{}", hex::encode(hmac_bytes(secret, value.as_bytes())))
}

pub fn unsign_cookie_value(signed: &str, secret: &str) -> Option<String> {
    let (value, sig) = signed.rsplit_once('.')?;
    let sig = hex::decode(sig).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(value.as_bytes());
    mac.verify_slice(&sig).ok()?;
    Some(value.to_string())
}

pub(crate) fn hmac_bytes(secret: &str, message: &[u8]) -> Vec<u8> {
    // HMAC 接受任意长度的密钥，new_from_slice 不会失败
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// The logged-in user, if the request carries a valid `auth` cookie.
/// An invalid or stale cookie is treated as not logged in.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<SessionUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let Some(token) = read_cookie(&parts.headers, AUTH_COOKIE) else {
            return Ok(CurrentUser(None));
        };

        match verify_session(&token, &app_state.config().session_secret, app_state.store()) {
            Ok(user) => Ok(CurrentUser(Some(user))),
            Err(e) => {
                tracing::debug!(error = %e.message, "Ignoring invalid auth cookie");
                Ok(CurrentUser(None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("Passw0rd!").unwrap();
        assert!(verify_password("Passw0rd!", &hash).unwrap());
        assert!(!verify_password("bad", &hash).unwrap());
    }

    #[test]
    fn dummy_hash_parses() {
        assert!(!verify_password("anything", dummy_password_hash()).unwrap());
    }

    #[test]
    fn session_round_trip_and_invalidation() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("auth-db").to_str().unwrap()).unwrap();
        let user = store.register_user("erin", "pw", "", "::1").unwrap();

        let expires = Utc::now() + Duration::days(7);
        let token = gen_session(&user, expires, "secret").unwrap();
        let session = verify_session(&token, "secret", &store).unwrap();
        assert_eq!(session.name, "erin");
        assert_eq!(session.expires_at.timestamp(), expires.timestamp());

        assert!(verify_session(&token, "other-secret", &store).is_err());

        store.set_password("erin", "new-pw").unwrap();
        assert!(verify_session(&token, "secret", &store).is_err());
    }

    #[test]
    fn expired_session_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("auth-db2").to_str().unwrap()).unwrap();
        let user = store.register_user("frank", "pw", "", "::1").unwrap();

        let token = gen_session(&user, Utc::now() - Duration::minutes(5), "secret").unwrap();
        assert!(verify_session(&token, "secret", &store).is_err());
    }

    #[test]
    fn signed_cookie_values() {
        let signed = sign_cookie_value("255", "secret");
        assert_eq!(unsign_cookie_value(&signed, "secret").as_deref(), Some("255"));
        assert!(unsign_cookie_value(&signed, "wrong").is_none());
        assert!(unsign_cookie_value("255.deadbeef", "secret").is_none());
        assert!(unsign_cookie_value("no-signature", "secret").is_none());
    }
}

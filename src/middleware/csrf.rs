use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::cookies::{read_cookie, set_cookie, CookieOptions, CSRF_COOKIE};
use crate::csrf::{generate_nonce, is_well_formed_nonce, CsrfNonce};
use crate::state::AppState;

/// Makes sure every request has a CSRF nonce. A browser without a usable
/// `csrf` cookie gets a fresh one on the response.
pub async fn csrf_cookie_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = read_cookie(req.headers(), CSRF_COOKIE).filter(|n| is_well_formed_nonce(n));
    let (nonce, issued) = match existing {
        Some(nonce) => (nonce, false),
        None => (generate_nonce(), true),
    };

    req.extensions_mut().insert(CsrfNonce(nonce.clone()));
    let mut response = next.run(req).await;

    if issued {
        let options = CookieOptions {
            http_only: true,
            secure: state.config().https.enabled,
            ..CookieOptions::default()
        };
        if let Err(e) = set_cookie(response.headers_mut(), CSRF_COOKIE, &nonce, &options) {
            return e.into_response();
        }
    }

    response
}

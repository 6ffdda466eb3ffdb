use std::net::{IpAddr, SocketAddr};

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{ConnectInfo, FromRef, FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::middleware::rate_limit::client_ip;
use crate::response::AppError;
use crate::state::AppState;

/// A wrapper around `axum::Form<T>` that returns `AppError` on decoding failure
/// instead of Axum's default plain-text rejection.
pub struct FormBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for FormBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Form::<T>::from_request(req, state).await {
            Ok(axum::Form(value)) => Ok(FormBody(value)),
            Err(rejection) => Err(form_rejection_to_app_error(rejection)),
        }
    }
}

fn form_rejection_to_app_error(rejection: FormRejection) -> AppError {
    match rejection {
        FormRejection::InvalidFormContentType(e) => {
            tracing::warn!(error = %e, "Missing or invalid form Content-Type");
            AppError::bad_request("INVALID_REQUEST_BODY", "Invalid form body")
        }
        FormRejection::FailedToDeserializeForm(e) => {
            tracing::warn!(error = %e, "Form deserialization failed");
            AppError::bad_request("INVALID_REQUEST_BODY", "Invalid form body")
        }
        FormRejection::FailedToDeserializeFormBody(e) => {
            tracing::warn!(error = %e, "Form body deserialization failed");
            AppError::bad_request("INVALID_REQUEST_BODY", "Invalid form body")
        }
        other => {
            tracing::warn!(error = %other, "Unexpected form body rejection");
            AppError::bad_request("INVALID_REQUEST_BODY", "Invalid form body")
        }
    }
}

impl<T> std::ops::Deref for FormBody<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Query-string counterpart of [`FormBody`].
pub struct QueryParams<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(query_rejection_to_app_error(rejection)),
        }
    }
}

fn query_rejection_to_app_error(rejection: QueryRejection) -> AppError {
    tracing::warn!(error = %rejection, "Query string deserialization failed");
    AppError::bad_request("INVALID_QUERY", "Invalid query string")
}

/// Borrow a required string field, or reject the request with a 400.
pub fn require<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value.as_deref().ok_or_else(|| AppError::malformed(field))
}

/// Real client address of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(
            &parts.headers,
            peer,
            app_state.config().trust_proxy,
        )))
    }
}

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_field() {
        let present = Some("x".to_string());
        assert_eq!(require(&present, "name").unwrap(), "x");

        let err = require(&None, "name").unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "missing field: name");
    }
}

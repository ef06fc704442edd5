//! Identity verifier: resolves a handshake credential to a user.
//!
//! The credential is the `token` cookie, or an `Authorization: Bearer` header
//! for non-browser clients. The cookie wins when both are present.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::model::UserRecord;
use crate::store::{BoardStore, StoreError};

pub const COOKIE_NAME: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("authentication required")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl crate::event::ErrorCode for IdentityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::Store(e) => e.error_code(),
        }
    }
}

/// Pull the credential out of the upgrade request headers.
#[must_use]
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(token) = jar
        .get(COOKIE_NAME)
        .map(Cookie::value)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_owned());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Resolve a credential to its user.
///
/// # Errors
///
/// [`IdentityError::Unauthenticated`] for missing, unknown, or expired
/// tokens; [`IdentityError::Store`] if the lookup itself fails.
pub async fn verify(store: &dyn BoardStore, token: Option<&str>) -> Result<UserRecord, IdentityError> {
    let Some(token) = token else {
        return Err(IdentityError::Unauthenticated);
    };
    store
        .find_session_user(token)
        .await?
        .ok_or(IdentityError::Unauthenticated)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;

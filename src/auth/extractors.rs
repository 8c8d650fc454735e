use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::session::SessionManager;
use crate::{error::AppError, users::repo_types::PublicUser};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Single message for every auth-gate rejection.
pub const GATE_REJECTION: &str = "Unauthenticated Invalid token";

/// Authenticated caller, resolved from the access token before the handler runs.
/// Also inserted into request extensions for anything downstream.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Access token from the `accessToken` cookie, else from `Authorization: Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthenticated(GATE_REJECTION))?;

        let sessions = SessionManager::from_ref(state);
        // bad token, unknown user and store failures all look the same to the caller
        let user = sessions.authenticate(&token).await.map_err(|e| {
            warn!(error = %e, "auth gate rejected request");
            AppError::unauthenticated(GATE_REJECTION)
        })?;

        parts.extensions.insert(user.clone());
        Ok(AuthUser(user))
    }
}

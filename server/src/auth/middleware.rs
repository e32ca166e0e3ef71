use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::verifier::{authenticate, CredentialVerifier};
use crate::error::CollabError;

/// Authenticated caller, extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

/// Credential verifier stored in request extensions for the AuthUser extractor.
#[derive(Clone)]
pub struct AuthVerifier(pub Arc<dyn CredentialVerifier>);

/// Pull the bearer token out of an Authorization header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = CollabError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| CollabError::AuthenticationFailed("No token provided".to_string()))?
            .to_string();

        let verifier = parts
            .extensions
            .get::<AuthVerifier>()
            .cloned()
            .ok_or_else(|| CollabError::Internal("Credential verifier not configured".to_string()))?;

        let user = tokio::task::spawn_blocking(move || authenticate(verifier.0.as_ref(), &token))
            .await??;

        Ok(AuthUser {
            user_id: user.user_id,
            username: user.username,
        })
    }
}

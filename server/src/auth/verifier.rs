use serde::Serialize;

use super::jwt;
use crate::db::{users, DbPool};
use crate::error::{CollabError, CollabResult};

/// Identity resolved from a bearer credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedUser {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
}

/// Resolves a bearer credential to a user.
///
/// Implementations may block; async callers use spawn_blocking.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> CollabResult<VerifiedUser>;
}

/// Verifies HS256 tokens and resolves the subject against the users table.
#[derive(Clone)]
pub struct JwtCredentialVerifier {
    secret: Vec<u8>,
    db: DbPool,
}

impl JwtCredentialVerifier {
    pub fn new(secret: Vec<u8>, db: DbPool) -> Self {
        Self { secret, db }
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn verify(&self, token: &str) -> CollabResult<VerifiedUser> {
        let claims = jwt::validate_access_token(&self.secret, token)
            .map_err(|_| CollabError::AuthenticationFailed("Invalid token".to_string()))?;

        let user = users::find_user(&self.db, &claims.sub)?
            .ok_or_else(|| CollabError::AuthenticationFailed("Invalid user".to_string()))?;

        Ok(VerifiedUser {
            user_id: user.id,
            username: user.username,
            full_name: user.full_name,
            is_active: user.is_active,
        })
    }
}

/// Verify `token` and require an active account.
pub fn authenticate(verifier: &dyn CredentialVerifier, token: &str) -> CollabResult<VerifiedUser> {
    let user = verifier.verify(token)?;
    if !user.is_active {
        return Err(CollabError::AuthenticationFailed("Invalid user".to_string()));
    }
    Ok(user)
}

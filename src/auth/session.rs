//! Login, logout, refresh-token rotation and password change.
//!
//! The stored `refresh_token` column mirrors the last refresh token issued to
//! a user. A presented refresh token is honoured only while it still equals
//! that value, so overwriting it (login, rotation) or clearing it (logout)
//! revokes every earlier token.

use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{LoginIdentity, Registration, TokenPair},
    jwt::TokenService,
    password::PasswordHasher,
};
use crate::{
    error::AppError,
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::{NewUser, PublicUser, UserPatch},
    },
};

/// Uploaded asset URLs attached to a new account.
#[derive(Debug, Clone)]
pub struct AssetRefs {
    pub avatar: String,
    pub cover_image: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    hasher: PasswordHasher,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl SessionManager {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenService, hasher: PasswordHasher) -> Self {
        Self {
            users,
            tokens,
            hasher,
        }
    }

    /// Conflict pre-check, run by the register handler before any asset is
    /// uploaded. `register` itself relies on the unique index.
    pub async fn ensure_available(&self, username: &str, email: &str) -> Result<(), AppError> {
        if self
            .users
            .find_by_identity(Some(username), Some(email))
            .await?
            .is_some()
        {
            warn!(%username, "username or email already registered");
            return Err(AppError::Conflict("Username or email already exists".into()));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(username = %profile.username))]
    pub async fn register(
        &self,
        profile: Registration,
        assets: AssetRefs,
    ) -> Result<PublicUser, AppError> {
        let password_hash = self
            .hasher
            .hash_blocking(profile.password)
            .await
            .map_err(|e| AppError::internal("User registration failed at server", e))?;

        let id = self
            .users
            .create(NewUser {
                username: profile.username,
                email: profile.email,
                full_name: profile.full_name,
                password_hash,
                avatar: assets.avatar,
                cover_image: assets.cover_image,
            })
            .await?;

        // read back through the projection rather than trusting the insert ack
        let created = self
            .users
            .find_public_by_id(id)
            .await?
            .ok_or_else(|| {
                AppError::internal("User registration failed at server", "created user not readable")
            })?;

        info!(user_id = %created.id, "user registered");
        Ok(created)
    }

    fn mint_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let generation_failed = |e: anyhow::Error| AppError::internal("Token generation failed from server side", e);
        Ok(TokenPair {
            access_token: self.tokens.issue_access(user_id).map_err(generation_failed)?,
            refresh_token: self.tokens.issue_refresh(user_id).map_err(generation_failed)?,
        })
    }

    #[instrument(skip_all)]
    pub async fn login(
        &self,
        identity: LoginIdentity,
        password: String,
    ) -> Result<LoginOutcome, AppError> {
        let user = self
            .users
            .find_by_identity(identity.username.as_deref(), identity.email.as_deref())
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let ok = self
            .hasher
            .verify_blocking(password, user.password_hash.clone())
            .await
            .map_err(|e| AppError::internal("Stored credential is unusable", e))?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::unauthenticated("Invalid credentials"));
        }

        let tokens = self.mint_pair(user.id)?;
        // single live refresh token per user: this overwrite revokes older sessions
        if !self
            .users
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?
        {
            return Err(AppError::not_found("User not found"));
        }

        // re-read so the projection reflects the token write (updated_at)
        let user = self
            .users
            .find_public_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        info!(user_id = %user.id, "user logged in");
        Ok(LoginOutcome { user, tokens })
    }

    /// Clears the stored refresh token. Access tokens stay valid until they expire.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.users.set_refresh_token(user_id, None).await?;
        info!(%user_id, "user logged out");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, AppError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthenticated("Unauthorized request"))?;

        let user_id = self.tokens.verify_refresh(presented).map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AppError::unauthenticated("Invalid refresh token")
        })?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if user.refresh_token.as_deref() != Some(presented) {
            warn!(%user_id, "refresh token does not match stored value");
            return Err(AppError::unauthenticated("Refresh token is expired or used"));
        }

        let tokens = self.mint_pair(user_id)?;
        // compare-and-swap on the old value; a concurrent refresh that won first makes this fail
        if !self
            .users
            .rotate_refresh_token(user_id, presented, &tokens.refresh_token)
            .await?
        {
            warn!(%user_id, "refresh token rotated concurrently");
            return Err(AppError::unauthenticated("Refresh token is expired or used"));
        }

        info!(%user_id, "refresh token rotated");
        Ok(tokens)
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: String,
        new_password: String,
    ) -> Result<(), AppError> {
        if old_password == new_password {
            return Err(AppError::validation("New password must differ from old password"));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let ok = self
            .hasher
            .verify_blocking(old_password, user.password_hash)
            .await
            .map_err(|e| AppError::internal("Stored credential is unusable", e))?;
        if !ok {
            warn!(%user_id, "change password with wrong old password");
            return Err(AppError::unauthenticated("Invalid old password"));
        }

        let password_hash = self
            .hasher
            .hash_blocking(new_password)
            .await
            .map_err(|e| AppError::internal("Password change failed", e))?;

        self.users
            .update_by_id(
                user_id,
                UserPatch {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        info!(%user_id, "password changed");
        Ok(())
    }

    /// Auth-gate core: verifies an access token and loads the caller.
    /// Distinguishes a bad token from a missing user; the extractor hides the difference.
    pub async fn authenticate(&self, access_token: &str) -> Result<PublicUser, AppError> {
        let user_id = self.tokens.verify_access(access_token).map_err(|e| {
            warn!(error = %e, "access token rejected");
            AppError::unauthenticated("Invalid access token")
        })?;

        self.users
            .find_public_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{Account, Id, PublicUser};
use crate::password;
use crate::repo::AuthStore;
use crate::token;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthSuccess {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Orchestrates registration, login, password change, and token validation
/// against the injected store. Holds no mutable state of its own; the store
/// is the sole serialization point.
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn AuthStore>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repo: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        Self { repo, config }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<AuthSuccess, AuthError> {
        if !self.config.allow_registration {
            return Err(AuthError::RegistrationDisabled);
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidInput);
        }
        password::validate_strength(
            password,
            self.config.password_min_length,
            self.config.password_require_alnum,
        )
        .map_err(AuthError::WeakPassword)?;

        if self.repo.account_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }
        let hash = password::hash(password).map_err(|_| AuthError::Internal)?;
        // The username column is unique, so a racing insert still surfaces
        // as UsernameTaken through the store conflict.
        let account = self.repo.create_account(username, &hash).await?;

        metrics::increment_counter!("authgate_registrations_total");
        let token = self.mint(&account)?;
        Ok(AuthSuccess { token, user: PublicUser::from(&account) })
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<AuthSuccess, AuthError> {
        let username = username.trim();
        let Some(account) = self.repo.account_by_username(username).await? else {
            // Unknown usernames are logged but exempt from the lockout
            // transition: there is no counter to advance, and the uniform
            // error below avoids confirming non-existence.
            self.repo.record_failure(Some(username), ip).await?;
            metrics::increment_counter!("authgate_login_failed_total");
            return Err(AuthError::InvalidCredentials);
        };

        // Lock check precedes password comparison.
        if let Some(remaining_secs) = lock_remaining_secs(&account) {
            return Err(AuthError::AccountLocked { remaining_secs });
        }

        if !password::verify(password, &account.password_hash) {
            self.repo.record_failure(Some(username), ip).await?;
            self.apply_failed_attempt(&account).await?;
            metrics::increment_counter!("authgate_login_failed_total");
            return Err(AuthError::InvalidCredentials);
        }

        self.repo.clear_failure_state(account.id).await?;
        self.repo.touch_last_login(account.id).await?;
        // Re-read so the token and user view reflect the stamped row.
        let account = self
            .repo
            .account_by_id(account.id)
            .await?
            .ok_or(AuthError::NotFound)?;

        metrics::increment_counter!("authgate_login_success_total");
        let token = self.mint(&account)?;
        Ok(AuthSuccess { token, user: PublicUser::from(&account) })
    }

    pub async fn change_password(
        &self,
        account_id: Id,
        old_password: &str,
        new_password: &str,
    ) -> Result<TokenResponse, AuthError> {
        let Some(account) = self.repo.account_by_id(account_id).await? else {
            return Err(AuthError::NotFound);
        };
        if !password::verify(old_password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        password::validate_strength(
            new_password,
            self.config.password_min_length,
            self.config.password_require_alnum,
        )
        .map_err(AuthError::WeakPassword)?;

        let hash = password::hash(new_password).map_err(|_| AuthError::Internal)?;
        // The version bump revokes every token minted before this call.
        self.repo
            .update_password(account_id, &hash, account.token_version + 1)
            .await?;
        let account = self
            .repo
            .account_by_id(account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let token = self.mint(&account)?;
        Ok(TokenResponse { token })
    }

    /// One store read per call: the version comparison against the live row
    /// is what makes revocation-by-version work without a blacklist.
    pub async fn verify_token(&self, token: &str) -> Result<Account, AuthError> {
        let claims =
            token::decode(token, &self.config.jwt_secret).ok_or(AuthError::TokenInvalid)?;
        let account = self
            .repo
            .account_by_id(claims.sub)
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if claims.token_version != account.token_version {
            return Err(AuthError::TokenInvalid);
        }
        Ok(account)
    }

    fn mint(&self, account: &Account) -> Result<String, AuthError> {
        token::mint(account, &self.config.jwt_secret, self.config.token_ttl_secs)
            .map_err(|_| AuthError::Internal)
    }

    async fn apply_failed_attempt(&self, account: &Account) -> Result<(), AuthError> {
        let attempts = account.failed_attempts + 1;
        let lock_until = if attempts >= self.config.lockout_max_failures {
            metrics::increment_counter!("authgate_lockouts_total");
            Some(Utc::now() + Duration::minutes(self.config.lockout_lock_minutes))
        } else {
            None
        };
        self.repo
            .set_failure_state(account.id, attempts, lock_until)
            .await?;
        Ok(())
    }
}

/// Seconds (rounded up) until the lock expires, or None when not locked.
fn lock_remaining_secs(account: &Account) -> Option<u64> {
    let lock_until = account.lock_until?;
    let remaining_ms = (lock_until - Utc::now()).num_milliseconds();
    if remaining_ms <= 0 {
        return None;
    }
    Some(((remaining_ms + 999) / 1000) as u64)
}

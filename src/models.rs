use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = i64;

/// Persistent account row. Internal only — API responses use [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Id,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub token_version: i32,
    pub failed_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Short-lived captcha challenge row. The code itself is never stored,
/// only its one-way hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Challenge {
    pub id: Uuid,
    pub code_hash: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Append-only audit row for failed logins. Username may be unknown.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FailureRecord {
    pub id: Id,
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sanitized account view returned to clients. Never carries the hash,
/// the failure counter, or the lock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Id,
    pub username: String,
    pub is_admin: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&Account> for PublicUser {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            is_admin: account.is_admin,
            last_login_at: account.last_login_at,
        }
    }
}

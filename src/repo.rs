use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("store error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn create_account(&self, username: &str, password_hash: &str) -> RepoResult<Account>;
    async fn account_by_id(&self, id: Id) -> RepoResult<Option<Account>>;
    async fn account_by_username(&self, username: &str) -> RepoResult<Option<Account>>;
    /// Overwrites the failure counter and lock expiry after a failed login.
    async fn set_failure_state(
        &self,
        id: Id,
        failed_attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    /// Zeroes the failure counter and clears the lock.
    async fn clear_failure_state(&self, id: Id) -> RepoResult<()>;
    async fn touch_last_login(&self, id: Id) -> RepoResult<()>;
    /// Stores a new hash and version stamp; also resets failure state.
    async fn update_password(
        &self,
        id: Id,
        password_hash: &str,
        token_version: i32,
    ) -> RepoResult<()>;
}

#[async_trait]
pub trait ChallengeRepo: Send + Sync {
    async fn create_challenge(
        &self,
        code_hash: &str,
        ip_address: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Challenge>;
    async fn challenge_by_id(&self, id: Uuid) -> RepoResult<Option<Challenge>>;
    /// One-way transition to consumed. Idempotent.
    async fn consume_challenge(&self, id: Uuid) -> RepoResult<()>;
    /// Challenges created from `ip` within the trailing window, for the
    /// issuance cooldown.
    async fn count_recent_by_ip(&self, ip: &str, window_secs: i64) -> RepoResult<i64>;
}

#[async_trait]
pub trait FailureLog: Send + Sync {
    /// Append-only; rows are never updated or read back by the core.
    async fn record_failure(
        &self,
        username: Option<&str>,
        ip_address: Option<&str>,
    ) -> RepoResult<()>;
}

pub trait AuthStore: AccountRepo + ChallengeRepo + FailureLog {}

impl<T> AuthStore for T where T: AccountRepo + ChallengeRepo + FailureLog {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        accounts: HashMap<Id, Account>,
        challenges: HashMap<Uuid, Challenge>,
        failures: Vec<FailureRecord>,
        next_account_id: Id,
        next_failure_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("AUTHGATE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("AUTHGATE_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        /// Test support: the audit log is append-only and has no read
        /// operation in the store traits.
        pub fn failures(&self) -> Vec<FailureRecord> {
            self.state.read().unwrap().failures.clone()
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl AccountRepo for InMemRepo {
        async fn create_account(&self, username: &str, password_hash: &str) -> RepoResult<Account> {
            let mut s = self.state.write().unwrap();
            if s.accounts.values().any(|a| a.username == username) {
                return Err(RepoError::Conflict);
            }
            s.next_account_id += 1;
            let now = Utc::now();
            let account = Account {
                id: s.next_account_id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                is_admin: false,
                token_version: 0,
                failed_attempts: 0,
                lock_until: None,
                created_at: now,
                updated_at: now,
                last_login_at: None,
            };
            s.accounts.insert(account.id, account.clone());
            drop(s);
            self.persist();
            Ok(account)
        }

        async fn account_by_id(&self, id: Id) -> RepoResult<Option<Account>> {
            let s = self.state.read().unwrap();
            Ok(s.accounts.get(&id).cloned())
        }

        async fn account_by_username(&self, username: &str) -> RepoResult<Option<Account>> {
            let s = self.state.read().unwrap();
            Ok(s.accounts.values().find(|a| a.username == username).cloned())
        }

        async fn set_failure_state(
            &self,
            id: Id,
            failed_attempts: i32,
            lock_until: Option<DateTime<Utc>>,
        ) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let account = s.accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
            account.failed_attempts = failed_attempts;
            account.lock_until = lock_until;
            account.updated_at = Utc::now();
            drop(s);
            self.persist();
            Ok(())
        }

        async fn clear_failure_state(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let account = s.accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
            account.failed_attempts = 0;
            account.lock_until = None;
            account.updated_at = Utc::now();
            drop(s);
            self.persist();
            Ok(())
        }

        async fn touch_last_login(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let account = s.accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
            let now = Utc::now();
            account.last_login_at = Some(now);
            account.updated_at = now;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn update_password(
            &self,
            id: Id,
            password_hash: &str,
            token_version: i32,
        ) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let account = s.accounts.get_mut(&id).ok_or(RepoError::NotFound)?;
            account.password_hash = password_hash.to_string();
            account.token_version = token_version;
            account.failed_attempts = 0;
            account.lock_until = None;
            account.updated_at = Utc::now();
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ChallengeRepo for InMemRepo {
        async fn create_challenge(
            &self,
            code_hash: &str,
            ip_address: Option<&str>,
            expires_at: DateTime<Utc>,
        ) -> RepoResult<Challenge> {
            let mut s = self.state.write().unwrap();
            let challenge = Challenge {
                id: Uuid::new_v4(),
                code_hash: code_hash.to_string(),
                ip_address: ip_address.map(str::to_string),
                created_at: Utc::now(),
                expires_at,
                consumed: false,
            };
            s.challenges.insert(challenge.id, challenge.clone());
            drop(s);
            self.persist();
            Ok(challenge)
        }

        async fn challenge_by_id(&self, id: Uuid) -> RepoResult<Option<Challenge>> {
            let s = self.state.read().unwrap();
            Ok(s.challenges.get(&id).cloned())
        }

        async fn consume_challenge(&self, id: Uuid) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let challenge = s.challenges.get_mut(&id).ok_or(RepoError::NotFound)?;
            challenge.consumed = true;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn count_recent_by_ip(&self, ip: &str, window_secs: i64) -> RepoResult<i64> {
            let cutoff = Utc::now() - chrono::Duration::seconds(window_secs);
            let s = self.state.read().unwrap();
            let count = s
                .challenges
                .values()
                .filter(|c| c.ip_address.as_deref() == Some(ip) && c.created_at > cutoff)
                .count();
            Ok(count as i64)
        }
    }

    #[async_trait]
    impl FailureLog for InMemRepo {
        async fn record_failure(
            &self,
            username: Option<&str>,
            ip_address: Option<&str>,
        ) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.next_failure_id += 1;
            let record = FailureRecord {
                id: s.next_failure_id,
                username: username.map(str::to_string),
                ip_address: ip_address.map(str::to_string),
                created_at: Utc::now(),
            };
            s.failures.push(record);
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const ACCOUNT_COLUMNS: &str = "id, username, password_hash, is_admin, token_version, \
        failed_attempts, lock_until, created_at, updated_at, last_login_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        if let sqlx::Error::Database(ref db) = e {
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return RepoError::Conflict;
            }
        }
        RepoError::Internal(e.to_string())
    }

    /// Idempotent DDL bootstrap, run once at startup.
    pub async fn ensure_schema(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS auth_accounts (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                token_version INT NOT NULL DEFAULT 0,
                failed_attempts INT NOT NULL DEFAULT 0,
                lock_until TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                last_login_at TIMESTAMPTZ NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS auth_challenges (
                id UUID PRIMARY KEY,
                code_hash TEXT NOT NULL,
                ip_address TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                expires_at TIMESTAMPTZ NOT NULL,
                consumed BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_challenge_expire ON auth_challenges (expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_challenge_ip ON auth_challenges (ip_address, created_at)",
            r#"
            CREATE TABLE IF NOT EXISTS auth_login_failures (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NULL,
                ip_address TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_login_fail_username ON auth_login_failures (username)",
            "CREATE INDEX IF NOT EXISTS idx_login_fail_created ON auth_login_failures (created_at)",
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(pool).await?;
        }
        Ok(())
    }

    #[async_trait]
    impl AccountRepo for PgRepo {
        async fn create_account(&self, username: &str, password_hash: &str) -> RepoResult<Account> {
            let sql = format!(
                "INSERT INTO auth_accounts (username, password_hash) VALUES ($1, $2) RETURNING {ACCOUNT_COLUMNS}"
            );
            sqlx::query_as::<_, Account>(&sql)
                .bind(username)
                .bind(password_hash)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn account_by_id(&self, id: Id) -> RepoResult<Option<Account>> {
            let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM auth_accounts WHERE id = $1");
            sqlx::query_as::<_, Account>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn account_by_username(&self, username: &str) -> RepoResult<Option<Account>> {
            let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM auth_accounts WHERE username = $1");
            sqlx::query_as::<_, Account>(&sql)
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn set_failure_state(
            &self,
            id: Id,
            failed_attempts: i32,
            lock_until: Option<DateTime<Utc>>,
        ) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE auth_accounts SET failed_attempts = $2, lock_until = $3, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(failed_attempts)
            .bind(lock_until)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn clear_failure_state(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE auth_accounts SET failed_attempts = 0, lock_until = NULL, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn touch_last_login(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE auth_accounts SET last_login_at = now(), updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn update_password(
            &self,
            id: Id,
            password_hash: &str,
            token_version: i32,
        ) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE auth_accounts SET password_hash = $2, token_version = $3, \
                 failed_attempts = 0, lock_until = NULL, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(password_hash)
            .bind(token_version)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl ChallengeRepo for PgRepo {
        async fn create_challenge(
            &self,
            code_hash: &str,
            ip_address: Option<&str>,
            expires_at: DateTime<Utc>,
        ) -> RepoResult<Challenge> {
            sqlx::query_as::<_, Challenge>(
                "INSERT INTO auth_challenges (id, code_hash, ip_address, expires_at) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, code_hash, ip_address, created_at, expires_at, consumed",
            )
            .bind(Uuid::new_v4())
            .bind(code_hash)
            .bind(ip_address)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn challenge_by_id(&self, id: Uuid) -> RepoResult<Option<Challenge>> {
            sqlx::query_as::<_, Challenge>(
                "SELECT id, code_hash, ip_address, created_at, expires_at, consumed \
                 FROM auth_challenges WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn consume_challenge(&self, id: Uuid) -> RepoResult<()> {
            let res = sqlx::query("UPDATE auth_challenges SET consumed = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn count_recent_by_ip(&self, ip: &str, window_secs: i64) -> RepoResult<i64> {
            // Store-side clock for the window comparison.
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM auth_challenges \
                 WHERE ip_address = $1 AND created_at > now() - make_interval(secs => $2)",
            )
            .bind(ip)
            .bind(window_secs as f64)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl FailureLog for PgRepo {
        async fn record_failure(
            &self,
            username: Option<&str>,
            ip_address: Option<&str>,
        ) -> RepoResult<()> {
            sqlx::query("INSERT INTO auth_login_failures (username, ip_address) VALUES ($1, $2)")
                .bind(username)
                .bind(ip_address)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }
    }
}

use std::str::FromStr;

/// Everything the core consumes from the environment, loaded once at
/// startup and injected by value. No component reads env vars after this.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub enabled: bool,
    pub allow_registration: bool,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub captcha_ttl_secs: u64,
    pub captcha_cooldown_secs: u64,
    pub captcha_cooldown_max_requests: i64,
    pub password_min_length: usize,
    pub password_require_alnum: bool,
    pub lockout_max_failures: i32,
    pub lockout_lock_minutes: i64,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        fn bool_env(name: &str, default: bool) -> bool {
            std::env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        }
        fn parse_env<T: FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            enabled: bool_env("AUTH_ENABLED", false),
            allow_registration: bool_env("AUTH_ALLOW_REGISTRATION", true),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-me".to_string()),
            token_ttl_secs: parse_env("AUTH_TOKEN_TTL_SECONDS", 7 * 24 * 3600),
            captcha_ttl_secs: parse_env("AUTH_CAPTCHA_TTL_SECONDS", 300),
            captcha_cooldown_secs: parse_env("AUTH_CAPTCHA_COOLDOWN_SECONDS", 5),
            captcha_cooldown_max_requests: parse_env("AUTH_CAPTCHA_COOLDOWN_MAX_REQUESTS", 3),
            password_min_length: parse_env("AUTH_PASSWORD_MIN_LENGTH", 8),
            password_require_alnum: bool_env("AUTH_PASSWORD_REQUIRE_ALNUM", true),
            lockout_max_failures: parse_env("AUTH_LOCKOUT_MAX_FAILURES", 5),
            lockout_lock_minutes: parse_env("AUTH_LOCKOUT_LOCK_MINUTES", 10),
        }
    }
}

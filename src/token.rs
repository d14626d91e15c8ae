use jsonwebtoken::{decode as jwt_decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{Account, Id};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    pub token_version: i32,
    pub exp: usize,
}

/// Signs a time-bounded token over the account's identity and current
/// version stamp. Bumping `token_version` on the account is what revokes
/// everything minted before the bump.
pub fn mint(
    account: &Account,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::seconds(ttl_secs as i64))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: account.id,
        username: account.username.clone(),
        token_version: account.token_version,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Signature, structure, and expiry checks only. Any failure collapses to
/// `None`; the caller compares the embedded version against the stored
/// account.
pub fn decode(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    jwt_decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

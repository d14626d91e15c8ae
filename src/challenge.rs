use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::repo::ChallengeRepo;

// Characters that survive low-fidelity rendering: no 0/O/o, no 1/I/l.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 4;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedChallenge {
    pub captcha_id: Uuid,
    /// `data:image/svg+xml;base64,...` rendering of the code.
    pub image: String,
    pub expires_in: u64,
}

/// Issues a new challenge. When the requester IP is known, issuance is
/// throttled by counting rows this IP created inside the cooldown window —
/// the shared store is the rate-limit authority, not process memory.
pub async fn issue(
    repo: &dyn ChallengeRepo,
    config: &AuthConfig,
    ip: Option<&str>,
) -> Result<IssuedChallenge, AuthError> {
    if let Some(ip) = ip {
        let recent = repo
            .count_recent_by_ip(ip, config.captcha_cooldown_secs as i64)
            .await?;
        if recent >= config.captcha_cooldown_max_requests {
            metrics::increment_counter!("authgate_captcha_rejected_total");
            return Err(AuthError::RateLimited);
        }
    }

    let code = generate_code();
    let code_hash = password::hash(&code).map_err(|_| AuthError::Internal)?;
    let expires_at = Utc::now() + Duration::seconds(config.captcha_ttl_secs as i64);
    let challenge = repo.create_challenge(&code_hash, ip, expires_at).await?;

    metrics::increment_counter!("authgate_captcha_issued_total");
    Ok(IssuedChallenge {
        captcha_id: challenge.id,
        image: render_data_uri(&code),
        expires_in: config.captcha_ttl_secs,
    })
}

/// Consuming verification. A challenge answers at most one call: expired
/// and already-consumed challenges are (re)marked consumed and fail, and a
/// live challenge is consumed whether or not the answer matches. An unknown
/// id fails without touching anything.
pub async fn verify(repo: &dyn ChallengeRepo, id: Uuid, code: &str) -> Result<bool, AuthError> {
    let Some(challenge) = repo.challenge_by_id(id).await? else {
        return Ok(false);
    };

    if challenge.consumed || challenge.expires_at <= Utc::now() {
        repo.consume_challenge(id).await?;
        return Ok(false);
    }

    let ok = password::verify(&code.to_uppercase(), &challenge.code_hash);
    repo.consume_challenge(id).await?;
    Ok(ok)
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn render_data_uri(code: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(render_svg(code)))
}

/// Minimal SVG rendering with per-glyph jitter. Rendering fidelity is not a
/// contract; only the code round-trip is.
fn render_svg(code: &str) -> String {
    let mut rng = rand::thread_rng();
    let glyphs: String = code
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let x = 18 + i * 30;
            let y = rng.gen_range(32..40);
            let rotate = rng.gen_range(-12..=12);
            format!(
                "<text x=\"{x}\" y=\"{y}\" transform=\"rotate({rotate} {x} {y})\" \
                 font-size=\"28\" font-family=\"monospace\" fill=\"#3b4252\">{c}</text>"
            )
        })
        .collect();
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"140\" height=\"52\">\
         <rect width=\"140\" height=\"52\" fill=\"#f8f9fb\"/>{glyphs}</svg>"
    )
}

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Auth;
use crate::challenge;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::PublicUser;
use crate::repo::ChallengeRepo;
use crate::service::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub challenges: Arc<dyn ChallengeRepo>,
    pub service: AuthService,
    pub config: AuthConfig,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/captcha/image").route(web::get().to(captcha_image)))
            .service(
                web::scope("/auth")
                    .service(web::resource("/config").route(web::get().to(auth_config)))
                    .service(web::resource("/register").route(web::post().to(register)))
                    .service(web::resource("/login").route(web::post().to(login)))
                    .service(
                        web::resource("/change-password").route(web::post().to(change_password)),
                    )
                    .service(web::resource("/me").route(web::get().to(me))),
            ),
    );
}

/// Route table for deployments with authentication switched off: the config
/// probe still answers, everything else is 503.
pub fn config_disabled(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/auth/config").route(web::get().to(auth_config_disabled)))
            .default_service(web::route().to(auth_disabled)),
    );
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub captcha_id: Uuid,
    pub captcha_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub captcha_id: Uuid,
    pub captcha_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// First X-Forwarded-For entry when present, else the peer address.
fn client_ip(req: &HttpRequest) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    req.peer_addr().map(|addr| addr.ip().to_string())
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/config",
    responses((status = 200, description = "Client-relevant authentication policy"))
)]
pub async fn auth_config(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "enabled": true,
        "allow_registration": data.config.allow_registration,
        "password_min_length": data.config.password_min_length,
        "require_letter_and_number": data.config.password_require_alnum,
    }))
}

async fn auth_config_disabled() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"enabled": false}))
}

async fn auth_disabled() -> HttpResponse {
    HttpResponse::ServiceUnavailable()
        .json(serde_json::json!({"error": "authentication is not enabled"}))
}

#[utoipa::path(
    get,
    path = "/api/v1/captcha/image",
    responses(
        (status = 200, description = "Challenge issued", body = challenge::IssuedChallenge),
        (status = 429, description = "Issuance cooldown exceeded for this IP")
    ),
    tag = "captcha"
)]
pub async fn captcha_image(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AuthError> {
    let ip = client_ip(&req);
    let issued = challenge::issue(data.challenges.as_ref(), &data.config, ip.as_deref()).await?;
    Ok(HttpResponse::Ok().json(issued))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = crate::service::AuthSuccess),
        (status = 400, description = "Bad captcha, weak password, or invalid input"),
        (status = 403, description = "Registration disabled"),
        (status = 409, description = "Username taken")
    ),
    tag = "auth"
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AuthError> {
    let body = payload.into_inner();
    if !challenge::verify(data.challenges.as_ref(), body.captcha_id, &body.captcha_code).await? {
        return Err(AuthError::ChallengeFailed);
    }
    let result = data.service.register(&body.username, &body.password).await?;
    Ok(HttpResponse::Created().json(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = crate::service::AuthSuccess),
        (status = 400, description = "Bad captcha"),
        (status = 401, description = "Invalid credentials"),
        (status = 423, description = "Account locked; body carries retry_after_secs")
    ),
    tag = "auth"
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AuthError> {
    let body = payload.into_inner();
    if !challenge::verify(data.challenges.as_ref(), body.captcha_id, &body.captcha_code).await? {
        return Err(AuthError::ChallengeFailed);
    }
    let ip = client_ip(&req);
    let result = data
        .service
        .login(&body.username, &body.password, ip.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; previous tokens revoked", body = crate::service::TokenResponse),
        (status = 400, description = "Weak password"),
        (status = 401, description = "Wrong old password or invalid token")
    ),
    tag = "auth"
)]
pub async fn change_password(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AuthError> {
    let body = payload.into_inner();
    let result = data
        .service
        .change_password(auth.0.id, &body.old_password, &body.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = PublicUser),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "auth"
)]
pub async fn me(auth: Auth) -> Result<HttpResponse, AuthError> {
    Ok(HttpResponse::Ok().json(PublicUser::from(&auth.0)))
}

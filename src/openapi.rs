use utoipa::OpenApi;

use crate::challenge::IssuedChallenge;
use crate::models::PublicUser;
use crate::routes::{ChangePasswordRequest, LoginRequest, RegisterRequest};
use crate::service::{AuthSuccess, TokenResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::auth_config,
        crate::routes::captcha_image,
        crate::routes::register,
        crate::routes::login,
        crate::routes::change_password,
        crate::routes::me,
    ),
    components(schemas(
        PublicUser, AuthSuccess, TokenResponse, IssuedChallenge,
        RegisterRequest, LoginRequest, ChangePasswordRequest
    )),
    tags(
        (name = "auth", description = "Registration, login, session management"),
        (name = "captcha", description = "Human-verification challenges"),
    )
)]
pub struct ApiDoc;

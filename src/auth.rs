use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::LocalBoxFuture;

use crate::error::AuthError;
use crate::models::Account;
use crate::routes::AppState;

/// Extractor yielding the validated [`Account`] behind the presented bearer
/// token. Validation reads the account once per request so that a bumped
/// token version (password change, administrative revocation) takes effect
/// immediately.
pub struct Auth(pub Account);

impl FromRequest for Auth {
    type Error = AuthError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate header parsing to BearerAuth.
        let bearer = BearerAuth::from_request(req, pl).into_inner();
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let state = state.ok_or(AuthError::Internal)?;
            let bearer = bearer.map_err(|_| AuthError::TokenInvalid)?;
            let account = state.service.verify_token(bearer.token()).await?;
            Ok(Auth(account))
        })
    }
}

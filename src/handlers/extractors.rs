use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web::Data, FromRequest, HttpRequest};
use chrono::Utc;

use crate::errors::ApiError;
use crate::services::session::{Requester, SessionTokens};

/// Resolves the caller from `Authorization: Bearer <token>`.
impl FromRequest for Requester {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(identify(req))
    }
}

fn identify(req: &HttpRequest) -> Result<Requester, ApiError> {
    let tokens = req
        .app_data::<Data<SessionTokens>>()
        .ok_or_else(|| ApiError::Internal("session tokens not configured".to_string()))?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

    Ok(tokens.verify(token, Utc::now())?)
}

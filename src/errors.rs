use actix_web::{error::JsonPayloadError, http::StatusCode, web::JsonConfig, HttpRequest, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::common::ErrorResponse;
use crate::services::{lifecycle::LifecycleError, session::SessionError};

/// Every failure a handler can report. Only the Swedish message reaches the caller.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn message(&self) -> String {
        match self {
            ApiError::Unauthenticated(_) => "Du måste vara inloggad".to_string(),
            ApiError::Forbidden => "Du har inte behörighet för detta".to_string(),
            ApiError::NotFound(what) => what.to_string(),
            ApiError::UpstreamFailure(_) => "Betaltjänsten svarade inte, försök igen senare".to_string(),
            ApiError::ValidationFailure(message) => message.clone(),
            ApiError::Internal(_) => "Ett internt fel uppstod".to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamFailure(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.message()))
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Forbidden => ApiError::Forbidden,
            LifecycleError::NotFound => ApiError::NotFound("Ingen matchande prenumeration hittades"),
            LifecycleError::Upstream(e) => ApiError::UpstreamFailure(e.to_string()),
            LifecycleError::Persistence(e) => ApiError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Unauthenticated(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

/// JSON bodies that fail to parse answer with the same `{error}` shape as everything else.
pub fn json_config() -> JsonConfig {
    JsonConfig::default().error_handler(json_error)
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected JSON body: {}", err);
    ApiError::ValidationFailure("Ogiltig begäran".to_string()).into()
}

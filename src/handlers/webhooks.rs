use actix_web::web::{Bytes, Data};
use actix_web::{post, HttpRequest, HttpResponse};
use serde_json::json;

use crate::errors::ApiError;
use crate::services::{lifecycle::SubscriptionLifecycleManager, stripe::WebhookVerifier};

#[post("/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: Bytes,
    verifier: Data<WebhookVerifier>,
    manager: Data<SubscriptionLifecycleManager>,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::ValidationFailure("Signatur saknas".to_string()))?;

    let event = verifier.verify_and_parse(&body, signature).map_err(|e| {
        log::warn!("Rejected Stripe webhook: {}", e);
        ApiError::ValidationFailure("Ogiltig webhook".to_string())
    })?;

    log::info!("Received Stripe webhook {} ({:?})", event.id, event.event_type);
    manager.apply_billing_event(&event).await?;

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

use actix_web::web::{Data, Path};
use actix_web::{get, post, HttpResponse};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::subscription::SubscriptionResponse;
use crate::services::{lifecycle::SubscriptionLifecycleManager, session::Requester};

#[post("/user/{user_id}/cancel")]
pub async fn cancel_subscription(
    manager: Data<SubscriptionLifecycleManager>,
    requester: Requester,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let subscription = manager.cancel(path.into_inner(), &requester).await?;
    Ok(HttpResponse::Ok().json(SubscriptionResponse {
        subscription,
        message: Some("Prenumerationen har avslutats".to_string()),
    }))
}

#[post("/user/{user_id}/reactivate")]
pub async fn reactivate_subscription(
    manager: Data<SubscriptionLifecycleManager>,
    requester: Requester,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let subscription = manager.reactivate(path.into_inner(), &requester).await?;
    Ok(HttpResponse::Ok().json(SubscriptionResponse {
        subscription,
        message: Some("Prenumerationen har återaktiverats".to_string()),
    }))
}

#[get("/user/{user_id}")]
pub async fn get_subscription(
    manager: Data<SubscriptionLifecycleManager>,
    requester: Requester,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let subscription = manager.current(path.into_inner(), &requester).await?;
    Ok(HttpResponse::Ok().json(SubscriptionResponse { subscription, message: None }))
}

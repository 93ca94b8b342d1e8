use actix_web::{get, web::Data, HttpResponse};
use serde_json::json;

use crate::services::database::DatabaseService;

#[get("/health")]
pub async fn health_check(db: Data<DatabaseService>) -> HttpResponse {
    match db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded" }))
        }
    }
}

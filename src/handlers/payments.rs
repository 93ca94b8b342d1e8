use actix_web::web::{Data, Json};
use actix_web::{post, HttpResponse};
use chrono::Utc;
use validator::Validate;

use crate::errors::ApiError;
use crate::models::promotion::ValidateDiscountRequest;
use crate::services::discount::DiscountService;

#[post("/validate-discount")]
pub async fn validate_discount(
    discounts: Data<DiscountService>,
    payload: Json<ValidateDiscountRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if let Err(errors) = payload.validate() {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .find_map(|error| error.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Ogiltig begäran".to_string());
        return Err(ApiError::ValidationFailure(message));
    }

    let code = payload.code.unwrap_or_default();
    let result = discounts.validate(&code, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(result.to_response(payload.price)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test, App};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use crate::errors::json_config;
    use crate::models::promotion::{DiscountKind, Promotion};
    use crate::services::discount::StaticCatalog;

    fn service() -> DiscountService {
        let now = Utc::now();
        DiscountService::new(Arc::new(StaticCatalog::new(vec![
            Promotion::new("HOST25", DiscountKind::Percentage, Decimal::from(25), now + Duration::days(30)),
            Promotion::new("GAMMAL", DiscountKind::Fixed, Decimal::from(5000), now - Duration::days(1)),
        ])))
    }

    async fn send(req: test::TestRequest) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(service()))
                .app_data(json_config())
                .service(validate_discount),
        )
        .await;
        let resp = test::call_service(&app, req.uri("/validate-discount").to_request()).await;
        let status = resp.status();
        (status, test::read_body_json(resp).await)
    }

    async fn post(body: Value) -> (StatusCode, Value) {
        send(test::TestRequest::post().set_json(body)).await
    }

    #[actix_web::test]
    async fn test_valid_code_is_case_insensitive() {
        let (status, body) = post(json!({ "code": "  host25 " })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert_eq!(body["code"], "HOST25");
        assert_eq!(body["type"], "percentage");
        assert!(body.get("message").is_none());
    }

    #[actix_web::test]
    async fn test_rejected_codes_carry_reason() {
        let (_, body) = post(json!({ "code": "gammal" })).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["message"], "Rabattkoden har gått ut");

        let (_, body) = post(json!({ "code": "NOPE" })).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["message"], "Ogiltig rabattkod");
    }

    #[actix_web::test]
    async fn test_missing_or_blank_code_is_bad_request() {
        let (status, body) = post(json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Rabattkod saknas");

        let (status, _) = post(json!({ "code": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_price_is_discounted_when_sent() {
        let (status, body) = post(json!({ "code": "HOST25", "price": 200 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["discountedPrice"], 150.0);

        let (status, _) = post(json!({ "code": "HOST25", "price": -5 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_malformed_body_uses_error_shape() {
        let (status, body) = post(json!({ "code": 5 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Ogiltig begäran");

        let (status, body) = send(test::TestRequest::post().set_payload("code=HOST25")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Ogiltig begäran");
    }
}

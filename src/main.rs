mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod tasks;

use std::env;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;

use config::{Config, PromotionSource};
use services::{
    database::DatabaseService,
    discount::{DiscountService, PromotionCatalog, StaticCatalog},
    lifecycle::SubscriptionLifecycleManager,
    session::SessionTokens,
    stripe::{StripeBillingService, WebhookVerifier},
};

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to initialize database", e))?;

    let static_catalog = StaticCatalog::load(config.app.promotions_path.as_deref())
        .map_err(|e| startup_error("Failed to load promotion catalog", e))?;
    let catalog: Arc<dyn PromotionCatalog> = match config.app.promotion_source {
        PromotionSource::Static => Arc::new(static_catalog),
        PromotionSource::Database => {
            let seed = static_catalog
                .promotions()
                .await
                .map_err(|e| startup_error("Failed to read promotion catalog", e))?;
            database_service
                .seed_promotions(&seed)
                .await
                .map_err(|e| startup_error("Failed to seed promotions", e))?;
            Arc::new(database_service.clone())
        }
    };
    let discount_service = DiscountService::new(catalog);

    let billing = StripeBillingService::new(config.stripe.clone())
        .map_err(|e| startup_error("Failed to initialize Stripe client", e))?;
    let lifecycle = SubscriptionLifecycleManager::new(
        Arc::new(database_service.clone()),
        Arc::new(billing),
        chrono::Duration::minutes(config.app.pending_stale_minutes),
    );
    let session_tokens = SessionTokens::new(&config.app.session_secret)
        .map_err(|e| startup_error("Invalid SESSION_SECRET", e))?;
    let webhook_verifier = WebhookVerifier::new(config.stripe.webhook_secret.clone());

    tokio::spawn(tasks::reconcile_task::start_reconcile_task(
        lifecycle.clone(),
        Duration::from_secs(config.app.reconcile_interval_secs.max(1)),
    ));

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting subscription billing server on {}", bind_address);

    let allowed_origin = config.app.allowed_origin.clone();

    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(discount_service.clone()))
            .app_data(web::Data::new(lifecycle.clone()))
            .app_data(web::Data::new(session_tokens.clone()))
            .app_data(web::Data::new(webhook_verifier.clone()))
            .app_data(errors::json_config())
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/subscriptions")
                            .service(handlers::subscriptions::cancel_subscription)
                            .service(handlers::subscriptions::reactivate_subscription)
                            .service(handlers::subscriptions::get_subscription),
                    )
                    .service(web::scope("/payments").service(handlers::payments::validate_discount))
                    .service(web::scope("/webhooks").service(handlers::webhooks::stripe_webhook))
                    .service(handlers::health::health_check),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}

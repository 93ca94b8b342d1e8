use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub stripe: StripeConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub session_secret: String,
    pub promotions_path: Option<String>,
    pub promotion_source: PromotionSource,
    pub reconcile_interval_secs: u64,
    pub pending_stale_minutes: i64,
    pub allowed_origin: Option<String>,
}

/// Where the discount evaluator reads its promotion catalog from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromotionSource {
    Static,
    Database,
}

impl PromotionSource {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => PromotionSource::Database,
            _ => PromotionSource::Static,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "mem://".to_string()),

            stripe: StripeConfig {
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
                secret_key: env::var("STRIPE_SECRET_KEY")?,
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")?,
                timeout_secs: var_or("STRIPE_TIMEOUT_SECS", 20),
            },

            app: AppConfig {
                session_secret: env::var("SESSION_SECRET")?,
                promotions_path: env::var("PROMOTIONS_PATH").ok(),
                promotion_source: env::var("PROMOTION_SOURCE")
                    .map(|raw| PromotionSource::parse(&raw))
                    .unwrap_or(PromotionSource::Static),
                reconcile_interval_secs: var_or("RECONCILE_INTERVAL_SECS", 300),
                pending_stale_minutes: var_or("PENDING_STALE_MINUTES", 10),
                allowed_origin: env::var("ALLOWED_ORIGIN").ok(),
            },
        })
    }
}

/// Numeric settings fall back to their default when unset or unparsable.
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok()).unwrap_or(default)
}

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::models::promotion::{DiscountKind, DiscountResult, Promotion, RejectionReason};

/// Source of known promotion codes.
#[async_trait]
pub trait PromotionCatalog: Send + Sync {
    async fn promotions(&self) -> Result<Vec<Promotion>>;
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Decides whether `code` is redeemable at `now`. Pure: nothing is counted or stored.
pub fn evaluate(code: &str, now: DateTime<Utc>, catalog: &[Promotion]) -> DiscountResult {
    let wanted = normalize(code);

    let Some(promotion) = catalog.iter().find(|p| normalize(&p.code) == wanted) else {
        return DiscountResult::Invalid(RejectionReason::NotFound);
    };

    if now > promotion.expires_at {
        return DiscountResult::Invalid(RejectionReason::Expired);
    }

    DiscountResult::Valid {
        code: wanted,
        kind: promotion.kind,
        value: promotion.value,
        description: promotion.describe(),
    }
}

/// In-memory catalog, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    promotions: Vec<Promotion>,
}

impl StaticCatalog {
    pub fn new(promotions: Vec<Promotion>) -> Self {
        Self { promotions }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let promotions: Vec<Promotion> =
            serde_json::from_str(raw).context("promotion catalog is not a JSON array of promotions")?;
        Ok(Self::new(promotions))
    }

    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read promotion catalog {}", path))?;
                let catalog = Self::from_json(&raw)?;
                log::info!("Loaded {} promotions from {}", catalog.promotions.len(), path);
                Ok(catalog)
            }
            None => {
                log::info!("No promotion catalog configured, using built-in codes");
                Ok(Self::builtin())
            }
        }
    }

    pub fn builtin() -> Self {
        let end_of = |year| Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single();
        let mut promotions = Vec::new();

        if let Some(expires) = end_of(2025) {
            let mut welcome = Promotion::new("WELCOME10", DiscountKind::Percentage, Decimal::new(10, 0), expires);
            welcome.usage_limit = Some(100);
            welcome.description = Some("10% rabatt för nya medlemmar".to_string());
            promotions.push(welcome);
        }
        if let Some(expires) = end_of(2024) {
            let mut save = Promotion::new("SAVE50", DiscountKind::Fixed, Decimal::new(5000, 0), expires);
            save.usage_limit = Some(50);
            save.description = Some("50 kr rabatt".to_string());
            promotions.push(save);
        }

        Self::new(promotions)
    }
}

#[async_trait]
impl PromotionCatalog for StaticCatalog {
    async fn promotions(&self) -> Result<Vec<Promotion>> {
        Ok(self.promotions.clone())
    }
}

/// Evaluates codes against whichever catalog was injected.
#[derive(Clone)]
pub struct DiscountService {
    catalog: Arc<dyn PromotionCatalog>,
}

impl DiscountService {
    pub fn new(catalog: Arc<dyn PromotionCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn validate(&self, code: &str, now: DateTime<Utc>) -> Result<DiscountResult> {
        let promotions = self.catalog.promotions().await?;
        let result = evaluate(code, now, &promotions);
        match &result {
            DiscountResult::Valid { code, .. } => log::info!("Discount code {} accepted", code),
            DiscountResult::Invalid(reason) => log::debug!("Discount code rejected: {}", reason),
        }
        Ok(result)
    }
}

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

/// Signed webhook timestamps older than this are rejected.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("billing request failed: {0}")]
    Request(String),

    #[error("billing API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected billing response: {0}")]
    Decode(String),

    #[error("webhook rejected: {0}")]
    Webhook(String),
}

/// Billing-side view of a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl BillingSubscription {
    /// Ended on the billing side, either immediately or scheduled for period end.
    pub fn is_canceled(&self) -> bool {
        self.cancel_at_period_end || self.status == "canceled"
    }
}

/// Operations the lifecycle manager needs from the payment processor.
#[async_trait]
pub trait BillingService: Send + Sync {
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError>;

    async fn update_subscription(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<BillingSubscription, BillingError>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError>;
}

#[derive(Clone)]
pub struct StripeBillingService {
    client: Client,
    config: StripeConfig,
}

impl StripeBillingService {
    pub fn new(config: StripeConfig) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BillingError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn stripe_request(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<BillingSubscription, BillingError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), endpoint);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None);

        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await.map_err(|e| {
            log::error!("Stripe request to {} failed: {}", endpoint, e);
            BillingError::Request(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::error!("Stripe API error {} on {}: {}", status, endpoint, body);
            return Err(BillingError::Api { status, body });
        }

        response
            .json::<BillingSubscription>()
            .await
            .map_err(|e| BillingError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BillingService for StripeBillingService {
    /// Schedules cancellation at period end so the subscription can still be reactivated.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError> {
        log::info!("Canceling Stripe subscription {} at period end", subscription_id);
        self.update_subscription(subscription_id, true).await
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<BillingSubscription, BillingError> {
        let flag = if cancel_at_period_end { "true" } else { "false" };
        log::info!("Updating Stripe subscription {}: cancel_at_period_end={}", subscription_id, flag);

        self.stripe_request(
            Method::POST,
            &format!("/subscriptions/{}", subscription_id),
            Some(&[("cancel_at_period_end", flag)]),
        )
        .await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError> {
        log::debug!("Retrieving Stripe subscription {}", subscription_id);
        self.stripe_request(Method::GET, &format!("/subscriptions/{}", subscription_id), None)
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    SubscriptionUpdated,
    SubscriptionDeleted,
    Other(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: WebhookEventType,
    pub subscription: Option<BillingSubscription>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Verifies `Stripe-Signature` headers and parses the events we reconcile on.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn verify_and_parse(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, BillingError> {
        self.verify_signature(payload, signature, Utc::now().timestamp())?;

        let raw: RawEvent = serde_json::from_slice(payload).map_err(|e| BillingError::Webhook(e.to_string()))?;
        let event_type = WebhookEventType::from(raw.event_type.as_str());

        let subscription = match event_type {
            WebhookEventType::SubscriptionUpdated | WebhookEventType::SubscriptionDeleted => Some(
                serde_json::from_value(raw.data.object).map_err(|e| BillingError::Webhook(e.to_string()))?,
            ),
            WebhookEventType::Other(_) => None,
        };

        log::debug!("Parsed webhook event {} ({:?})", raw.id, event_type);
        Ok(WebhookEvent { id: raw.id, event_type, subscription })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str, now: i64) -> Result<(), BillingError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| BillingError::Webhook("missing timestamp".to_string()))?;
        if candidates.is_empty() {
            return Err(BillingError::Webhook("missing v1 signature".to_string()));
        }

        let expected = self.sign(timestamp, payload)?;
        if !candidates.iter().any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes())) {
            log::warn!("Webhook signature verification failed");
            return Err(BillingError::Webhook("signature mismatch".to_string()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| BillingError::Webhook("invalid timestamp".to_string()))?;
        if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
            log::warn!("Webhook timestamp {} outside tolerance (now {})", ts, now);
            return Err(BillingError::Webhook("timestamp outside tolerance".to_string()));
        }

        Ok(())
    }

    fn sign(&self, timestamp: &str, payload: &[u8]) -> Result<String, BillingError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| BillingError::Webhook("invalid webhook secret".to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
pub(crate) fn signature_header(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let verifier = WebhookVerifier::new(secret);
    let signature = verifier.sign(&timestamp.to_string(), payload).unwrap();
    format!("t={},v1={}", timestamp, signature)
}

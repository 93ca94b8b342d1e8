use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::common::{BillingInterval, SubscriptionPlan};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Created but not yet confirmed by the billing system.
    Pending,
    Active,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub interval: BillingInterval,
    pub stripe_subscription_id: Option<String>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user_id: Uuid, interval: BillingInterval, stripe_subscription_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: SubscriptionStatus::Active,
            interval,
            stripe_subscription_id,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Canceled;
        self.cancel_at_period_end = true;
        self.canceled_at = Some(now);
        self.updated_at = now;
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Active;
        self.cancel_at_period_end = false;
        self.canceled_at = None;
        self.updated_at = now;
    }

    pub fn plan(&self) -> SubscriptionPlan {
        self.interval.plan()
    }

    /// Plan value mirrored onto the user: nothing while canceled.
    pub fn mirrored_plan(&self) -> SubscriptionPlan {
        match self.status {
            SubscriptionStatus::Active => self.plan(),
            SubscriptionStatus::Canceled | SubscriptionStatus::Pending => SubscriptionPlan::None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

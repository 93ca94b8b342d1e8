use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    common::SubscriptionPlan,
    subscription::{Subscription, SubscriptionStatus},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub subscription_plan: SubscriptionPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: email.to_lowercase(),
            role: Role::User,
            subscription_status: None,
            subscription_plan: SubscriptionPlan::None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copies the denormalized subscription fields from the authoritative record.
    pub fn mirror(&mut self, subscription: &Subscription, now: DateTime<Utc>) {
        self.subscription_status = Some(subscription.status);
        self.subscription_plan = subscription.mirrored_plan();
        self.updated_at = now;
    }

    pub fn mirrors(&self, subscription: &Subscription) -> bool {
        self.subscription_status == Some(subscription.status)
            && self.subscription_plan == subscription.mirrored_plan()
    }
}

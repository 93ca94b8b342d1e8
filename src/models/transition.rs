use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::subscription::SubscriptionStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Cancel,
    Reactivate,
}

impl TransitionKind {
    /// Status the subscription must be in for the transition to start.
    pub fn source_status(&self) -> SubscriptionStatus {
        match self {
            TransitionKind::Cancel => SubscriptionStatus::Active,
            TransitionKind::Reactivate => SubscriptionStatus::Canceled,
        }
    }

    pub fn target_status(&self) -> SubscriptionStatus {
        match self {
            TransitionKind::Cancel => SubscriptionStatus::Canceled,
            TransitionKind::Reactivate => SubscriptionStatus::Active,
        }
    }

    /// Value of `cancel_at_period_end` on the billing side once applied.
    pub fn billing_cancel_at_period_end(&self) -> bool {
        matches!(self, TransitionKind::Cancel)
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Cancel => write!(f, "cancel"),
            TransitionKind::Reactivate => write!(f, "reactivate"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionState {
    Pending,
    BillingApplied,
    Completed,
    Failed,
}

impl TransitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionState::Pending => "pending",
            TransitionState::BillingApplied => "billing-applied",
            TransitionState::Completed => "completed",
            TransitionState::Failed => "failed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TransitionState::Pending | TransitionState::BillingApplied)
    }
}

/// Journal entry written before a lifecycle transition touches the billing system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub kind: TransitionKind,
    pub state: TransitionState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(user_id: Uuid, subscription_id: Uuid, kind: TransitionKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            subscription_id,
            kind,
            state: TransitionState::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, state: TransitionState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = TransitionState::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.updated_at) >= window
    }
}

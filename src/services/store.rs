use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    subscription::{Subscription, SubscriptionStatus},
    transition::{TransitionRecord, TransitionState},
    user::User,
};

/// Persistence the lifecycle manager depends on.
///
/// Lookups that can match several records return the newest by creation time.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_subscription(&self, user_id: &Uuid, status: SubscriptionStatus) -> Result<Option<Subscription>>;
    async fn find_latest_subscription(&self, user_id: &Uuid) -> Result<Option<Subscription>>;
    async fn find_subscription_by_id(&self, subscription_id: &Uuid) -> Result<Option<Subscription>>;
    async fn find_subscription_by_billing_id(&self, billing_id: &str) -> Result<Option<Subscription>>;
    async fn update_subscription(&self, subscription: &Subscription) -> Result<()>;

    async fn find_user(&self, user_id: &Uuid) -> Result<Option<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;

    async fn insert_transition(&self, record: &TransitionRecord) -> Result<()>;
    async fn update_transition(&self, record: &TransitionRecord) -> Result<()>;
    async fn transitions_in_state(&self, state: TransitionState) -> Result<Vec<TransitionRecord>>;
    async fn open_transitions_for(&self, subscription_id: &Uuid) -> Result<Vec<TransitionRecord>>;
}

//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    subscription::{Subscription, SubscriptionStatus},
    transition::{TransitionRecord, TransitionState},
    user::User,
};
use crate::services::{
    store::SubscriptionStore,
    stripe::{BillingError, BillingService, BillingSubscription},
};

#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub subscriptions: Mutex<Vec<Subscription>>,
    pub transitions: Mutex<Vec<TransitionRecord>>,
    pub fail_subscription_updates: AtomicBool,
    pub fail_user_updates: AtomicBool,
}

impl MemoryStore {
    pub fn with(users: Vec<User>, subscriptions: Vec<Subscription>) -> Self {
        Self {
            users: Mutex::new(users),
            subscriptions: Mutex::new(subscriptions),
            ..Self::default()
        }
    }

    pub fn subscription(&self, id: &Uuid) -> Subscription {
        self.subscriptions.lock().unwrap().iter().find(|s| s.id == *id).cloned().unwrap()
    }

    pub fn user(&self, id: &Uuid) -> User {
        self.users.lock().unwrap().iter().find(|u| u.id == *id).cloned().unwrap()
    }

    pub fn journal(&self) -> Vec<TransitionRecord> {
        self.transitions.lock().unwrap().clone()
    }
}

fn newest(mut subscriptions: Vec<Subscription>) -> Option<Subscription> {
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    subscriptions.into_iter().next()
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_subscription(&self, user_id: &Uuid, status: SubscriptionStatus) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(newest(
            subscriptions.iter().filter(|s| s.user_id == *user_id && s.status == status).cloned().collect(),
        ))
    }

    async fn find_latest_subscription(&self, user_id: &Uuid) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(newest(subscriptions.iter().filter(|s| s.user_id == *user_id).cloned().collect()))
    }

    async fn find_subscription_by_id(&self, subscription_id: &Uuid) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(subscriptions.iter().find(|s| s.id == *subscription_id).cloned())
    }

    async fn find_subscription_by_billing_id(&self, billing_id: &str) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(newest(
            subscriptions
                .iter()
                .filter(|s| s.stripe_subscription_id.as_deref() == Some(billing_id))
                .cloned()
                .collect(),
        ))
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        if self.fail_subscription_updates.load(Ordering::SeqCst) {
            return Err(anyhow!("subscriptions table unavailable"));
        }
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let slot = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| anyhow!("no subscription {}", subscription.id))?;
        *slot = subscription.clone();
        Ok(())
    }

    async fn find_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == *user_id).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        if self.fail_user_updates.load(Ordering::SeqCst) {
            return Err(anyhow!("users table unavailable"));
        }
        let mut users = self.users.lock().unwrap();
        let slot = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| anyhow!("no user {}", user.id))?;
        *slot = user.clone();
        Ok(())
    }

    async fn insert_transition(&self, record: &TransitionRecord) -> Result<()> {
        self.transitions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn update_transition(&self, record: &TransitionRecord) -> Result<()> {
        let mut transitions = self.transitions.lock().unwrap();
        let slot = transitions
            .iter_mut()
            .find(|t| t.id == record.id)
            .ok_or_else(|| anyhow!("no transition {}", record.id))?;
        *slot = record.clone();
        Ok(())
    }

    async fn transitions_in_state(&self, state: TransitionState) -> Result<Vec<TransitionRecord>> {
        Ok(self.transitions.lock().unwrap().iter().filter(|t| t.state == state).cloned().collect())
    }

    async fn open_transitions_for(&self, subscription_id: &Uuid) -> Result<Vec<TransitionRecord>> {
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.subscription_id == *subscription_id && t.state.is_open())
            .cloned()
            .collect())
    }
}

/// Billing double that remembers every call and the resulting remote state.
#[derive(Default)]
pub struct FakeBilling {
    pub calls: Mutex<Vec<String>>,
    pub remote: Mutex<HashMap<String, BillingSubscription>>,
    pub fail: AtomicBool,
}

impl FakeBilling {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_remote(&self, id: &str, cancel_at_period_end: bool) {
        self.set_remote_state(id, "active", cancel_at_period_end);
    }

    pub fn set_remote_state(&self, id: &str, status: &str, cancel_at_period_end: bool) {
        let mut state = remote(id, cancel_at_period_end);
        state.status = status.to_string();
        self.remote.lock().unwrap().insert(id.to_string(), state);
    }

    fn apply(&self, call: String, id: &str, cancel_at_period_end: bool) -> Result<BillingSubscription, BillingError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Api { status: 502, body: "upstream unavailable".to_string() });
        }
        let state = remote(id, cancel_at_period_end);
        self.remote.lock().unwrap().insert(id.to_string(), state.clone());
        Ok(state)
    }
}

fn remote(id: &str, cancel_at_period_end: bool) -> BillingSubscription {
    BillingSubscription {
        id: id.to_string(),
        status: "active".to_string(),
        cancel_at_period_end,
    }
}

#[async_trait]
impl BillingService for FakeBilling {
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError> {
        self.apply(format!("cancel:{}", subscription_id), subscription_id, true)
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<BillingSubscription, BillingError> {
        self.apply(
            format!("update:{}:{}", subscription_id, cancel_at_period_end),
            subscription_id,
            cancel_at_period_end,
        )
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<BillingSubscription, BillingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Request("timeout".to_string()));
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .unwrap_or_else(|| remote(subscription_id, false)))
    }
}

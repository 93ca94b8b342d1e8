use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    subscription::{Subscription, SubscriptionStatus},
    transition::{TransitionKind, TransitionRecord, TransitionState},
};
use crate::services::{
    session::Requester,
    store::SubscriptionStore,
    stripe::{BillingError, BillingService, WebhookEvent, WebhookEventType},
};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("requester may not manage this user's subscription")]
    Forbidden,

    #[error("no matching subscription")]
    NotFound,

    #[error("billing system rejected the change: {0}")]
    Upstream(#[from] BillingError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Serializes lifecycle work per user within this process.
#[derive(Clone, Default)]
struct UserLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the table still references are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: usize,
    pub failed: usize,
    pub deferred: usize,
}

/// Moves subscriptions between `active` and `canceled`, keeping the billing
/// system, the subscription record and the user mirror in step.
#[derive(Clone)]
pub struct SubscriptionLifecycleManager {
    store: Arc<dyn SubscriptionStore>,
    billing: Arc<dyn BillingService>,
    locks: UserLocks,
    stale_after: Duration,
}

impl SubscriptionLifecycleManager {
    pub fn new(store: Arc<dyn SubscriptionStore>, billing: Arc<dyn BillingService>, stale_after: Duration) -> Self {
        Self {
            store,
            billing,
            locks: UserLocks::default(),
            stale_after,
        }
    }

    pub async fn cancel(&self, user_id: Uuid, requester: &Requester) -> Result<Subscription, LifecycleError> {
        self.transition(user_id, requester, TransitionKind::Cancel).await
    }

    pub async fn reactivate(&self, user_id: Uuid, requester: &Requester) -> Result<Subscription, LifecycleError> {
        self.transition(user_id, requester, TransitionKind::Reactivate).await
    }

    /// Newest subscription of any status.
    pub async fn current(&self, user_id: Uuid, requester: &Requester) -> Result<Subscription, LifecycleError> {
        authorize(requester, &user_id)?;
        self.store
            .find_latest_subscription(&user_id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    async fn transition(
        &self,
        user_id: Uuid,
        requester: &Requester,
        kind: TransitionKind,
    ) -> Result<Subscription, LifecycleError> {
        authorize(requester, &user_id)?;
        let _guard = self.locks.acquire(user_id).await;

        let mut subscription = self
            .store
            .find_subscription(&user_id, kind.source_status())
            .await?
            .ok_or(LifecycleError::NotFound)?;

        let mut record = TransitionRecord::new(user_id, subscription.id, kind, Utc::now());
        self.store.insert_transition(&record).await?;

        if let Some(billing_id) = subscription.stripe_subscription_id.clone() {
            if let Err(e) = self.apply_billing(kind, &billing_id).await {
                log::error!("{} of subscription {} failed at billing: {}", kind, subscription.id, e);
                record.fail(e.to_string(), Utc::now());
                self.journal(&record).await;
                return Err(e.into());
            }
        }

        record.advance(TransitionState::BillingApplied, Utc::now());
        self.journal(&record).await;

        if let Err(e) = self.settle(kind, &mut subscription, Utc::now()).await {
            log::error!(
                "{} of subscription {} applied at billing but not locally: {}",
                kind, subscription.id, e
            );
            return Err(e);
        }

        record.advance(TransitionState::Completed, Utc::now());
        self.journal(&record).await;

        log::info!("Subscription {} for user {}: {}", subscription.id, user_id, kind);
        Ok(subscription)
    }

    async fn apply_billing(&self, kind: TransitionKind, billing_id: &str) -> Result<(), BillingError> {
        match kind {
            TransitionKind::Cancel => self.billing.cancel_subscription(billing_id).await?,
            TransitionKind::Reactivate => self.billing.update_subscription(billing_id, false).await?,
        };
        Ok(())
    }

    /// Applies the local half of a transition. Safe to repeat.
    async fn settle(
        &self,
        kind: TransitionKind,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if subscription.status != kind.target_status() {
            match kind {
                TransitionKind::Cancel => subscription.cancel(now),
                TransitionKind::Reactivate => subscription.reactivate(now),
            }
            self.store.update_subscription(subscription).await?;
        }
        self.mirror_user(subscription.user_id, now).await
    }

    /// Rebuilds the user's mirrored fields from the subscription that currently
    /// governs access: the newest active one, else the newest of any status.
    async fn mirror_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        let mut user = self
            .store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} missing while mirroring subscription state", user_id))?;

        let governing = match self.store.find_subscription(&user_id, SubscriptionStatus::Active).await? {
            Some(active) => Some(active),
            None => self.store.find_latest_subscription(&user_id).await?,
        };
        let Some(governing) = governing else {
            return Err(anyhow!("user {} has no subscription to mirror", user_id).into());
        };

        if user.mirrors(&governing) {
            return Ok(());
        }
        user.mirror(&governing, now);
        self.store.update_user(&user).await?;
        Ok(())
    }

    /// Journal writes never decide the outcome of a request; a stale entry is
    /// picked up by the next reconciliation pass.
    async fn journal(&self, record: &TransitionRecord) {
        if let Err(e) = self.store.update_transition(record).await {
            log::warn!("Could not move transition {} to {}: {}", record.id, record.state.as_str(), e);
        }
    }

    /// Brings local records in line with a billing webhook. The event only says
    /// which subscription changed; its state is read back from billing, since
    /// deliveries can arrive late or out of order.
    pub async fn apply_billing_event(&self, event: &WebhookEvent) -> Result<Option<Subscription>, LifecycleError> {
        let Some(billing_id) = event.subscription.as_ref().map(|billing| billing.id.as_str()) else {
            log::debug!("Ignoring webhook event {} ({:?})", event.id, event.event_type);
            return Ok(None);
        };

        let Some(found) = self.store.find_subscription_by_billing_id(billing_id).await? else {
            log::info!("Webhook {} references unknown billing subscription {}", event.id, billing_id);
            return Ok(None);
        };

        let _guard = self.locks.acquire(found.user_id).await;
        let mut subscription = self
            .store
            .find_subscription_by_id(&found.id)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        let live = self.billing.retrieve_subscription(billing_id).await?;

        // Deletion is final on the billing side.
        let kind = if event.event_type == WebhookEventType::SubscriptionDeleted || live.is_canceled() {
            TransitionKind::Cancel
        } else if matches!(live.status.as_str(), "active" | "trialing") {
            TransitionKind::Reactivate
        } else {
            log::info!("Billing status {} for {} leaves local state as is", live.status, live.id);
            return Ok(Some(subscription));
        };

        let now = Utc::now();
        if subscription.status != kind.target_status() {
            log::warn!(
                "Subscription {} diverged from billing ({} locally), applying {}",
                subscription.id, subscription.status, kind
            );
        }
        self.settle(kind, &mut subscription, now).await?;

        for mut record in self.store.open_transitions_for(&subscription.id).await? {
            if record.kind == kind {
                record.advance(TransitionState::Completed, now);
            } else {
                record.fail(format!("superseded by billing event {}", event.id), now);
            }
            self.journal(&record).await;
        }

        Ok(Some(subscription))
    }

    /// One reconciliation pass over the transition journal.
    pub async fn reconcile_pending(&self, now: DateTime<Utc>) -> Result<ReconcileReport, LifecycleError> {
        let mut report = ReconcileReport::default();

        for record in self.store.transitions_in_state(TransitionState::BillingApplied).await? {
            self.resolve(record, now, &mut report, false).await;
        }

        for record in self.store.transitions_in_state(TransitionState::Pending).await? {
            if record.is_stale(now, self.stale_after) {
                self.resolve(record, now, &mut report, true).await;
            }
        }

        if report != ReconcileReport::default() {
            log::info!(
                "Reconciliation: {} completed, {} failed, {} deferred",
                report.completed, report.failed, report.deferred
            );
        }
        Ok(report)
    }

    async fn resolve(&self, record: TransitionRecord, now: DateTime<Utc>, report: &mut ReconcileReport, confirm: bool) {
        let _guard = self.locks.acquire(record.user_id).await;

        match self.resolve_locked(record, now, confirm).await {
            Ok(Some(TransitionState::Completed)) => report.completed += 1,
            Ok(Some(TransitionState::Failed)) => report.failed += 1,
            Ok(_) => {}
            Err(e) => {
                log::warn!("Reconciliation deferred: {}", e);
                report.deferred += 1;
            }
        }
    }

    async fn resolve_locked(
        &self,
        mut record: TransitionRecord,
        now: DateTime<Utc>,
        confirm: bool,
    ) -> Result<Option<TransitionState>, LifecycleError> {
        // A request may have finished the entry while we waited for the lock.
        let still_open = self
            .store
            .open_transitions_for(&record.subscription_id)
            .await?
            .into_iter()
            .find(|open| open.id == record.id);
        let Some(current) = still_open else {
            return Ok(None);
        };
        if current.state != record.state {
            return Ok(None);
        }

        let Some(mut subscription) = self.store.find_subscription_by_id(&record.subscription_id).await? else {
            record.fail("subscription no longer exists", now);
            self.journal(&record).await;
            return Ok(Some(TransitionState::Failed));
        };

        if confirm {
            let applied = match &subscription.stripe_subscription_id {
                Some(billing_id) => {
                    let remote = self.billing.retrieve_subscription(billing_id).await?;
                    remote.is_canceled() == record.kind.billing_cancel_at_period_end()
                }
                None => false,
            };
            if !applied {
                record.fail("billing change was never applied", now);
                self.journal(&record).await;
                return Ok(Some(TransitionState::Failed));
            }
        }

        let expected = [record.kind.source_status(), record.kind.target_status()];
        if !expected.contains(&subscription.status) {
            record.fail(format!("subscription is {}", subscription.status), now);
            self.journal(&record).await;
            return Ok(Some(TransitionState::Failed));
        }

        self.settle(record.kind, &mut subscription, now).await?;
        record.advance(TransitionState::Completed, now);
        self.journal(&record).await;
        log::info!("Reconciled {} of subscription {}", record.kind, subscription.id);
        Ok(Some(TransitionState::Completed))
    }
}

fn authorize(requester: &Requester, user_id: &Uuid) -> Result<(), LifecycleError> {
    if requester.may_act_for(user_id) {
        Ok(())
    } else {
        log::warn!("User {} tried to manage subscription of {}", requester.user_id, user_id);
        Err(LifecycleError::Forbidden)
    }
}

use std::time::Duration;

use chrono::Utc;

use crate::services::lifecycle::SubscriptionLifecycleManager;

/// Periodically finishes or fails journal entries left open by interrupted transitions.
pub async fn start_reconcile_task(manager: SubscriptionLifecycleManager, every: Duration) {
    log::info!("Reconciliation task running every {}s", every.as_secs());
    let mut ticker = tokio::time::interval(every);

    loop {
        ticker.tick().await;
        run_once(&manager).await;
    }
}

async fn run_once(manager: &SubscriptionLifecycleManager) {
    match manager.reconcile_pending(Utc::now()).await {
        Ok(report) => log::debug!("Reconciliation pass done: {:?}", report),
        Err(e) => log::error!("Reconciliation pass failed: {}", e),
    }
}

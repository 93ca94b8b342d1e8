use surrealdb::{Surreal, engine::any::{self, Any}};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;
use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::models::{
    promotion::Promotion,
    subscription::{Subscription, SubscriptionStatus},
    transition::{TransitionRecord, TransitionState},
    user::User,
};
use crate::services::{discount::PromotionCatalog, store::SubscriptionStore};

const SUBSCRIPTIONS: &str = "subscriptions";
const USERS: &str = "users";
const TRANSITIONS: &str = "transitions";
const PROMOTIONS: &str = "promotions";

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Any>,
}

impl DatabaseService {
    /// Connects to `mem://` for an embedded store or any remote SurrealDB endpoint.
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = any::connect(database_url).await?;
        db.use_ns("vinakademin").use_db("billing").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db.query("
            DEFINE TABLE subscriptions SCHEMALESS;
            DEFINE INDEX subscription_uid ON subscriptions COLUMNS uid UNIQUE;
            DEFINE INDEX subscription_owner ON subscriptions COLUMNS userId, status;
            DEFINE INDEX subscription_billing ON subscriptions COLUMNS stripeSubscriptionId;
        ").await?.check()?;

        self.db.query("
            DEFINE TABLE users SCHEMALESS;
            DEFINE INDEX user_uid ON users COLUMNS uid UNIQUE;
            DEFINE INDEX unique_email ON users COLUMNS email UNIQUE;
        ").await?.check()?;

        self.db.query("
            DEFINE TABLE transitions SCHEMALESS;
            DEFINE INDEX transition_uid ON transitions COLUMNS uid UNIQUE;
            DEFINE INDEX transition_state ON transitions COLUMNS state;
        ").await?.check()?;

        self.db.query("
            DEFINE TABLE promotions SCHEMALESS;
            DEFINE INDEX unique_code ON promotions COLUMNS code UNIQUE;
        ").await?.check()?;

        log::info!("Database schema initialized successfully");
        Ok(())
    }

    async fn insert<T: Serialize>(&self, table: &str, record: &T) -> Result<()> {
        let (uid, row) = to_row(record)?;
        let created: Vec<Value> = self.db
            .query("CREATE type::thing($table, $uid) CONTENT $data")
            .bind(("table", table.to_string()))
            .bind(("uid", uid))
            .bind(("data", row))
            .await?
            .take(0)?;

        if created.is_empty() {
            return Err(anyhow!("Failed to create record in {}", table));
        }
        Ok(())
    }

    async fn update<T: Serialize>(&self, table: &str, record: &T) -> Result<()> {
        let (uid, row) = to_row(record)?;
        let updated: Vec<Value> = self.db
            .query("UPDATE type::table($table) CONTENT $data WHERE uid = $uid")
            .bind(("table", table.to_string()))
            .bind(("uid", uid.clone()))
            .bind(("data", row))
            .await?
            .take(0)?;

        if updated.is_empty() {
            return Err(anyhow!("No record {} in {}", uid, table));
        }
        Ok(())
    }

    async fn select_where<T: DeserializeOwned>(
        &self,
        table: &str,
        condition: &str,
        bindings: Vec<(&'static str, String)>,
    ) -> Result<Vec<T>> {
        let sql = format!("SELECT * FROM type::table($table) WHERE {}", condition);
        let mut query = self.db.query(sql).bind(("table", table.to_string()));
        for binding in bindings {
            query = query.bind(binding);
        }

        let rows: Vec<Value> = query.await?.take(0)?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn insert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let created: Vec<Value> = self.db
            .query("CREATE type::table($table) CONTENT $data")
            .bind(("table", PROMOTIONS.to_string()))
            .bind(("data", serde_json::to_value(promotion)?))
            .await?
            .take(0)?;

        if created.is_empty() {
            return Err(anyhow!("Failed to create promotion {}", promotion.code));
        }
        Ok(())
    }

    /// Fills an empty promotions table. Returns how many codes were written.
    pub async fn seed_promotions(&self, promotions: &[Promotion]) -> Result<usize> {
        if !self.promotions().await?.is_empty() {
            return Ok(0);
        }
        for promotion in promotions {
            self.insert_promotion(promotion).await?;
        }
        log::info!("Seeded {} promotions", promotions.len());
        Ok(promotions.len())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

fn newest_first(mut subscriptions: Vec<Subscription>) -> Option<Subscription> {
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    subscriptions.into_iter().next()
}

/// Record ids live in `uid`; SurrealDB owns the `id` field.
fn to_row<T: Serialize>(record: &T) -> Result<(String, Value)> {
    let mut row = serde_json::to_value(record)?;
    let object = row
        .as_object_mut()
        .ok_or_else(|| anyhow!("Record does not serialize to an object"))?;

    let uid = object
        .remove("id")
        .and_then(|id| id.as_str().map(str::to_string))
        .ok_or_else(|| anyhow!("Record has no string id"))?;
    object.insert("uid".to_string(), Value::String(uid.clone()));

    Ok((uid, row))
}

fn from_row<T: DeserializeOwned>(mut row: Value) -> Result<T> {
    if let Some(object) = row.as_object_mut() {
        object.remove("id");
        if let Some(uid) = object.remove("uid") {
            object.insert("id".to_string(), uid);
        }
    }
    Ok(serde_json::from_value(row)?)
}

#[async_trait]
impl SubscriptionStore for DatabaseService {
    async fn find_subscription(&self, user_id: &Uuid, status: SubscriptionStatus) -> Result<Option<Subscription>> {
        let subscriptions = self
            .select_where(
                SUBSCRIPTIONS,
                "userId = $user_id AND status = $status",
                vec![("user_id", user_id.to_string()), ("status", status.as_str().to_string())],
            )
            .await?;
        Ok(newest_first(subscriptions))
    }

    async fn find_latest_subscription(&self, user_id: &Uuid) -> Result<Option<Subscription>> {
        let subscriptions = self
            .select_where(SUBSCRIPTIONS, "userId = $user_id", vec![("user_id", user_id.to_string())])
            .await?;
        Ok(newest_first(subscriptions))
    }

    async fn find_subscription_by_id(&self, subscription_id: &Uuid) -> Result<Option<Subscription>> {
        let subscriptions = self
            .select_where(SUBSCRIPTIONS, "uid = $uid", vec![("uid", subscription_id.to_string())])
            .await?;
        Ok(subscriptions.into_iter().next())
    }

    async fn find_subscription_by_billing_id(&self, billing_id: &str) -> Result<Option<Subscription>> {
        let subscriptions = self
            .select_where(
                SUBSCRIPTIONS,
                "stripeSubscriptionId = $billing_id",
                vec![("billing_id", billing_id.to_string())],
            )
            .await?;
        Ok(newest_first(subscriptions))
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.update(SUBSCRIPTIONS, subscription).await
    }

    async fn find_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let users = self
            .select_where(USERS, "uid = $uid", vec![("uid", user_id.to_string())])
            .await?;
        Ok(users.into_iter().next())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.update(USERS, user).await
    }

    async fn insert_transition(&self, record: &TransitionRecord) -> Result<()> {
        self.insert(TRANSITIONS, record).await
    }

    async fn update_transition(&self, record: &TransitionRecord) -> Result<()> {
        self.update(TRANSITIONS, record).await
    }

    async fn transitions_in_state(&self, state: TransitionState) -> Result<Vec<TransitionRecord>> {
        let mut records: Vec<TransitionRecord> = self
            .select_where(TRANSITIONS, "state = $state", vec![("state", state.as_str().to_string())])
            .await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn open_transitions_for(&self, subscription_id: &Uuid) -> Result<Vec<TransitionRecord>> {
        let records: Vec<TransitionRecord> = self
            .select_where(
                TRANSITIONS,
                "subscriptionId = $subscription_id AND state IN [$pending, $applied]",
                vec![
                    ("subscription_id", subscription_id.to_string()),
                    ("pending", TransitionState::Pending.as_str().to_string()),
                    ("applied", TransitionState::BillingApplied.as_str().to_string()),
                ],
            )
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl PromotionCatalog for DatabaseService {
    async fn promotions(&self) -> Result<Vec<Promotion>> {
        let rows: Vec<Value> = self.db
            .query("SELECT * FROM type::table($table)")
            .bind(("table", PROMOTIONS.to_string()))
            .await?
            .take(0)?;
        rows.into_iter().map(from_row).collect()
    }
}

/// Records are created by the signup and checkout flows; tests seed them directly.
#[cfg(test)]
impl DatabaseService {
    pub async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.insert(SUBSCRIPTIONS, subscription).await
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        self.insert(USERS, user).await
    }
}

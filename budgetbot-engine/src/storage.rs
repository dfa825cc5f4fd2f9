use crate::{
    Balance, BalanceSubscription, Category, Operation, OperationType, ScheduledOccurrence,
};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type Result<T> = anyhow::Result<T>;

/// Storage for subscriptions (owned by the user-facing flows; the
/// scheduler only reads).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, id: &str) -> Result<Option<BalanceSubscription>>;
    async fn create_subscription(&self, sub: &BalanceSubscription) -> Result<()>;
    async fn update_subscription(&self, sub: &BalanceSubscription) -> Result<()>;
    async fn delete_subscription(&self, id: &str) -> Result<()>;
    async fn list_subscriptions(&self) -> Result<Vec<BalanceSubscription>>;
}

/// Durable timer queue of scheduled occurrences.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    async fn create_occurrence(&self, occurrence: &ScheduledOccurrence) -> Result<()>;
    /// Deleting an occurrence that no longer exists is not an error.
    async fn delete_occurrence(&self, id: &str) -> Result<()>;
    /// Occurrences with `from <= scheduled_at <= to`, earliest first.
    async fn list_occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledOccurrence>>;
    async fn list_occurrences_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<ScheduledOccurrence>>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, id: &str) -> Result<Option<Balance>>;
    async fn update_balance(&self, balance: &Balance) -> Result<()>;
    async fn create_balance(&self, balance: &Balance) -> Result<()>;
    async fn list_balances(&self) -> Result<Vec<Balance>>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn get_category(&self, id: &str) -> Result<Option<Category>>;
    async fn create_category(&self, category: &Category) -> Result<()>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn create_operation(&self, operation: &Operation) -> Result<()>;
    async fn get_operation(&self, id: &str) -> Result<Option<Operation>>;
    async fn update_operation(&self, operation: &Operation) -> Result<()>;
    /// Deleting an operation that no longer exists is not an error.
    async fn delete_operation(&self, id: &str) -> Result<()>;
    /// Operations on a balance, oldest first. Includes plain `transfer`
    /// operations where the balance is the destination; a rated transfer
    /// already has its own `transfer_in` row there.
    async fn list_operations(&self, balance_id: &str) -> Result<Vec<Operation>>;
    /// The operation materialized from `occurrence_id`, if one was recorded.
    async fn find_by_occurrence(&self, occurrence_id: &str) -> Result<Option<Operation>>;
}

/// The set of stores the engine works against.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct Stores {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub occurrences: Arc<dyn OccurrenceStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub operations: Arc<dyn OperationStore>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: SubscriptionStore
            + OccurrenceStore
            + BalanceStore
            + CategoryStore
            + OperationStore
            + 'static,
    {
        Self {
            subscriptions: store.clone(),
            occurrences: store.clone(),
            balances: store.clone(),
            categories: store.clone(),
            operations: store,
        }
    }
}

const BALANCES: &str = "balances";
const CATEGORIES: &str = "categories";
const SUBSCRIPTIONS: &str = "subscriptions";
const OCCURRENCES: &str = "occurrences";
const OPERATIONS: &str = "operations";

/// File-based storage: one JSON document per record.
///
/// ```text
/// <base>/balances/<id>.json
/// <base>/categories/<id>.json
/// <base>/subscriptions/<id>.json
/// <base>/occurrences/<id>.json
/// <base>/operations/<id>.json
/// ```
///
/// Each write lands in a temp file that is renamed over the target, so a
/// single record update is atomic. There is no multi-record transaction.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        for dir in [BALANCES, CATEGORIES, SUBSCRIPTIONS, OCCURRENCES, OPERATIONS] {
            std::fs::create_dir_all(base_path.join(dir))
                .with_context(|| format!("creating {}", base_path.join(dir).display()))?;
        }
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            bail!("invalid record id {:?}", id);
        }
        Ok(self
            .base_path
            .join(collection)
            .join(format!("{}.json", id)))
    }

    fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.record_path(collection, id)?.exists())
    }

    fn write_record<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        let path = self.record_path(collection, id)?;
        let tmp = path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4().simple()));
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            anyhow!("replacing {}: {}", path.display(), e)
        })
    }

    fn read_record<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let path = self.record_path(collection, id)?;
        match std::fs::read_to_string(&path) {
            Ok(json) => {
                let record = serde_json::from_str(&json)
                    .with_context(|| format!("decoding {}", path.display()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("reading {}: {}", path.display(), e)),
        }
    }

    fn read_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.base_path.join(collection);
        let mut records = Vec::new();

        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let json = match std::fs::read_to_string(&path) {
                Ok(json) => json,
                // Removed between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(anyhow!("reading {}: {}", path.display(), e)),
            };
            records.push(
                serde_json::from_str(&json)
                    .with_context(|| format!("decoding {}", path.display()))?,
            );
        }

        Ok(records)
    }

    fn remove_record(&self, collection: &str, id: &str) -> Result<bool> {
        let path = self.record_path(collection, id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow!("removing {}: {}", path.display(), e)),
        }
    }

    fn insert_new<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        if self.exists(collection, id)? {
            bail!("{} record {} already exists", collection, id);
        }
        self.write_record(collection, id, value)
    }

    fn replace<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        if !self.exists(collection, id)? {
            bail!("{} record {} does not exist", collection, id);
        }
        self.write_record(collection, id, value)
    }
}

#[async_trait]
impl SubscriptionStore for FileStorage {
    async fn get_subscription(&self, id: &str) -> Result<Option<BalanceSubscription>> {
        self.read_record(SUBSCRIPTIONS, id)
    }

    async fn create_subscription(&self, sub: &BalanceSubscription) -> Result<()> {
        self.insert_new(SUBSCRIPTIONS, &sub.subscription_id, sub)
    }

    async fn update_subscription(&self, sub: &BalanceSubscription) -> Result<()> {
        self.replace(SUBSCRIPTIONS, &sub.subscription_id, sub)
    }

    async fn delete_subscription(&self, id: &str) -> Result<()> {
        if !self.remove_record(SUBSCRIPTIONS, id)? {
            bail!("subscriptions record {} does not exist", id);
        }
        Ok(())
    }

    async fn list_subscriptions(&self) -> Result<Vec<BalanceSubscription>> {
        let mut subs: Vec<BalanceSubscription> = self.read_all(SUBSCRIPTIONS)?;
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subs)
    }
}

#[async_trait]
impl OccurrenceStore for FileStorage {
    async fn create_occurrence(&self, occurrence: &ScheduledOccurrence) -> Result<()> {
        self.insert_new(OCCURRENCES, &occurrence.occurrence_id, occurrence)
    }

    async fn delete_occurrence(&self, id: &str) -> Result<()> {
        self.remove_record(OCCURRENCES, id)?;
        Ok(())
    }

    async fn list_occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledOccurrence>> {
        let mut due: Vec<ScheduledOccurrence> = self
            .read_all::<ScheduledOccurrence>(OCCURRENCES)?
            .into_iter()
            .filter(|o| o.scheduled_at >= from && o.scheduled_at <= to)
            .collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(due)
    }

    async fn list_occurrences_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<ScheduledOccurrence>> {
        let mut pending: Vec<ScheduledOccurrence> = self
            .read_all::<ScheduledOccurrence>(OCCURRENCES)?
            .into_iter()
            .filter(|o| o.subscription_id == subscription_id)
            .collect();
        pending.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(pending)
    }
}

#[async_trait]
impl BalanceStore for FileStorage {
    async fn get_balance(&self, id: &str) -> Result<Option<Balance>> {
        self.read_record(BALANCES, id)
    }

    async fn update_balance(&self, balance: &Balance) -> Result<()> {
        self.replace(BALANCES, &balance.balance_id, balance)
    }

    async fn create_balance(&self, balance: &Balance) -> Result<()> {
        self.insert_new(BALANCES, &balance.balance_id, balance)
    }

    async fn list_balances(&self) -> Result<Vec<Balance>> {
        let mut balances: Vec<Balance> = self.read_all(BALANCES)?;
        balances.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(balances)
    }
}

#[async_trait]
impl CategoryStore for FileStorage {
    async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.read_record(CATEGORIES, id)
    }

    async fn create_category(&self, category: &Category) -> Result<()> {
        self.insert_new(CATEGORIES, &category.category_id, category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self.read_all(CATEGORIES)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }
}

#[async_trait]
impl OperationStore for FileStorage {
    async fn create_operation(&self, operation: &Operation) -> Result<()> {
        self.insert_new(OPERATIONS, &operation.operation_id, operation)
    }

    async fn get_operation(&self, id: &str) -> Result<Option<Operation>> {
        self.read_record(OPERATIONS, id)
    }

    async fn update_operation(&self, operation: &Operation) -> Result<()> {
        self.replace(OPERATIONS, &operation.operation_id, operation)
    }

    async fn delete_operation(&self, id: &str) -> Result<()> {
        self.remove_record(OPERATIONS, id)?;
        Ok(())
    }

    async fn list_operations(&self, balance_id: &str) -> Result<Vec<Operation>> {
        let mut ops: Vec<Operation> = self
            .read_all::<Operation>(OPERATIONS)?
            .into_iter()
            .filter(|op| {
                op.balance_id == balance_id
                    || (op.kind == OperationType::Transfer
                        && op.transfer_balance_id.as_deref() == Some(balance_id))
            })
            .collect();
        ops.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(ops)
    }

    async fn find_by_occurrence(&self, occurrence_id: &str) -> Result<Option<Operation>> {
        Ok(self
            .read_all::<Operation>(OPERATIONS)?
            .into_iter()
            .find(|op| op.occurrence_id.as_deref() == Some(occurrence_id)))
    }
}

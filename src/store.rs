//! Message store: the durable record of every submitted message.
//!
//! [`Store`] is the raw key-value seam (a DynamoDB-style table of string
//! attribute maps). [`MessageStore`] layers typed records and the lifecycle
//! rules on top of it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::DispatchError;
use crate::record::{attr, Item, MessageRecord, MessageState};

/// Key-value table storage.
///
/// Items are keyed by their `id` attribute.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch an item by key.
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, DispatchError>;

    /// Insert or replace an item.
    async fn put(&self, table: &str, item: Item) -> Result<(), DispatchError>;

    /// Insert only if no item with `key` exists. Returns `false` when the key is taken.
    async fn put_if_absent(&self, table: &str, key: &str, item: Item)
        -> Result<bool, DispatchError>;

    /// Replace an existing item only while its `attribute` still equals
    /// `expected`. Returns `false` when the item is missing or has moved on.
    async fn put_if_equal(
        &self,
        table: &str,
        item: Item,
        attribute: &str,
        expected: &str,
    ) -> Result<bool, DispatchError>;

    /// Every item in the table.
    async fn scan(&self, table: &str) -> Result<Vec<Item>, DispatchError>;
}

/// Thread-safe in-memory [`Store`].
///
/// Supports failure injection for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Item>>>,
    fail_with: RwLock<Option<String>>,
    fail_puts_with: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every operation fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.write() = Some(message.into());
    }

    /// Make only writes fail; reads keep working.
    pub fn set_write_failure(&self, message: impl Into<String>) {
        *self.fail_puts_with.write() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.write() = None;
        *self.fail_puts_with.write() = None;
    }

    /// Number of items in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn check(&self) -> Result<(), DispatchError> {
        match self.fail_with.read().as_ref() {
            Some(message) => Err(DispatchError::Store(message.clone())),
            None => Ok(()),
        }
    }

    fn check_write(&self) -> Result<(), DispatchError> {
        self.check()?;
        match self.fail_puts_with.read().as_ref() {
            Some(message) => Err(DispatchError::Store(message.clone())),
            None => Ok(()),
        }
    }
}

fn key_of(item: &Item) -> Result<&str, DispatchError> {
    item.get(attr::ID)
        .map(String::as_str)
        .ok_or_else(|| DispatchError::Store(format!("item has no '{}' attribute", attr::ID)))
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, DispatchError> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    async fn put(&self, table: &str, item: Item) -> Result<(), DispatchError> {
        self.check_write()?;
        let key = key_of(&item)?.to_string();
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        table: &str,
        key: &str,
        item: Item,
    ) -> Result<bool, DispatchError> {
        self.check_write()?;
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(key.to_string(), item);
        Ok(true)
    }

    async fn put_if_equal(
        &self,
        table: &str,
        item: Item,
        attribute: &str,
        expected: &str,
    ) -> Result<bool, DispatchError> {
        self.check_write()?;
        let key = key_of(&item)?.to_string();
        let mut tables = self.tables.write();
        let Some(slot) = tables.get_mut(table).and_then(|rows| rows.get_mut(&key)) else {
            return Ok(false);
        };
        if slot.get(attribute).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        *slot = item;
        Ok(true)
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>, DispatchError> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, DispatchError> {
        (**self).get(table, key).await
    }

    async fn put(&self, table: &str, item: Item) -> Result<(), DispatchError> {
        (**self).put(table, item).await
    }

    async fn put_if_absent(
        &self,
        table: &str,
        key: &str,
        item: Item,
    ) -> Result<bool, DispatchError> {
        (**self).put_if_absent(table, key, item).await
    }

    async fn put_if_equal(
        &self,
        table: &str,
        item: Item,
        attribute: &str,
        expected: &str,
    ) -> Result<bool, DispatchError> {
        (**self).put_if_equal(table, item, attribute, expected).await
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>, DispatchError> {
        (**self).scan(table).await
    }
}

// State only moves forward, so a save can lose the race at most once per state.
const SAVE_ATTEMPTS: usize = 4;

/// Typed access to message records in one table.
///
/// Writes through [`MessageStore::save`] are conditional on the stored state
/// they were checked against, so a stale copy can never drag a `Sent` record
/// back to `QueuedForSend`.
#[derive(Clone)]
pub struct MessageStore {
    store: Arc<dyn Store>,
    table: String,
}

impl MessageStore {
    pub fn new(store: Arc<dyn Store>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn get(&self, id: &str) -> Result<Option<MessageRecord>, DispatchError> {
        self.store
            .get(&self.table, id)
            .await?
            .map(|item| MessageRecord::from_item(&item))
            .transpose()
    }

    pub async fn exists(&self, id: &str) -> Result<bool, DispatchError> {
        Ok(self.store.get(&self.table, id).await?.is_some())
    }

    /// Write a new `Pending` record unless the id is already taken.
    pub async fn insert_new(&self, record: &MessageRecord) -> Result<bool, DispatchError> {
        if record.state != MessageState::Pending {
            return Err(DispatchError::Internal(format!(
                "new record {} must start as Pending, not {}",
                record.id, record.state
            )));
        }
        self.store
            .put_if_absent(&self.table, &record.id, record.to_item())
            .await
    }

    /// Persist a record whose state has advanced.
    ///
    /// The write only lands if the stored state is still the one the
    /// transition was checked against. A concurrent writer forces a re-read.
    pub async fn save(&self, record: &MessageRecord) -> Result<(), DispatchError> {
        for _ in 0..SAVE_ATTEMPTS {
            let current = self
                .get(&record.id)
                .await?
                .ok_or_else(|| DispatchError::NotFound(record.id.clone()))?;

            if current.state != record.state && !current.state.can_transition_to(record.state) {
                return Err(DispatchError::InvalidTransition {
                    id: record.id.clone(),
                    from: current.state,
                    to: record.state,
                });
            }

            let written = self
                .store
                .put_if_equal(
                    &self.table,
                    record.to_item(),
                    attr::STATE,
                    current.state.as_str(),
                )
                .await?;
            if written {
                return Ok(());
            }
            tracing::debug!(
                id = %record.id,
                from = %current.state,
                "Record changed during save, retrying"
            );
        }
        Err(DispatchError::Store(format!(
            "record {} kept changing during save",
            record.id
        )))
    }

    /// All records in the table.
    pub async fn scan(&self) -> Result<Vec<MessageRecord>, DispatchError> {
        self.store
            .scan(&self.table)
            .await?
            .iter()
            .map(MessageRecord::from_item)
            .collect()
    }
}

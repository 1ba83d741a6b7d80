//! Reconciliation state
//!
//! A record remembers, per logical key, what was last realized remotely and
//! the fingerprint of the desired properties that produced it. Matching
//! fingerprints let a re-run skip the provider entirely.

use crate::node::ResourceKey;
use crate::property::PropertyMap;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Last known remote state of one logical resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub key: ResourceKey,
    /// Provider-assigned identifier
    pub remote_id: String,
    /// Fingerprint of the desired properties that were applied
    pub fingerprint: String,
    /// Properties the provider returned
    pub realized: PropertyMap,
    /// Producers at the time of realization, used to order tear-down
    #[serde(default)]
    pub dependencies: Vec<ResourceKey>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for reconciliation records.
///
/// Called concurrently from worker threads; distinct keys must not block
/// each other.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &ResourceKey) -> Result<Option<ReconciliationRecord>>;

    fn put(&self, record: ReconciliationRecord) -> Result<()>;

    fn remove(&self, key: &ResourceKey) -> Result<()>;

    /// Every stored record, in no particular order
    fn records(&self) -> Result<Vec<ReconciliationRecord>>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn get(&self, key: &ResourceKey) -> Result<Option<ReconciliationRecord>> {
        (**self).get(key)
    }

    fn put(&self, record: ReconciliationRecord) -> Result<()> {
        (**self).put(record)
    }

    fn remove(&self, key: &ResourceKey) -> Result<()> {
        (**self).remove(key)
    }

    fn records(&self) -> Result<Vec<ReconciliationRecord>> {
        (**self).records()
    }
}

type Slot = Arc<Mutex<Option<ReconciliationRecord>>>;

/// In-memory store with one lock per logical key.
///
/// The outer map lock is only held long enough to find or create a key's slot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<ResourceKey, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from existing records
    pub fn from_records(records: impl IntoIterator<Item = ReconciliationRecord>) -> Self {
        let slots = records
            .into_iter()
            .map(|r| (r.key.clone(), Arc::new(Mutex::new(Some(r)))))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    fn slot(&self, key: &ResourceKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Run `f` while holding the lock for one key
    pub fn with_key<T>(
        &self,
        key: &ResourceKey,
        f: impl FnOnce(&mut Option<ReconciliationRecord>) -> T,
    ) -> T {
        let slot = self.slot(key);
        let mut guard: MutexGuard<'_, _> = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.records_snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records sorted by key
    pub fn records_snapshot(&self) -> Vec<ReconciliationRecord> {
        let slots: Vec<Slot> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut records: Vec<ReconciliationRecord> = slots
            .iter()
            .filter_map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<ReconciliationRecord>> {
        Ok(self.with_key(key, |slot| slot.clone()))
    }

    fn put(&self, record: ReconciliationRecord) -> Result<()> {
        let key = record.key.clone();
        self.with_key(&key, |slot| *slot = Some(record));
        Ok(())
    }

    fn remove(&self, key: &ResourceKey) -> Result<()> {
        self.with_key(key, |slot| *slot = None);
        Ok(())
    }

    fn records(&self) -> Result<Vec<ReconciliationRecord>> {
        Ok(self.records_snapshot())
    }
}

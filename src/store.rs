use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::convert::Infallible;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::feed::{FeedError, FeedReader};
use crate::util::time::now_ms;

/// A single promotion as read from the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    #[serde(rename = "id")]
    pub identifier: String,
    pub price: f64,
    #[serde(rename = "expiration_date")]
    pub expiration: String,
}

impl PromotionRecord {
    pub fn new(identifier: impl Into<String>, price: f64, expiration: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            price,
            expiration: expiration.into(),
        }
    }
}

/// How lookup keys are assigned to records while a snapshot is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Keys 1, 2, 3... in feed order, scoped to the snapshot being built
    #[default]
    Sequential,
    /// The feed identifier itself, parsed as an integer
    FeedIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Parse a client-supplied identifier into a lookup key
pub fn parse_identifier(raw: &str) -> Result<i64, StoreError> {
    raw.parse::<i64>()
        .map_err(|_| StoreError::InvalidIdentifier(raw.to_string()))
}

/// One immutable generation of promotions
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    loaded_at_ms: u64,
    malformed_rows: u64,
    rejected_rows: u64,
    records: HashMap<i64, PromotionRecord>,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: i64) -> Option<&PromotionRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of a published refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation: u64,
    pub records: usize,
    /// Feed rows skipped before they became records
    pub malformed: u64,
    /// Records dropped by the key policy (bad or duplicate feed identifiers)
    pub rejected: u64,
}

/// Point-in-time view of the live snapshot, served by `/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub generation: u64,
    pub records: usize,
    pub malformed_rows: u64,
    pub rejected_rows: u64,
    pub loaded_at_ms: u64,
}

/// In-memory promotion store.
///
/// Readers clone the live `Arc<Snapshot>` under a read lock and then work on
/// the snapshot without holding any lock. A refresh builds the next snapshot
/// privately and takes the write lock only to swap the pointer.
pub struct Store {
    live: RwLock<Arc<Snapshot>>,
    refresh_lock: Mutex<()>,
    key_policy: KeyPolicy,
}

impl Store {
    /// Create an empty store using sequential keys
    pub fn new() -> Self {
        Self::with_key_policy(KeyPolicy::default())
    }

    pub fn with_key_policy(key_policy: KeyPolicy) -> Self {
        Self {
            live: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: Mutex::new(()),
            key_policy,
        }
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        // The guarded value is only ever replaced whole, so a poisoned lock
        // still holds a complete snapshot.
        let live = self.live.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&live)
    }

    /// Look up a promotion by key
    pub fn lookup(&self, id: i64) -> Option<PromotionRecord> {
        self.snapshot().get(id).cloned()
    }

    /// Look up a promotion by an unparsed client identifier
    pub fn lookup_str(&self, raw: &str) -> Result<Option<PromotionRecord>, StoreError> {
        let id = parse_identifier(raw)?;
        Ok(self.lookup(id))
    }

    pub fn stats(&self) -> StoreStats {
        let snapshot = self.snapshot();
        StoreStats {
            generation: snapshot.generation,
            records: snapshot.len(),
            malformed_rows: snapshot.malformed_rows,
            rejected_rows: snapshot.rejected_rows,
            loaded_at_ms: snapshot.loaded_at_ms,
        }
    }

    /// Replace the live snapshot with one built from `records`
    pub fn refresh<I>(&self, records: I) -> RefreshReport
    where
        I: IntoIterator<Item = PromotionRecord>,
    {
        match self.try_refresh(records.into_iter().map(Ok::<_, Infallible>)) {
            Ok(report) => report,
            Err(never) => match never {},
        }
    }

    /// Replace the live snapshot with one built from a fallible sequence.
    ///
    /// The first error aborts the build and is returned; the previous
    /// snapshot stays live.
    pub fn try_refresh<I, E>(&self, records: I) -> Result<RefreshReport, E>
    where
        I: IntoIterator<Item = Result<PromotionRecord, E>>,
    {
        let _serial = self.serialize_refreshes();
        let (map, rejected) = self.build(records)?;
        Ok(self.publish(map, rejected, 0))
    }

    /// Drain a feed into a new snapshot, recording the rows the feed skipped
    pub fn refresh_from_feed<R: Read>(&self, feed: &mut FeedReader<R>) -> Result<RefreshReport, FeedError> {
        let _serial = self.serialize_refreshes();
        let (map, rejected) = self.build(feed.by_ref())?;
        Ok(self.publish(map, rejected, feed.malformed_rows()))
    }

    fn serialize_refreshes(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a private key map. Nothing here touches the live snapshot.
    fn build<I, E>(&self, records: I) -> Result<(HashMap<i64, PromotionRecord>, u64), E>
    where
        I: IntoIterator<Item = Result<PromotionRecord, E>>,
    {
        let mut map = HashMap::new();
        let mut rejected = 0u64;
        let mut next_key = 1i64;

        for record in records {
            let record = record?;
            match self.key_policy {
                KeyPolicy::Sequential => {
                    map.insert(next_key, record);
                    next_key += 1;
                }
                KeyPolicy::FeedIdentifier => {
                    let Ok(key) = parse_identifier(&record.identifier) else {
                        debug!("Rejecting non-integer feed identifier '{}'", record.identifier);
                        rejected += 1;
                        continue;
                    };
                    match map.entry(key) {
                        Entry::Vacant(slot) => {
                            slot.insert(record);
                        }
                        Entry::Occupied(_) => {
                            debug!("Rejecting duplicate feed identifier {}", key);
                            rejected += 1;
                        }
                    }
                }
            }
        }

        Ok((map, rejected))
    }

    /// Swap a freshly built map in as the live snapshot
    fn publish(&self, records: HashMap<i64, PromotionRecord>, rejected: u64, malformed: u64) -> RefreshReport {
        let generation = self.snapshot().generation + 1;
        let report = RefreshReport {
            generation,
            records: records.len(),
            malformed,
            rejected,
        };
        let snapshot = Arc::new(Snapshot {
            generation,
            loaded_at_ms: now_ms(),
            malformed_rows: malformed,
            rejected_rows: rejected,
            records,
        });

        let previous = {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *live, snapshot)
        };
        // The old generation is freed here, outside the write lock, unless a
        // reader still holds it.
        drop(previous);

        info!(
            "Published snapshot generation {} with {} promotions ({} malformed rows, {} rejected)",
            report.generation, report.records, report.malformed, report.rejected
        );
        report
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

//! # Contention Registry
//!
//! Transactions that want to touch a key held by another transaction have to wait. Each such
//! wait is reported as a [`ContentionEvent`], which the [`ContentionRegistry`] aggregates into a
//! bounded summary of the most contended indexes and keys.
//!
//! ## Structure
//!
//! ```not_rust
//! (table, index)          LRU, max_indexes
//!   |- num_events, cumulative_time
//!   +- key                LRU, max_keys_per_index, ordered by key
//!        |- num_events, cumulative_time
//!        |- blocking txn  LRU, max_txns_per_key
//!        +- waiting txn   LRU, max_txns_per_key
//! ```
//!
//! Every level evicts its least recently recorded entry once full. Evicting an entry drops all of
//! its children, but never touches the counters of its parent. The index counters therefore
//! always cover every event recorded for that index while it was tracked.
//!
//! Contended keys are [`TableKey`]s, so that the table and index can be derived from the key.

use std::{ops::Bound, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    base::{PrettyBytes, TempoResult},
    core::{IndexId, TableId, TableKey, prefix_range},
};

mod cache;
mod config;
mod format;

use cache::{OrderedCache, UnorderedCache};
pub use config::*;
pub use format::*;

#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Serialize,
    Deserialize,
)]
#[debug("TxnId({_0})")]
pub struct TxnId(Uuid);

impl TxnId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_u128(id: u128) -> Self {
        Self(Uuid::from_u128(id))
    }

    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

/// A transaction had to wait for another transaction, which held `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[debug(
    "ContentionEvent(key={:?}, waiting={waiting_txn}, blocking={blocking_txn}, duration={duration:?})",
    PrettyBytes(key)
)]
pub struct ContentionEvent {
    /// An encoded [`TableKey`].
    pub key: Bytes,
    pub waiting_txn: TxnId,
    pub blocking_txn: TxnId,
    /// How long the waiting transaction was held up.
    pub duration: Duration,
}

impl ContentionEvent {
    pub fn new(
        key: impl Into<Bytes>,
        waiting_txn: TxnId,
        blocking_txn: TxnId,
        duration: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            waiting_txn,
            blocking_txn,
            duration,
        }
    }
}

#[derive(Debug)]
struct KeyEntry {
    num_events: u64,
    cumulative_time: Duration,
    blocking_txns: UnorderedCache<TxnId, u64>,
    waiting_txns: UnorderedCache<TxnId, u64>,
}

impl KeyEntry {
    fn new(config: &RegistryConfig) -> Self {
        Self {
            num_events: 0,
            cumulative_time: Duration::ZERO,
            blocking_txns: UnorderedCache::new(config.max_txns_per_key),
            waiting_txns: UnorderedCache::new(config.max_txns_per_key),
        }
    }

    fn record(&mut self, event: &ContentionEvent) {
        self.num_events = self.num_events.saturating_add(1);
        self.cumulative_time = self.cumulative_time.saturating_add(event.duration);

        let inc = |count: &mut u64| *count = count.saturating_add(1);
        if let Some((txn, _)) = self.blocking_txns.upsert(event.blocking_txn, || 0, inc) {
            debug!(%txn, "evicted blocking txn from contended key");
        }
        if let Some((txn, _)) = self.waiting_txns.upsert(event.waiting_txn, || 0, inc) {
            debug!(%txn, "evicted waiting txn from contended key");
        }
    }

    fn to_serialized(&self, key: &Bytes) -> SingleKeyContention {
        let txns = |cache: &UnorderedCache<TxnId, u64>| {
            let mut txns: Vec<_> = cache
                .iter()
                .map(|(&txn_id, &count)| TxnContention { txn_id, count })
                .collect();
            txns.sort_by(cmp_txns);
            txns
        };
        SingleKeyContention {
            key: key.clone(),
            num_events: self.num_events,
            cumulative_time: self.cumulative_time,
            blocking_txns: txns(&self.blocking_txns),
            waiting_txns: txns(&self.waiting_txns),
        }
    }
}

#[derive(Debug)]
struct IndexEntry {
    num_events: u64,
    cumulative_time: Duration,
    keys: OrderedCache<Bytes, KeyEntry>,
}

impl IndexEntry {
    fn new(config: &RegistryConfig) -> Self {
        Self {
            num_events: 0,
            cumulative_time: Duration::ZERO,
            keys: OrderedCache::new(config.max_keys_per_index),
        }
    }

    fn record(&mut self, event: &ContentionEvent, config: &RegistryConfig) {
        self.num_events = self.num_events.saturating_add(1);
        self.cumulative_time = self.cumulative_time.saturating_add(event.duration);

        let evicted = self.keys.upsert(
            event.key.clone(),
            || KeyEntry::new(config),
            |entry| entry.record(event),
        );
        if let Some((key, entry)) = evicted {
            debug!(
                key = ?PrettyBytes(&key),
                num_events = entry.num_events,
                "evicted contended key"
            );
        }
    }

    fn to_serialized(&self, (table_id, index_id): (TableId, IndexId)) -> IndexContention {
        IndexContention {
            table_id,
            index_id,
            num_events: self.num_events,
            cumulative_time: self.cumulative_time,
            keys: self
                .keys
                .iter()
                .map(|(key, entry)| entry.to_serialized(key))
                .collect(),
        }
    }
}

/// Whether `BTreeMap::range` would panic on, or return nothing for, the given bounds.
fn is_empty_range(start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            s >= e
        }
        _ => false,
    }
}

/// Aggregates [`ContentionEvent`]s into a bounded summary. See the [module docs](self) for the
/// structure and eviction rules.
///
/// All methods take `&self`; the registry can be shared between threads.
#[derive(Debug)]
pub struct ContentionRegistry {
    config: RegistryConfig,
    indexes: Mutex<UnorderedCache<(TableId, IndexId), IndexEntry>>,
}

impl Default for ContentionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ContentionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let indexes = Mutex::new(UnorderedCache::new(config.max_indexes));
        Self { config, indexes }
    }

    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Records a single contention event. Fails if the key of the event is not a valid
    /// [`TableKey`].
    pub fn record(&self, event: ContentionEvent) -> TempoResult<()> {
        let table_key = TableKey::from_bytes(&event.key)?;
        let id = (table_key.table_id(), table_key.index_id());
        trace!(?event, "recording contention event");

        let config = &self.config;
        let evicted = self.indexes.lock().upsert(
            id,
            || IndexEntry::new(config),
            |index| index.record(&event, config),
        );
        if let Some(((table_id, index_id), index)) = evicted {
            debug!(
                table_id,
                index_id,
                num_events = index.num_events,
                "evicted contended index"
            );
        }
        Ok(())
    }

    /// Returns all tracked indexes of a table, most contended first.
    pub fn query_table(&self, table_id: TableId) -> Vec<IndexContention> {
        let mut indexes: Vec<_> = self
            .indexes
            .lock()
            .iter()
            .filter(|((t, _), _)| *t == table_id)
            .map(|(&id, index)| index.to_serialized(id))
            .collect();
        indexes.sort_by(cmp_indexes);
        indexes
    }

    pub fn query_index(&self, table_id: TableId, index_id: IndexId) -> Option<IndexContention> {
        let id = (table_id, index_id);
        self.indexes
            .lock()
            .get(&id)
            .map(|index| index.to_serialized(id))
    }

    /// Returns the tracked keys of an index that fall into `range`, sorted by key. The bounds
    /// apply to full encoded [`TableKey`]s.
    pub fn query_index_range(
        &self,
        table_id: TableId,
        index_id: IndexId,
        (start, end): (Bound<&[u8]>, Bound<&[u8]>),
    ) -> Vec<SingleKeyContention> {
        if is_empty_range(start, end) {
            return Vec::new();
        }
        let indexes = self.indexes.lock();
        let Some(index) = indexes.get(&(table_id, index_id)) else {
            return Vec::new();
        };
        index
            .keys
            .range::<[u8], _>((start, end))
            .map(|(key, entry)| entry.to_serialized(key))
            .collect()
    }

    /// Returns the tracked keys of an index whose index key starts with `prefix`, sorted by key.
    pub fn query_index_prefix(
        &self,
        table_id: TableId,
        index_id: IndexId,
        prefix: &[u8],
    ) -> Vec<SingleKeyContention> {
        let mut full_prefix = TableKey::index_prefix(table_id, index_id);
        full_prefix.extend_from_slice(prefix);
        let (start, end) = prefix_range(full_prefix);
        self.query_index_range(
            table_id,
            index_id,
            (start.as_ref().map(Vec::as_slice), end.as_ref().map(Vec::as_slice)),
        )
    }

    /// Takes a snapshot of all tracked contention.
    pub fn snapshot(&self) -> SerializedRegistry {
        let mut indexes: Vec<_> = self
            .indexes
            .lock()
            .iter()
            .map(|(&id, index)| index.to_serialized(id))
            .collect();
        indexes.sort_by(cmp_indexes);
        SerializedRegistry { indexes }
    }
}

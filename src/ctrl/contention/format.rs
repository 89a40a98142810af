use std::{
    cmp,
    collections::{BTreeMap, HashMap, hash_map},
    fmt,
    time::Duration,
};

use bincode::Options as BincodeOptions;
use bytes::Bytes;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    base::{PrettyBytes, TempoResult, bincode_options},
    core::{IndexId, TableId, TableKey},
    ctrl::contention::{RegistryConfig, TxnId},
};

/// How often a transaction took part in contention on a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnContention {
    pub txn_id: TxnId,
    pub count: u64,
}

/// Contention on a single key of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleKeyContention {
    /// The full contended key, including the table and index ids.
    pub key: Bytes,
    pub num_events: u64,
    pub cumulative_time: Duration,
    /// Transactions that held up others, most frequent first.
    pub blocking_txns: Vec<TxnContention>,
    /// Transactions that had to wait, most frequent first.
    pub waiting_txns: Vec<TxnContention>,
}

/// Contention on a single index, with its most contended keys.
///
/// The index counters include all recorded events, also those of keys that have been evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexContention {
    pub table_id: TableId,
    pub index_id: IndexId,
    pub num_events: u64,
    pub cumulative_time: Duration,
    /// Sorted by key.
    pub keys: Vec<SingleKeyContention>,
}

/// A point-in-time copy of a [`ContentionRegistry`], which can be shipped to other nodes and
/// [merged](merge_serialized) with their registries.
///
/// Indexes are sorted by the number of events, most contended first. Ties are broken by table
/// and index id.
///
/// [`ContentionRegistry`]: crate::ctrl::contention::ContentionRegistry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRegistry {
    pub indexes: Vec<IndexContention>,
}

impl SerializedRegistry {
    pub fn encode(&self) -> TempoResult<Vec<u8>> {
        Ok(bincode_options().serialize(self)?)
    }

    pub fn decode(buf: &[u8]) -> TempoResult<Self> {
        Ok(bincode_options().deserialize(buf)?)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn index(&self, table_id: TableId, index_id: IndexId) -> Option<&IndexContention> {
        self.indexes
            .iter()
            .find(|i| i.table_id == table_id && i.index_id == index_id)
    }
}

pub(crate) fn cmp_indexes(a: &IndexContention, b: &IndexContention) -> cmp::Ordering {
    b.num_events
        .cmp(&a.num_events)
        .then_with(|| (a.table_id, a.index_id).cmp(&(b.table_id, b.index_id)))
}

pub(crate) fn cmp_txns(a: &TxnContention, b: &TxnContention) -> cmp::Ordering {
    b.count.cmp(&a.count).then_with(|| a.txn_id.cmp(&b.txn_id))
}

fn limit_txns(txns: HashMap<TxnId, u64>, max_txns: usize) -> Vec<TxnContention> {
    txns.into_iter()
        .map(|(txn_id, count)| TxnContention { txn_id, count })
        .sorted_by(cmp_txns)
        .take(max_txns)
        .collect()
}

fn add_txns(into: &mut HashMap<TxnId, u64>, txns: Vec<TxnContention>) {
    for txn in txns {
        *into.entry(txn.txn_id).or_default() += txn.count;
    }
}

#[derive(Default)]
struct MergedKey {
    num_events: u64,
    cumulative_time: Duration,
    blocking_txns: HashMap<TxnId, u64>,
    waiting_txns: HashMap<TxnId, u64>,
}

struct MergedIndex {
    num_events: u64,
    cumulative_time: Duration,
    keys: BTreeMap<Bytes, MergedKey>,
}

impl MergedIndex {
    fn add(&mut self, index: IndexContention) {
        self.num_events = self.num_events.saturating_add(index.num_events);
        self.cumulative_time = self.cumulative_time.saturating_add(index.cumulative_time);
        for key in index.keys {
            let merged = self.keys.entry(key.key).or_default();
            merged.num_events = merged.num_events.saturating_add(key.num_events);
            merged.cumulative_time = merged.cumulative_time.saturating_add(key.cumulative_time);
            add_txns(&mut merged.blocking_txns, key.blocking_txns);
            add_txns(&mut merged.waiting_txns, key.waiting_txns);
        }
    }

    fn finish(
        self,
        (table_id, index_id): (TableId, IndexId),
        config: &RegistryConfig,
    ) -> IndexContention {
        let keys = self
            .keys
            .into_iter()
            // most contended keys survive, ties keep the smaller key
            .sorted_by(|(ak, a), (bk, b)| b.num_events.cmp(&a.num_events).then_with(|| ak.cmp(bk)))
            .take(config.max_keys_per_index)
            .sorted_by(|(ak, _), (bk, _)| ak.cmp(bk))
            .map(|(key, merged)| SingleKeyContention {
                key,
                num_events: merged.num_events,
                cumulative_time: merged.cumulative_time,
                blocking_txns: limit_txns(merged.blocking_txns, config.max_txns_per_key),
                waiting_txns: limit_txns(merged.waiting_txns, config.max_txns_per_key),
            })
            .collect();

        IndexContention {
            table_id,
            index_id,
            num_events: self.num_events,
            cumulative_time: self.cumulative_time,
            keys,
        }
    }
}

/// Merges two registry snapshots, e.g. from different nodes. Counters and durations of the same
/// index, key and transaction are summed up, after which the limits of `config` are applied
/// again: only the most contended indexes, keys and transactions are kept.
#[instrument(skip_all, level = "debug", fields(left = a.indexes.len(), right = b.indexes.len()))]
pub fn merge_serialized(
    a: SerializedRegistry,
    b: SerializedRegistry,
    config: &RegistryConfig,
) -> SerializedRegistry {
    let mut merged: HashMap<(TableId, IndexId), MergedIndex> = HashMap::new();
    for index in a.indexes.into_iter().chain(b.indexes) {
        match merged.entry((index.table_id, index.index_id)) {
            hash_map::Entry::Occupied(mut entry) => entry.get_mut().add(index),
            hash_map::Entry::Vacant(entry) => {
                let mut new = MergedIndex {
                    num_events: 0,
                    cumulative_time: Duration::ZERO,
                    keys: BTreeMap::new(),
                };
                new.add(index);
                entry.insert(new);
            }
        }
    }

    let indexes = merged
        .into_iter()
        .map(|(id, index)| index.finish(id, config))
        .sorted_by(cmp_indexes)
        .take(config.max_indexes)
        .collect_vec();
    debug!(indexes = indexes.len(), "merged contention registries");
    SerializedRegistry { indexes }
}

struct TxnList<'a>(&'a [TxnContention]);

impl fmt::Display for TxnList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, txn) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} x{}", txn.txn_id, txn.count)?;
        }
        write!(f, "]")
    }
}

/// Human readable, multi-line overview of the contended indexes and keys.
impl fmt::Display for SerializedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in &self.indexes {
            writeln!(
                f,
                "table {} index {}: {} events, {:?} contended",
                index.table_id, index.index_id, index.num_events, index.cumulative_time
            )?;
            for key in &index.keys {
                let index_key = key.key.get(TableKey::PREFIX_SIZE..).unwrap_or_default();
                writeln!(
                    f,
                    "  {:?}: {} events, {:?} contended, blocking {}, waiting {}",
                    PrettyBytes(index_key),
                    key.num_events,
                    key.cumulative_time,
                    TxnList(&key.blocking_txns),
                    TxnList(&key.waiting_txns),
                )?;
            }
        }
        Ok(())
    }
}

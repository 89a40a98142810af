use std::time::Duration;

use crate::ctrl::hlc::{ClockTimestamp, Timestamp};

/// # Uncertainty Interval
///
/// A reader at `read_ts` cannot tell whether a value written slightly above `read_ts` was
/// written before or after the read, since clocks of different nodes are only synchronized up to
/// the max clock offset. Values in `(read_ts, limit]` are *uncertain*.
///
/// The interval knows two limits:
///
/// - The **global limit** `read_ts + max_offset` bounds every clock in the cluster.
/// - The optional **local limit** is a reading of the clock of the node that holds the value.
///   Any value written by a clock at that node, and therefore carrying a standard timestamp, was
///   necessarily written at or below that reading.
///
/// A [synthetic] value makes no claim about any clock. It is therefore only ever checked against
/// the global limit.
///
/// [synthetic]: crate::ctrl::hlc::TimestampFlags::SYNTHETIC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncertaintyInterval {
    pub global_limit: Timestamp,
    pub local_limit: Option<ClockTimestamp>,
}

impl UncertaintyInterval {
    pub fn new(read_ts: Timestamp, max_offset: Duration) -> Self {
        let max_offset = i64::try_from(max_offset.as_nanos()).unwrap_or(i64::MAX);
        Self {
            global_limit: Timestamp::new(
                read_ts.wall_time().saturating_add(max_offset),
                read_ts.logical(),
            ),
            local_limit: None,
        }
    }

    /// Sets the local limit, which never exceeds the global limit.
    pub fn with_local_limit(mut self, local_limit: ClockTimestamp) -> Self {
        let global = ClockTimestamp::new(self.global_limit.wall_time(), self.global_limit.logical());
        self.local_limit = Some(local_limit.backward(global));
        self
    }

    /// Returns whether a value at `value_ts` may have been written before a read at `read_ts`.
    pub fn is_uncertain(&self, read_ts: Timestamp, value_ts: Timestamp) -> bool {
        if value_ts.less_eq(&read_ts) {
            return false;
        }
        let limit = match self.local_limit {
            Some(local) if !value_ts.is_synthetic() => local.to_timestamp(),
            _ => self.global_limit,
        };
        value_ts.less_eq(&limit)
    }
}

//! # Hybrid Logical Clock
//!
//! This module contains the [`Timestamp`] value type, its [`TimestampFlags`], and the
//! [`ClockTimestamp`] that is handed out by a [`Clock`]. A timestamp combines a physical wall
//! time reading in nanoseconds with a logical counter, which breaks ties between events that
//! share the same wall time.
//!
//! ## Ordering vs. Identity
//!
//! Timestamps know two different notions of equality:
//!
//! - **Ordering equality** ([`Timestamp::eq_ordering`]): wall time and logical counter match.
//!   Flags never take part in ordering.
//! - **Structural equality** (`==`): wall time, logical counter *and* flags match.
//!
//! Since a Rust [`Ord`] implementation has to agree with [`Eq`], [`Timestamp`] deliberately
//! implements neither [`PartialOrd`] nor [`Ord`]. Use [`Timestamp::compare`] and the
//! predicates derived from it instead, e.g. `timestamps.sort_by(Timestamp::compare)`.
//!
//! ## Synthetic Timestamps
//!
//! A standard timestamp asserts that some node's physical clock was observed at or above its
//! value. A [synthetic] timestamp makes no such claim; it may be far ahead of every clock in the
//! cluster. See [`UncertaintyInterval`] for where this distinction matters.
//!
//! [synthetic]: TimestampFlags::SYNTHETIC

use std::{cmp, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::base::{HexU8, TempoError, TempoResult};

mod clock;
mod format;
mod uncertainty;

pub use clock::*;
pub use format::*;
pub use uncertainty::*;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// # Timestamp Flags
///
/// A set of boolean properties attached to a [`Timestamp`]. Flags are limited to 8 bits, so that
/// they can always be encoded into a single byte.
///
/// | Bit | Flag          |
/// |-----|---------------|
/// | 0   | [`SYNTHETIC`] |
/// | 1-7 | reserved      |
///
/// Raw values with any bit above position 7 are rejected with [`TempoError::InvalidFlags`].
/// Reserved bits are accepted, so that flags added by newer nodes survive a round-trip.
///
/// [`SYNTHETIC`]: Self::SYNTHETIC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[debug("TimestampFlags({:?})", HexU8(self.0))]
#[serde(into = "u32", try_from = "u32")]
pub struct TimestampFlags(u8);

impl TimestampFlags {
    /// No flag set.
    pub const EMPTY: Self = Self(0);

    /// The timestamp does not assert that any node's clock was observed at its value.
    pub const SYNTHETIC: Self = Self(1 << 0);

    /// Validates `bits` and wraps them, failing if any bit above position 7 is set.
    pub const fn from_bits(bits: u32) -> TempoResult<Self> {
        if bits > u8::MAX as u32 {
            return Err(TempoError::InvalidFlags(bits));
        }
        Ok(Self(bits as u8))
    }

    /// Wraps `bits`, silently dropping anything above bit 7.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits as u8)
    }

    /// Returns the raw bits, e.g. for encoding.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag of `other` is set in `self`.
    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl TryFrom<u32> for TimestampFlags {
    type Error = TempoError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<TimestampFlags> for u32 {
    fn from(flags: TimestampFlags) -> Self {
        flags.0 as u32
    }
}

/// # Hybrid Logical Clock Timestamp
///
/// An immutable value that is copied around freely. The zero value ([`Timestamp::ZERO`]) is a
/// valid timestamp; use `Option<Timestamp>` where a timestamp may be absent.
///
/// `==` compares structurally (including flags). For ordering, see [`Timestamp::compare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[debug("Timestamp({})", self)]
pub struct Timestamp {
    /// Nanoseconds since the Unix epoch.
    wall_time: i64,
    /// Tie-breaker for events sharing the same wall time.
    logical: i32,
    flags: TimestampFlags,
}

impl Timestamp {
    pub const ZERO: Self = Self::new(0, 0);

    pub const MAX: Self = Self::new(i64::MAX, i32::MAX);

    /// Creates a timestamp with all flags cleared.
    #[inline]
    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Self {
            wall_time,
            logical,
            flags: TimestampFlags::EMPTY,
        }
    }

    #[inline]
    pub const fn wall_time(&self) -> i64 {
        self.wall_time
    }

    #[inline]
    pub const fn logical(&self) -> i32 {
        self.logical
    }

    #[inline]
    pub const fn flags(&self) -> TimestampFlags {
        self.flags
    }

    /// Returns a copy with the [synthetic] flag set.
    ///
    /// [synthetic]: TimestampFlags::SYNTHETIC
    #[inline]
    pub const fn with_synthetic(self) -> Self {
        self.with_flags(TimestampFlags::SYNTHETIC)
    }

    /// Returns a copy with `flags` set in addition to the already present ones.
    #[inline]
    pub const fn with_flags(mut self, flags: TimestampFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Returns a copy with `flags` cleared.
    #[inline]
    pub const fn without_flags(mut self, flags: TimestampFlags) -> Self {
        self.flags = self.flags.difference(flags);
        self
    }

    #[inline]
    pub const fn is_flag_set(&self, flag: TimestampFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub const fn is_synthetic(&self) -> bool {
        self.is_flag_set(TimestampFlags::SYNTHETIC)
    }

    /// Returns `true` for the zero timestamp. Flags are ignored.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.wall_time == 0 && self.logical == 0
    }

    /// Lexicographic comparison of `(wall_time, logical)`. Flags never take part.
    #[inline]
    pub fn compare(&self, other: &Self) -> cmp::Ordering {
        self.wall_time
            .cmp(&other.wall_time)
            .then(self.logical.cmp(&other.logical))
    }

    #[inline]
    pub fn less(&self, other: &Self) -> bool {
        self.compare(other).is_lt()
    }

    #[inline]
    pub fn less_eq(&self, other: &Self) -> bool {
        self.compare(other).is_le()
    }

    #[inline]
    pub fn greater(&self, other: &Self) -> bool {
        self.compare(other).is_gt()
    }

    #[inline]
    pub fn greater_eq(&self, other: &Self) -> bool {
        self.compare(other).is_ge()
    }

    /// Equality for ordering purposes, ignoring flags. Not the same as `==`, which also requires
    /// the flags to match.
    #[inline]
    pub fn eq_ordering(&self, other: &Self) -> bool {
        self.compare(other).is_eq()
    }

    /// Returns the later of both timestamps, with the flags of whichever one was chosen.
    /// On an ordering tie, `self` is returned.
    ///
    /// Nodes forward their clock past every timestamp they observe from a peer, which ensures
    /// that causally later events always compare greater.
    #[inline]
    pub fn forward(self, other: Self) -> Self {
        if other.greater(&self) { other } else { self }
    }

    /// Returns the earlier of both timestamps, with the flags of whichever one was chosen.
    /// On an ordering tie, `self` is returned.
    #[inline]
    pub fn backward(self, other: Self) -> Self {
        if other.less(&self) { other } else { self }
    }

    /// Returns the next timestamp in the total order, rolling the logical counter over into the
    /// wall time. Returns `None` for [`Timestamp::MAX`].
    pub const fn checked_next(self) -> Option<Self> {
        if self.logical == i32::MAX {
            let Some(wall_time) = self.wall_time.checked_add(1) else {
                return None;
            };
            Some(Self {
                wall_time,
                logical: 0,
                flags: self.flags,
            })
        } else {
            Some(Self {
                logical: self.logical + 1,
                ..self
            })
        }
    }

    /// Returns the previous timestamp. A zero counter borrows from the wall time and becomes
    /// `i32::MAX`, as does `i32::MIN`. A negative counter steps down within its wall time. Returns
    /// `None` when the wall time cannot go back any further.
    pub const fn checked_prev(self) -> Option<Self> {
        if self.logical != 0 && self.logical != i32::MIN {
            Some(Self {
                logical: self.logical - 1,
                ..self
            })
        } else {
            let Some(wall_time) = self.wall_time.checked_sub(1) else {
                return None;
            };
            Some(Self {
                wall_time,
                logical: i32::MAX,
                flags: self.flags,
            })
        }
    }

    /// Offsets the timestamp by `wall_nanos` and `logical`, saturating at the bounds of the
    /// respective fields. Flags are kept.
    pub const fn add(self, wall_nanos: i64, logical: i32) -> Self {
        Self {
            wall_time: self.wall_time.saturating_add(wall_nanos),
            logical: self.logical.saturating_add(logical),
            flags: self.flags,
        }
    }
}

/// Formats as `<secs>.<nanos>,<logical>`, with a trailing `?` for synthetic timestamps.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.wall_time < 0 { "-" } else { "" };
        let abs = self.wall_time.unsigned_abs();
        let nanos_per_sec = NANOS_PER_SEC as u64;
        write!(
            f,
            "{sign}{}.{:09},{}",
            abs / nanos_per_sec,
            abs % nanos_per_sec,
            self.logical
        )?;
        if self.is_synthetic() {
            write!(f, "?")?;
        }
        Ok(())
    }
}

impl FromStr for Timestamp {
    type Err = TempoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TempoError::InvalidTimestampString(s.to_string());

        let (rest, synthetic) = match s.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (wall, logical) = match rest.split_once(',') {
            Some((wall, logical)) => (wall, logical.parse::<i32>().map_err(|_| invalid())?),
            None => (rest, 0),
        };
        let (negative, wall) = match wall.strip_prefix('-') {
            Some(wall) => (true, wall),
            None => (false, wall),
        };
        let (secs, nanos) = wall.split_once('.').unwrap_or((wall, ""));

        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if secs.is_empty() || !is_digits(secs) || !is_digits(nanos) || nanos.len() > 9 {
            return Err(invalid());
        }
        if wall.contains('.') && nanos.is_empty() {
            return Err(invalid());
        }

        let secs: i128 = secs.parse().map_err(|_| invalid())?;
        // right-pad the fraction, so that `.5` means 500ms
        let nanos: i128 = if nanos.is_empty() {
            0
        } else {
            format!("{nanos:0<9}").parse().map_err(|_| invalid())?
        };
        let mut wall_time = secs
            .checked_mul(NANOS_PER_SEC as i128)
            .and_then(|n| n.checked_add(nanos))
            .ok_or_else(invalid)?;
        if negative {
            wall_time = -wall_time;
        }
        let wall_time = i64::try_from(wall_time).map_err(|_| invalid())?;

        let ts = Self::new(wall_time, logical);
        Ok(if synthetic { ts.with_synthetic() } else { ts })
    }
}

/// # Clock Timestamp
///
/// A [`Timestamp`] that was read from a [`Clock`]. Clock timestamps are never synthetic, which
/// is enforced on conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[debug("ClockTimestamp({_0})")]
#[serde(into = "Timestamp", try_from = "Timestamp")]
pub struct ClockTimestamp(Timestamp);

impl ClockTimestamp {
    pub const ZERO: Self = Self(Timestamp::ZERO);

    #[inline]
    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Self(Timestamp::new(wall_time, logical))
    }

    #[inline]
    pub const fn wall_time(&self) -> i64 {
        self.0.wall_time
    }

    #[inline]
    pub const fn logical(&self) -> i32 {
        self.0.logical
    }

    #[inline]
    pub const fn to_timestamp(self) -> Timestamp {
        self.0
    }

    #[inline]
    pub fn compare(&self, other: &Self) -> cmp::Ordering {
        self.0.compare(&other.0)
    }

    #[inline]
    pub fn less(&self, other: &Self) -> bool {
        self.0.less(&other.0)
    }

    /// See [`Timestamp::forward`].
    #[inline]
    pub fn forward(self, other: Self) -> Self {
        Self(self.0.forward(other.0))
    }

    #[inline]
    pub fn backward(self, other: Self) -> Self {
        Self(self.0.backward(other.0))
    }
}

impl fmt::Display for ClockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<ClockTimestamp> for Timestamp {
    fn from(ts: ClockTimestamp) -> Self {
        ts.0
    }
}

impl TryFrom<Timestamp> for ClockTimestamp {
    type Error = TempoError;

    fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
        if ts.is_synthetic() {
            return Err(TempoError::SyntheticClockTimestamp);
        }
        Ok(Self(ts))
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use itertools::Itertools;
    use proptest::prelude::*;

    use super::*;

    fn ts(wall_time: i64, logical: i32) -> Timestamp {
        Timestamp::new(wall_time, logical)
    }

    fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // small domains, so that ties actually happen
        (-3i64..3, -2i32..3, any::<bool>()).prop_map(|(w, l, synthetic)| {
            let t = ts(w, l);
            if synthetic { t.with_synthetic() } else { t }
        })
    }

    #[test]
    fn test_new_clears_flags() {
        let t = ts(10, 2);
        assert_eq!(t.wall_time(), 10);
        assert_eq!(t.logical(), 2);
        assert!(t.flags().is_empty());
        assert!(!t.is_synthetic());
    }

    #[test]
    fn test_with_synthetic_does_not_mutate() {
        let t = ts(10, 2);
        let s = t.with_synthetic();
        assert!(!t.is_synthetic());
        assert!(s.is_synthetic());
        assert!(s.is_flag_set(TimestampFlags::SYNTHETIC));
        assert!(s.without_flags(TimestampFlags::SYNTHETIC) == t);
    }

    #[test]
    fn test_logical_tie_breaks_then_flags_carried_on_forward() {
        let a = ts(100, 0);
        let b = ts(100, 1).with_synthetic();

        assert_eq!(a.compare(&b), Ordering::Less);
        assert!(a.less(&b));
        assert!(!a.eq_ordering(&b));
        assert!(a != b);

        let forwarded = a.forward(b);
        assert!(forwarded == b);
        assert!(forwarded.is_synthetic());
    }

    #[test]
    fn test_flags_only_difference() {
        let a = ts(50, 3);
        let b = ts(50, 3).with_synthetic();

        assert_eq!(a.compare(&b), Ordering::Equal);
        assert!(a.eq_ordering(&b));
        assert!(a.less_eq(&b) && a.greater_eq(&b));
        assert!(!a.less(&b) && !a.greater(&b));
        assert!(a != b);
    }

    #[test]
    fn test_forward_tie_keeps_receiver() {
        let a = ts(50, 3);
        let b = ts(50, 3).with_synthetic();
        assert!(a.forward(b) == a);
        assert!(b.forward(a) == b);
        assert!(a.backward(b) == a);
        assert!(b.backward(a) == b);
    }

    #[test]
    fn test_zero_is_minimum_of_non_negative() {
        let zero = Timestamp::default();
        assert!(zero == Timestamp::ZERO);
        assert!(zero.is_empty());
        assert!(zero.less(&ts(0, 1)));
        assert!(zero.less(&ts(1, 0)));
        assert!(!ts(0, 1).is_empty());
    }

    #[test]
    fn test_sort_by_compare() {
        let mut timestamps = vec![ts(3, 0), ts(1, 5), ts(1, 0).with_synthetic(), ts(2, 9)];
        timestamps.sort_by(Timestamp::compare);
        for (a, b) in timestamps.iter().tuple_windows() {
            assert!(a.less(b));
        }
        assert!(timestamps[0].is_synthetic());
    }

    #[test]
    fn test_checked_next_prev() {
        assert!(ts(1, 1).checked_next() == Some(ts(1, 2)));
        assert!(ts(1, i32::MAX).checked_next() == Some(ts(2, 0)));
        assert!(Timestamp::MAX.checked_next().is_none());

        assert!(ts(1, 1).checked_prev() == Some(ts(1, 0)));
        assert!(ts(1, 0).checked_prev() == Some(ts(0, i32::MAX)));
        assert!(ts(i64::MIN, 0).checked_prev().is_none());

        assert!(ts(5, -3).checked_prev() == Some(ts(5, -4)));
        assert!(ts(5, -3).checked_next() == Some(ts(5, -2)));
        assert!(ts(5, -1).checked_next() == Some(ts(5, 0)));
        assert!(ts(5, i32::MIN).checked_prev() == Some(ts(4, i32::MAX)));

        // flags survive
        assert!(ts(1, 1).with_synthetic().checked_next().unwrap().is_synthetic());
    }

    #[test]
    fn test_add_saturates() {
        assert!(ts(10, 1).add(5, 2) == ts(15, 3));
        assert!(ts(i64::MAX - 1, 0).add(10, 0) == ts(i64::MAX, 0));
        assert!(ts(0, i32::MAX).add(0, 1) == ts(0, i32::MAX));
        assert!(ts(0, 0).with_synthetic().add(1, 0).is_synthetic());
    }

    #[test]
    fn test_flags_validation() {
        assert_eq!(TimestampFlags::from_bits(0).unwrap(), TimestampFlags::EMPTY);
        assert_eq!(
            TimestampFlags::try_from(1).unwrap(),
            TimestampFlags::SYNTHETIC
        );
        // reserved bits are fine
        assert_eq!(TimestampFlags::from_bits(0x80).unwrap().bits(), 0x80);
        assert!(matches!(
            TimestampFlags::from_bits(0x100),
            Err(TempoError::InvalidFlags(0x100))
        ));
        assert_eq!(TimestampFlags::from_bits_truncate(0x101).bits(), 0x01);
    }

    #[test]
    fn test_display() {
        assert_eq!(ts(0, 0).to_string(), "0.000000000,0");
        assert_eq!(ts(1_000_000_100, 3).to_string(), "1.000000100,3");
        assert_eq!(ts(1_500_000_000, 0).with_synthetic().to_string(), "1.500000000,0?");
        assert_eq!(ts(-1_500_000_000, 2).to_string(), "-1.500000000,2");
        assert_eq!(format!("{:?}", ts(5, 1)), "Timestamp(0.000000005,1)");
    }

    #[test]
    fn test_parse() {
        let cases = [
            ("0", ts(0, 0)),
            ("1.000000100,3", ts(1_000_000_100, 3)),
            ("1.5", ts(1_500_000_000, 0)),
            ("1.5,7?", ts(1_500_000_000, 7).with_synthetic()),
            ("-2.25,1", ts(-2_250_000_000, 1)),
            ("42,-1", ts(42_000_000_000, -1)),
        ];
        for (input, expected) in cases {
            let parsed: Timestamp = input.parse().unwrap();
            assert!(parsed == expected, "{input} parsed to {parsed}");
        }

        for invalid in [
            "",
            "?",
            "abc",
            "1.",
            ".5",
            "1.0000000001",
            "1,x",
            "--1",
            "1e9",
            "99999999999999999999999999999999999",
        ] {
            assert!(
                matches!(
                    invalid.parse::<Timestamp>(),
                    Err(TempoError::InvalidTimestampString(_))
                ),
                "{invalid:?} should not parse"
            );
        }
        // overflows i64 nanoseconds
        assert!("9300000000".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_clock_timestamp_conversion() {
        let clock_ts = ClockTimestamp::new(7, 1);
        let t: Timestamp = clock_ts.into();
        assert!(t == ts(7, 1));
        assert_eq!(ClockTimestamp::try_from(t).unwrap(), clock_ts);
        assert!(matches!(
            ClockTimestamp::try_from(t.with_synthetic()),
            Err(TempoError::SyntheticClockTimestamp)
        ));
    }

    proptest! {
        #[test]
        fn prop_compare_is_total_order(
            a in arb_timestamp(),
            b in arb_timestamp(),
            c in arb_timestamp(),
        ) {
            // antisymmetry
            prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
            // transitivity
            if a.less_eq(&b) && b.less_eq(&c) {
                prop_assert!(a.less_eq(&c));
            }
            // totality
            prop_assert!(a.less(&b) || a.eq_ordering(&b) || a.greater(&b));
        }

        #[test]
        fn prop_reflexive_equalities(a in arb_timestamp()) {
            prop_assert!(a.eq_ordering(&a));
            prop_assert!(a == a);
        }

        #[test]
        fn prop_structural_equality_implies_ordering_equality(
            a in arb_timestamp(),
            b in arb_timestamp(),
        ) {
            if a == b {
                prop_assert!(a.eq_ordering(&b));
            }
            if a.eq_ordering(&b) && a.flags() != b.flags() {
                prop_assert!(a != b);
            }
        }

        #[test]
        fn prop_forward_is_max(a in arb_timestamp(), b in arb_timestamp()) {
            let ab = a.forward(b);
            let ba = b.forward(a);
            prop_assert!(ab.eq_ordering(&ba));
            prop_assert!(ab.greater_eq(&a) && ab.greater_eq(&b));
            prop_assert!(ab == a || ab == b);

            let min = a.backward(b);
            prop_assert!(min.less_eq(&a) && min.less_eq(&b));
        }

        #[test]
        fn prop_display_parse_roundtrip(
            wall in any::<i64>(),
            logical in any::<i32>(),
            synthetic in any::<bool>(),
        ) {
            let t = ts(wall, logical);
            let t = if synthetic { t.with_synthetic() } else { t };
            let parsed: Timestamp = t.to_string().parse().unwrap();
            prop_assert!(parsed == t);
        }
    }
}

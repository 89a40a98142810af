//! This module contains the trait abstraction for key comparison of versioned keys.

use std::cmp;

use crate::ctrl::hlc::SORTABLE_TIMESTAMP_SIZE;

pub trait Comparer: Default + Clone + 'static {
    /// Returns the index where the version suffix starts.
    /// If there is no suffix, returns the length of the slice.
    fn split(&self, key: &[u8]) -> usize;

    /// Compares the prefix part of two keys.
    fn compare_prefix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering;

    /// Compares the suffix part of two keys.
    fn compare_suffix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering;

    /// Compares the logical part (user facing) of a key.
    /// Usually, this just compares the key prefix, but you may choose yourself.
    fn compare_logical(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        let anon = self.split(a);
        let bnon = self.split(b);
        self.compare_prefix(&a[..anon], &b[..bnon])
    }

    /// Full comparison of two different keys, for physically ordering them.
    /// It first compares them by the prefix, and then by the suffix.
    fn compare_physical(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        let anon = self.split(a);
        let bnon = self.split(b);

        match self.compare_prefix(&a[..anon], &b[..bnon]) {
            cmp::Ordering::Equal => self.compare_suffix(&a[anon..], &b[bnon..]),
            ord => ord,
        }
    }
}

#[derive(Default, Clone)]
pub struct AssertComparer<C: Comparer>(C);

impl<C: Comparer> Comparer for AssertComparer<C> {
    fn split(&self, key: &[u8]) -> usize {
        self.0.split(key)
    }

    fn compare_prefix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        self.0.compare_prefix(a, b)
    }

    fn compare_suffix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        self.0.compare_suffix(a, b)
    }

    fn compare_physical(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        // compare the two keys completely (prefix and suffix)
        let res = self.0.compare_physical(a, b);

        // check for anti-symmetry:
        // `a == b` implies `b == a`
        // `a > b` implies `b < a`
        // `a < b` implies `b > a`
        debug_assert_eq!(
            res,
            self.0.compare_physical(b, a).reverse(),
            "Anti-symmetry violation: compare(a,b) != reverse(compare(b,a))"
        );

        // check for consistency with prefix:
        // if a < b, then prefix(a) must be <= prefix(b)
        let prefix_cmp = self.0.compare_logical(a, b);
        if prefix_cmp.is_ne() {
            debug_assert_eq!(
                res, prefix_cmp,
                "Consistency violation: prefixes differ but the full comparison disagrees"
            );
        }

        res
    }
}

/// Compares MVCC keys, i.e. user keys followed by an optional [sortable timestamp] and a single
/// byte holding the length of the timestamp (`0` for unversioned keys).
///
/// User keys sort ascending, versions of the same user key sort from newest to oldest. A key
/// without version sorts before all of its versions. Timestamp flags are ignored, just like for
/// [`Timestamp::compare`].
///
/// [sortable timestamp]: crate::ctrl::hlc::Timestamp::to_sortable_bytes
/// [`Timestamp::compare`]: crate::ctrl::hlc::Timestamp::compare
#[derive(Default, Clone)]
pub struct MvccComparer;

impl MvccComparer {
    /// The part of the timestamp that takes part in ordering; the trailing flags byte does not.
    const ORDERED_TIMESTAMP_LEN: usize = SORTABLE_TIMESTAMP_SIZE - 1;
}

impl Comparer for MvccComparer {
    fn split(&self, key: &[u8]) -> usize {
        match key.last() {
            Some(&suffix_len) => key.len().saturating_sub(1 + suffix_len as usize),
            None => 0,
        }
    }

    fn compare_prefix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        a.cmp(b)
    }

    fn compare_suffix(&self, a: &[u8], b: &[u8]) -> cmp::Ordering {
        // strip the length byte
        let a = &a[..a.len().saturating_sub(1)];
        let b = &b[..b.len().saturating_sub(1)];
        let ordered = |ts: &[u8]| ts.len() >= Self::ORDERED_TIMESTAMP_LEN;

        match (ordered(a), ordered(b)) {
            // newest version first
            (true, true) => {
                b[..Self::ORDERED_TIMESTAMP_LEN].cmp(&a[..Self::ORDERED_TIMESTAMP_LEN])
            }
            (false, true) => cmp::Ordering::Less,
            (true, false) => cmp::Ordering::Greater,
            (false, false) => a.cmp(b),
        }
    }
}

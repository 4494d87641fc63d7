//! Sets of 64-bit integers represented as unions of closed intervals.
//!
//! [`LongSet`] is the value domain of switch reconstruction: "the set of values of the
//! switch variable that reach this branch". Sets are immutable; every operation returns a
//! new set.
//!
//! # Representation
//!
//! A set is a sorted list of [`LongInterval`]s that are pairwise disjoint and
//! non-adjacent (`[1, 3]` and `[4, 6]` are always merged into `[1, 6]`). The
//! representation is therefore canonical and set equality is structural equality.
//!
//! Values are signed `i64`. Unsigned 64-bit ranges map onto this domain by
//! reinterpretation; a range that crosses `i64::MAX`/`i64::MIN` when read as unsigned is
//! stored as two intervals (see [`crate::analysis::symbolic::unsigned_range`]).
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::analysis::{LongInterval, LongSet};
//!
//! let small = LongSet::from_interval(LongInterval::new(0, 9));
//! let evens = LongSet::from_values([0, 2, 4, 6, 8]);
//! let odds = small.except_with(&evens);
//! assert!(odds.contains(3));
//! assert!(!odds.contains(4));
//! assert_eq!(odds.count(), 5);
//! ```

use std::fmt;

/// A closed interval `[start, end]` of `i64` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongInterval {
    start: i64,
    end: i64,
}

impl LongInterval {
    /// The interval covering every `i64`.
    pub const FULL: LongInterval = LongInterval {
        start: i64::MIN,
        end: i64::MAX,
    };

    /// Creates the interval `[start, end]`.
    ///
    /// # Panics
    ///
    /// Debug builds assert `start <= end`; use [`LongInterval::try_new`] for ranges that
    /// may be empty.
    #[must_use]
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "empty interval [{start}, {end}]");
        LongInterval { start, end }
    }

    /// Creates `[start, end]`, or `None` if `start > end`.
    #[must_use]
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        (start <= end).then_some(LongInterval { start, end })
    }

    /// Inclusive lower bound.
    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Inclusive upper bound.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Returns true if `value` lies inside the interval.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value <= self.end
    }

    /// Number of values in the interval (up to 2^64).
    #[must_use]
    pub fn count(&self) -> u128 {
        (i128::from(self.end) - i128::from(self.start) + 1) as u128
    }

    /// Overlap of two intervals.
    #[must_use]
    pub fn intersect(&self, other: &LongInterval) -> Option<LongInterval> {
        LongInterval::try_new(self.start.max(other.start), self.end.min(other.end))
    }
}

impl fmt::Display for LongInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

/// An immutable set of `i64` values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LongSet {
    intervals: Vec<LongInterval>,
}

impl LongSet {
    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        LongSet {
            intervals: Vec::new(),
        }
    }

    /// The set of all `i64` values.
    #[must_use]
    pub fn universe() -> Self {
        LongSet::from_interval(LongInterval::FULL)
    }

    /// The set `{value}`.
    #[must_use]
    pub fn single(value: i64) -> Self {
        LongSet::from_interval(LongInterval::new(value, value))
    }

    /// A set holding exactly one interval.
    #[must_use]
    pub fn from_interval(interval: LongInterval) -> Self {
        LongSet {
            intervals: vec![interval],
        }
    }

    /// The set `[start, end]`, empty if `start > end`.
    #[must_use]
    pub fn inclusive(start: i64, end: i64) -> Self {
        LongInterval::try_new(start, end).map_or_else(LongSet::empty, LongSet::from_interval)
    }

    /// Builds a set from arbitrary (possibly overlapping, unsorted) intervals.
    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = LongInterval>,
    {
        let mut sorted: Vec<LongInterval> = intervals.into_iter().collect();
        sorted.sort_by_key(|interval| interval.start);

        let mut merged: Vec<LongInterval> = Vec::with_capacity(sorted.len());
        for interval in sorted {
            match merged.last_mut() {
                // Overlapping or adjacent: extend the previous interval
                Some(last) if i128::from(interval.start) <= i128::from(last.end) + 1 => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        LongSet { intervals: merged }
    }

    /// Builds a set from individual values.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        LongSet::from_intervals(values.into_iter().map(|v| LongInterval::new(v, v)))
    }

    /// The canonical interval list.
    #[must_use]
    pub fn intervals(&self) -> &[LongInterval] {
        &self.intervals
    }

    /// Returns true if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Returns true if the set contains every `i64`.
    #[must_use]
    pub fn is_universe(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0] == LongInterval::FULL
    }

    /// Returns true if `value` is a member.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        let idx = self.intervals.partition_point(|interval| interval.end < value);
        self.intervals
            .get(idx)
            .is_some_and(|interval| interval.contains(value))
    }

    /// Number of elements (up to 2^64).
    #[must_use]
    pub fn count(&self) -> u128 {
        self.intervals.iter().map(LongInterval::count).sum()
    }

    /// The only element of a singleton set.
    #[must_use]
    pub fn single_value(&self) -> Option<i64> {
        match self.intervals.as_slice() {
            [interval] if interval.start == interval.end => Some(interval.start),
            _ => None,
        }
    }

    /// Iterates over the members in ascending order.
    ///
    /// Intended for small sets such as switch labels.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals
            .iter()
            .flat_map(|interval| interval.start..=interval.end)
    }

    /// `self ∪ other`
    #[must_use]
    pub fn union_with(&self, other: &LongSet) -> LongSet {
        LongSet::from_intervals(
            self.intervals
                .iter()
                .chain(other.intervals.iter())
                .copied(),
        )
    }

    /// `self ∩ other`
    #[must_use]
    pub fn intersect_with(&self, other: &LongSet) -> LongSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let a = self.intervals[i];
            let b = other.intervals[j];
            if let Some(overlap) = a.intersect(&b) {
                result.push(overlap);
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        // Overlaps of canonical inputs are already sorted, disjoint and non-adjacent
        LongSet { intervals: result }
    }

    /// `self \ other`
    #[must_use]
    pub fn except_with(&self, other: &LongSet) -> LongSet {
        self.intersect_with(&other.invert())
    }

    /// The complement with respect to all `i64` values.
    #[must_use]
    pub fn invert(&self) -> LongSet {
        let mut result = Vec::with_capacity(self.intervals.len() + 1);
        let mut next_start = Some(i64::MIN);
        for interval in &self.intervals {
            if let Some(start) = next_start {
                if start < interval.start {
                    result.push(LongInterval::new(start, interval.start - 1));
                }
            }
            next_start = interval.end.checked_add(1);
        }
        if let Some(start) = next_start {
            result.push(LongInterval::new(start, i64::MAX));
        }
        LongSet { intervals: result }
    }

    /// `{ v + offset | v ∈ self }` with two's-complement wraparound.
    ///
    /// An interval whose shifted image wraps past `i64::MAX` is split in two.
    #[must_use]
    pub fn add_offset(&self, offset: i64) -> LongSet {
        if offset == 0 {
            return self.clone();
        }
        let mut shifted = Vec::with_capacity(self.intervals.len() + 1);
        for interval in &self.intervals {
            let start = interval.start.wrapping_add(offset);
            let end = interval.end.wrapping_add(offset);
            if start <= end {
                shifted.push(LongInterval::new(start, end));
            } else {
                shifted.push(LongInterval::new(start, i64::MAX));
                shifted.push(LongInterval::new(i64::MIN, end));
            }
        }
        LongSet::from_intervals(shifted)
    }

    /// Returns true if both sets share at least one value.
    #[must_use]
    pub fn overlaps(&self, other: &LongSet) -> bool {
        !self.intersect_with(other).is_empty()
    }

    /// Returns true if every member of `self` is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &LongSet) -> bool {
        self.except_with(other).is_empty()
    }

    /// Set equality. Equivalent to `==` thanks to the canonical representation.
    #[must_use]
    pub fn set_equals(&self, other: &LongSet) -> bool {
        self == other
    }
}

impl fmt::Display for LongSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{interval}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> Vec<LongSet> {
        vec![
            LongSet::empty(),
            LongSet::universe(),
            LongSet::single(0),
            LongSet::single(i64::MIN),
            LongSet::single(i64::MAX),
            LongSet::inclusive(-5, 5),
            LongSet::from_values([1, 2, 3, 10, 12]),
            LongSet::inclusive(i64::MIN, -1),
            LongSet::inclusive(100, i64::MAX),
            LongSet::from_intervals([LongInterval::new(-20, -10), LongInterval::new(7, 9)]),
        ]
    }

    fn samples() -> Vec<i64> {
        vec![
            i64::MIN,
            i64::MIN + 1,
            -21,
            -20,
            -15,
            -10,
            -9,
            -6,
            -5,
            -1,
            0,
            1,
            2,
            3,
            4,
            5,
            6,
            7,
            9,
            10,
            11,
            12,
            13,
            99,
            100,
            i64::MAX - 1,
            i64::MAX,
        ]
    }

    #[test]
    fn test_normalization_merges_adjacent() {
        let set = LongSet::from_intervals([
            LongInterval::new(4, 6),
            LongInterval::new(1, 3),
            LongInterval::new(5, 8),
        ]);
        assert_eq!(set.intervals(), &[LongInterval::new(1, 8)]);
        assert_eq!(set.count(), 8);
    }

    #[test]
    fn test_union_contains_law() {
        for a in family() {
            for b in family() {
                let union = a.union_with(&b);
                for x in samples() {
                    assert_eq!(
                        union.contains(x),
                        a.contains(x) || b.contains(x),
                        "{a} ∪ {b} at {x}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_intersect_and_except_laws() {
        for a in family() {
            for b in family() {
                let inter = a.intersect_with(&b);
                let diff = a.except_with(&b);
                for x in samples() {
                    assert_eq!(inter.contains(x), a.contains(x) && b.contains(x));
                    assert_eq!(diff.contains(x), a.contains(x) && !b.contains(x));
                }
            }
        }
    }

    #[test]
    fn test_double_invert_is_identity() {
        for a in family() {
            assert_eq!(a.invert().invert(), a, "{a}");
            for x in samples() {
                assert_ne!(a.contains(x), a.invert().contains(x));
            }
        }
        assert!(LongSet::empty().invert().is_universe());
        assert!(LongSet::universe().invert().is_empty());
    }

    #[test]
    fn test_add_offset_wraps() {
        let set = LongSet::inclusive(i64::MAX - 1, i64::MAX);
        let shifted = set.add_offset(1);
        assert!(shifted.contains(i64::MAX));
        assert!(shifted.contains(i64::MIN));
        assert!(!shifted.contains(i64::MAX - 1));
        assert_eq!(shifted.intervals().len(), 2);

        assert!(LongSet::universe().add_offset(12345).is_universe());
        assert_eq!(
            LongSet::from_values([0, 1, 2]).add_offset(-5),
            LongSet::inclusive(-5, -3)
        );
    }

    #[test]
    fn test_single_value_and_values() {
        assert_eq!(LongSet::single(42).single_value(), Some(42));
        assert_eq!(LongSet::inclusive(1, 2).single_value(), None);
        let values: Vec<i64> = LongSet::from_values([3, 1, 2, 7]).values().collect();
        assert_eq!(values, vec![1, 2, 3, 7]);
    }

    #[test]
    fn test_display() {
        let set = LongSet::from_values([1, 3, 4, 5]);
        assert_eq!(set.to_string(), "{1, 3..=5}");
    }
}

use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;

use bitvec::order::Lsb0;
use bitvec::slice::BitSlice;
use bitvec::vec::BitVec;

/// Largest Unicode code point.
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Number of code points in the universe of a [`CharSet`].
const UNIVERSE: usize = MAX_CODE_POINT as usize + 1;

/// A set of Unicode code points, represented as a bitmap with one bit per
/// code point.
///
/// The bitmap only grows as far as the largest code point in the set, so
/// sets of ASCII characters are small. Sets are always kept trimmed (there
/// are no trailing zeroes), which means that two sets containing the same
/// code points compare equal.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct CharSet {
    bits: BitVec<usize, Lsb0>,
}

impl CharSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set that contains every code point.
    pub fn full() -> Self {
        Self { bits: BitVec::repeat(true, UNIVERSE) }
    }

    /// Returns a shared reference to the set that contains every code point.
    pub(crate) fn full_ref() -> &'static CharSet {
        static FULL: OnceLock<CharSet> = OnceLock::new();
        FULL.get_or_init(CharSet::full)
    }

    /// Creates a set with the code points of the characters in `s`.
    pub fn from_chars(s: &str) -> Self {
        let mut set = Self::new();
        for c in s.chars() {
            set.insert(c as u32);
        }
        set
    }

    /// Adds a code point to the set.
    ///
    /// # Panics
    ///
    /// If `c` is greater than [`MAX_CODE_POINT`].
    pub fn insert(&mut self, c: u32) {
        assert!(c <= MAX_CODE_POINT);
        let c = c as usize;
        if c >= self.bits.len() {
            self.bits.resize(c + 1, false);
        }
        self.bits.set(c, true);
    }

    /// Adds every code point in the inclusive range `lo..=hi`. Does nothing
    /// if `lo > hi`.
    ///
    /// # Panics
    ///
    /// If `hi` is greater than [`MAX_CODE_POINT`].
    pub fn insert_range(&mut self, lo: u32, hi: u32) {
        if lo > hi {
            return;
        }
        assert!(hi <= MAX_CODE_POINT);
        let (lo, hi) = (lo as usize, hi as usize);
        if hi >= self.bits.len() {
            self.bits.resize(hi + 1, false);
        }
        self.bits[lo..=hi].fill(true);
    }

    /// Returns true if the set contains the code point `c`.
    #[inline]
    pub fn contains(&self, c: u32) -> bool {
        let c = c as usize;
        c < self.bits.len() && self.bits[c]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Returns true if the set contains every code point.
    pub fn is_full(&self) -> bool {
        self.bits.len() == UNIVERSE && self.bits.all()
    }

    /// Number of code points in the set.
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    /// Smallest code point in the set.
    pub fn first(&self) -> Option<u32> {
        self.bits.first_one().map(|c| c as u32)
    }

    /// Adds every code point in `other` to this set.
    pub fn union_with(&mut self, other: &CharSet) {
        if other.bits.len() > self.bits.len() {
            self.bits.resize(other.bits.len(), false);
        }
        self.bits[..other.bits.len()] |= other.bits.as_bitslice();
    }

    /// Keeps only the code points that are also in `other`.
    pub fn intersect_with(&mut self, other: &CharSet) {
        let len = self.bits.len().min(other.bits.len());
        self.bits.truncate(len);
        self.bits &= &other.bits[..len];
        self.trim();
    }

    /// Removes every code point in `other` from this set.
    pub fn difference_with(&mut self, other: &CharSet) {
        let len = self.bits.len().min(other.bits.len());
        for c in other.bits[..len].iter_ones() {
            self.bits.set(c, false);
        }
        self.trim();
    }

    /// Returns true if both sets have at least one code point in common.
    pub fn intersects(&self, other: &CharSet) -> bool {
        let len = self.bits.len().min(other.bits.len());
        let mut common = self.bits[..len].to_bitvec();
        common &= &other.bits[..len];
        common.any()
    }

    /// Returns the set of code points that are not in this set.
    pub fn complement(&self) -> CharSet {
        let mut bits = self.bits.clone();
        bits.resize(UNIVERSE, false);
        let mut set = Self { bits: !bits };
        set.trim();
        set
    }

    /// Returns an iterator over the maximal runs of consecutive code points
    /// in the set, as inclusive `(first, last)` pairs in ascending order.
    pub fn ranges(&self) -> Ranges<'_> {
        Ranges { bits: self.bits.as_bitslice(), pos: 0 }
    }

    fn trim(&mut self) {
        let len = self.bits.last_one().map_or(0, |last| last + 1);
        self.bits.truncate(len);
    }
}

impl Debug for CharSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (lo, hi) in self.ranges() {
            if lo == hi {
                list.entry(&format_args!("{:x}", lo));
            } else {
                list.entry(&format_args!("{:x}-{:x}", lo, hi));
            }
        }
        list.finish()
    }
}

/// Iterator returned by [`CharSet::ranges`].
pub struct Ranges<'a> {
    bits: &'a BitSlice<usize, Lsb0>,
    pos: usize,
}

impl Iterator for Ranges<'_> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos + self.bits[self.pos..].first_one()?;
        let run = &self.bits[start..];
        let end = start + run.first_zero().unwrap_or(run.len());
        self.pos = end;
        Some((start as u32, end as u32 - 1))
    }
}

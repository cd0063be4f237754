//! The roaring set - a compressed set of `u32` values. The 32-bit domain is split
//! into 65536 buckets keyed by the high 16 bits of each value, and every non-empty
//! bucket is held in its own independently compressed container. This keeps
//! sparse data small while dense data gets bitmap speed for set operations.

use crate::container::{Container, ContainerIter};
use crate::error::Error;
use crate::AndNot;
use std::cmp::Ordering;
use std::fmt;
use std::iter::FromIterator;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Bound, RangeBounds};
use std::slice;

#[inline(always)]
fn split(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, value as u16)
}

#[inline(always)]
fn combine(key: u16, low: u16) -> u32 {
    ((key as u32) << 16) | low as u32
}

/// A set of `u32` values stored as a roaring bitmap.
///
/// Each value is split into a 16 bit key and a 16 bit low part. Values sharing a
/// key live in the same container, which is an array, bitmap or run list depending
/// on what is smallest for its content. Containers are kept sorted by key and an
/// empty container is never stored.
///
/// # Examples
/// ```
/// use roarset::RoaringSet;
///
/// let mut set_a = RoaringSet::new();
/// set_a.add(1);
/// set_a.add(70000);
///
/// let set_b: RoaringSet = vec![70000, 4294967295].into_iter().collect();
///
/// // Conduct an or (union) of the two sets.
/// let set_result = &set_a | &set_b;
/// assert_eq!(set_result.iter().collect::<Vec<_>>(), vec![1, 70000, 4294967295]);
/// assert_eq!(set_result.cardinality(), 3);
/// ```
#[derive(Clone, Default)]
pub struct RoaringSet {
    containers: Vec<(u16, Container)>,
}

impl RoaringSet {
    /// Construct a new, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_containers(containers: Vec<(u16, Container)>) -> Self {
        debug_assert!(containers.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(containers.iter().all(|(_, c)| !c.is_empty()));
        RoaringSet { containers }
    }

    pub(crate) fn containers(&self) -> &[(u16, Container)] {
        &self.containers
    }

    #[inline(always)]
    fn find(&self, key: u16) -> Result<usize, usize> {
        self.containers.binary_search_by_key(&key, |(k, _)| *k)
    }

    /// Insert a value into the set. Returns `true` if the value was not already
    /// present.
    pub fn add(&mut self, value: u32) -> bool {
        let (key, low) = split(value);
        // Sorted input always lands in the last container, so check it first.
        let found = match self.containers.last() {
            Some((last, _)) if *last == key => Ok(self.containers.len() - 1),
            _ => self.find(key),
        };
        match found {
            Ok(idx) => self.containers[idx].1.add(low),
            Err(idx) => {
                self.containers.insert(idx, (key, Container::from_low(low)));
                true
            }
        }
    }

    /// Insert a value given as a `u64`, as supplied by callers with wider integer
    /// types. Values outside the `u32` domain are rejected and the set is left
    /// unchanged.
    pub fn try_add(&mut self, value: u64) -> Result<bool, Error> {
        let value = u32::try_from(value).map_err(|_| Error::InvalidValue(value))?;
        Ok(self.add(value))
    }

    /// Insert every value of a range. Returns the number of values that were not
    /// already present.
    ///
    /// # Examples
    /// ```
    /// use roarset::RoaringSet;
    ///
    /// let mut set = RoaringSet::new();
    /// assert_eq!(set.add_range(10..20), 10);
    /// assert_eq!(set.add_range(15..=25), 6);
    /// assert_eq!(set.cardinality(), 16);
    /// ```
    pub fn add_range<R: RangeBounds<u32>>(&mut self, range: R) -> u64 {
        let start = match range.start_bound() {
            Bound::Included(&n) => n as u64,
            Bound::Excluded(&n) => n as u64 + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n as u64,
            Bound::Excluded(&0) => return 0,
            Bound::Excluded(&n) => n as u64 - 1,
            Bound::Unbounded => u32::MAX as u64,
        };
        if start > end {
            return 0;
        }

        let (start_key, start_low) = split(start as u32);
        let (end_key, end_low) = split(end as u32);

        let mut inserted = 0;
        for key in start_key..=end_key {
            let lo = if key == start_key { start_low } else { 0 };
            let hi = if key == end_key { end_low } else { u16::MAX };
            let range = Container::from_range(lo, hi);
            match self.find(key) {
                Ok(idx) => {
                    let existing = &mut self.containers[idx].1;
                    let before = existing.cardinality();
                    let merged = existing.union(&range);
                    inserted += (merged.cardinality() - before) as u64;
                    *existing = merged;
                }
                Err(idx) => {
                    inserted += range.cardinality() as u64;
                    self.containers.insert(idx, (key, range));
                }
            }
        }
        inserted
    }

    /// Remove a value from the set. Returns `true` if the value was present.
    pub fn remove(&mut self, value: u32) -> bool {
        let (key, low) = split(value);
        match self.find(key) {
            Ok(idx) => {
                let removed = self.containers[idx].1.remove(low);
                if self.containers[idx].1.is_empty() {
                    self.containers.remove(idx);
                }
                removed
            }
            Err(_) => false,
        }
    }

    /// Returns `true` if the value exists within the set.
    pub fn contains(&self, value: u32) -> bool {
        let (key, low) = split(value);
        self.find(key)
            .map(|idx| self.containers[idx].1.contains(low))
            .unwrap_or(false)
    }

    /// Returns the number of values in the set.
    pub fn cardinality(&self) -> u64 {
        self.containers
            .iter()
            .map(|(_, c)| c.cardinality() as u64)
            .sum()
    }

    /// Show if this set contains no values.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// The number of containers (non-empty 65536 value buckets) in the set.
    pub fn num_containers(&self) -> usize {
        self.containers.len()
    }

    /// The smallest value in the set.
    pub fn min(&self) -> Option<u32> {
        self.containers
            .first()
            .and_then(|(key, c)| c.min().map(|low| combine(*key, low)))
    }

    /// The largest value in the set.
    pub fn max(&self) -> Option<u32> {
        self.containers
            .last()
            .and_then(|(key, c)| c.max().map(|low| combine(*key, low)))
    }

    /// Iterate over the values of the set in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            containers: self.containers.iter(),
            current: None,
        }
    }

    /// Convert every container to its smallest representation. This is done
    /// implicitly by `serialize`, so is only needed to reduce memory use. Returns
    /// `true` if any container changed.
    pub fn optimize(&mut self) -> bool {
        self.containers
            .iter_mut()
            .fold(false, |changed, (_, c)| c.optimize() || changed)
    }

    /// Returns a new set holding the values present in either set.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    /// Returns a new set holding the values present in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut containers = Vec::with_capacity(self.containers.len().min(other.containers.len()));

        let mut liter = self.containers.iter();
        let mut riter = other.containers.iter();

        let mut lnext = liter.next();
        let mut rnext = riter.next();

        while let (Some((lkey, lcon)), Some((rkey, rcon))) = (lnext, rnext) {
            match lkey.cmp(rkey) {
                Ordering::Equal => {
                    let con = lcon.intersect(rcon);
                    if !con.is_empty() {
                        containers.push((*lkey, con));
                    }
                    lnext = liter.next();
                    rnext = riter.next();
                }
                Ordering::Less => {
                    lnext = liter.next();
                }
                Ordering::Greater => {
                    rnext = riter.next();
                }
            }
        }

        RoaringSet { containers }
    }

    /// Returns a new set holding the values of this set that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.difference_with(other);
        result
    }

    /// Add every value of `other` to this set.
    pub fn union_with(&mut self, other: &Self) {
        let lhs = std::mem::take(&mut self.containers);
        let mut containers = Vec::with_capacity(lhs.len() + other.containers.len());

        let mut liter = lhs.into_iter();
        let mut riter = other.containers.iter();

        let mut lnext = liter.next();
        let mut rnext = riter.next();

        loop {
            match (lnext, rnext) {
                (Some((lkey, lcon)), Some((rkey, rcon))) => match lkey.cmp(rkey) {
                    Ordering::Equal => {
                        containers.push((lkey, lcon.union(rcon)));
                        lnext = liter.next();
                        rnext = riter.next();
                    }
                    Ordering::Less => {
                        containers.push((lkey, lcon));
                        lnext = liter.next();
                    }
                    Ordering::Greater => {
                        containers.push((*rkey, rcon.clone()));
                        lnext = Some((lkey, lcon));
                        rnext = riter.next();
                    }
                },
                (Some(l), None) => {
                    containers.push(l);
                    containers.extend(liter);
                    break;
                }
                (None, Some(r)) => {
                    containers.push(r.clone());
                    containers.extend(riter.cloned());
                    break;
                }
                (None, None) => break,
            }
        }

        self.containers = containers;
    }

    /// Remove every value from this set that is not also in `other`. This is the
    /// in-place form of `intersection`, use it when the original set is no longer
    /// needed.
    pub fn intersect_with(&mut self, other: &Self) {
        let mut ridx = 0;
        self.containers.retain_mut(|(key, con)| {
            while ridx < other.containers.len() && other.containers[ridx].0 < *key {
                ridx += 1;
            }
            match other.containers.get(ridx) {
                Some((rkey, rcon)) if rkey == key => {
                    *con = con.intersect(rcon);
                    !con.is_empty()
                }
                _ => false,
            }
        });
    }

    /// Remove every value of `other` from this set.
    pub fn difference_with(&mut self, other: &Self) {
        let mut ridx = 0;
        self.containers.retain_mut(|(key, con)| {
            while ridx < other.containers.len() && other.containers[ridx].0 < *key {
                ridx += 1;
            }
            match other.containers.get(ridx) {
                Some((rkey, rcon)) if rkey == key => {
                    *con = con.difference(rcon);
                    !con.is_empty()
                }
                _ => true,
            }
        });
    }
}

impl PartialEq for RoaringSet {
    /// Sets are equal when they hold the same values, regardless of how each
    /// container happens to be represented.
    fn eq(&self, other: &Self) -> bool {
        self.containers.len() == other.containers.len()
            && self
                .containers
                .iter()
                .zip(other.containers.iter())
                .all(|((lkey, lcon), (rkey, rcon))| lkey == rkey && lcon == rcon)
    }
}

impl Eq for RoaringSet {}

impl fmt::Display for RoaringSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RoaringSet (containers) {:?} (values) <optimised out>",
            self.containers.len()
        )
    }
}

impl fmt::Debug for RoaringSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RoaringSet {:?} [ ", self.containers)?;
        for value in self {
            write!(f, "{}, ", value)?;
        }
        write!(f, "]")
    }
}

impl FromIterator<u32> for RoaringSet {
    /// Build a set from an iterator. Sorted input takes a fast append path.
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = RoaringSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<u32> for RoaringSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        iter.into_iter().for_each(|value| {
            self.add(value);
        });
    }
}

impl BitAnd for &RoaringSet {
    type Output = RoaringSet;

    /// Perform an And (intersection) operation between two sets. This returns
    /// a new set containing the results.
    ///
    /// # Examples
    /// ```
    /// # use roarset::RoaringSet;
    /// let set_a: RoaringSet = vec![1, 2, 3].into_iter().collect();
    /// let set_b: RoaringSet = vec![2].into_iter().collect();
    ///
    /// let set_result = &set_a & &set_b;
    ///
    /// let set_expect: RoaringSet = vec![2].into_iter().collect();
    /// assert_eq!(set_result, set_expect);
    /// ```
    fn bitand(self, rhs: &RoaringSet) -> RoaringSet {
        self.intersection(rhs)
    }
}

impl BitAnd for RoaringSet {
    type Output = RoaringSet;

    /// Perform an And (intersection) operation between two sets, reusing the
    /// storage of the left set.
    fn bitand(mut self, rhs: RoaringSet) -> RoaringSet {
        self.intersect_with(&rhs);
        self
    }
}

impl BitAndAssign<&RoaringSet> for RoaringSet {
    fn bitand_assign(&mut self, rhs: &RoaringSet) {
        self.intersect_with(rhs)
    }
}

impl BitOr for &RoaringSet {
    type Output = RoaringSet;

    /// Perform an Or (union) operation between two sets. This returns
    /// a new set containing the results.
    ///
    /// # Examples
    /// ```
    /// # use roarset::RoaringSet;
    /// let set_a: RoaringSet = vec![1, 2, 3].into_iter().collect();
    /// let set_b: RoaringSet = vec![2, 100000].into_iter().collect();
    ///
    /// let set_result = &set_a | &set_b;
    ///
    /// let set_expect: RoaringSet = vec![1, 2, 3, 100000].into_iter().collect();
    /// assert_eq!(set_result, set_expect);
    /// ```
    fn bitor(self, rhs: &RoaringSet) -> RoaringSet {
        self.union(rhs)
    }
}

impl BitOr for RoaringSet {
    type Output = RoaringSet;

    /// Perform an Or (union) operation between two sets, reusing the storage of
    /// the left set.
    fn bitor(mut self, rhs: RoaringSet) -> RoaringSet {
        self.union_with(&rhs);
        self
    }
}

impl BitOrAssign<&RoaringSet> for RoaringSet {
    fn bitor_assign(&mut self, rhs: &RoaringSet) {
        self.union_with(rhs)
    }
}

impl AndNot for RoaringSet {
    type Output = RoaringSet;

    /// Perform an AndNot (exclude) operation between two sets. The set on the
    /// right is the candidate set to exclude from the set of the left.
    ///
    /// # Examples
    /// ```
    /// // Note the change to import the AndNot trait.
    /// use roarset::{AndNot, RoaringSet};
    ///
    /// let set_a: RoaringSet = vec![1, 2, 3].into_iter().collect();
    /// let set_b: RoaringSet = vec![2].into_iter().collect();
    ///
    /// let set_result = set_a.andnot(set_b);
    ///
    /// let set_expect: RoaringSet = vec![1, 3].into_iter().collect();
    /// assert_eq!(set_result, set_expect);
    /// ```
    fn andnot(mut self, rhs: RoaringSet) -> RoaringSet {
        self.difference_with(&rhs);
        self
    }
}

impl AndNot for &RoaringSet {
    type Output = RoaringSet;

    /// Perform an AndNot (exclude) operation between two sets. This returns
    /// a new set containing the results.
    ///
    /// # Examples
    /// ```
    /// use roarset::{AndNot, RoaringSet};
    ///
    /// let set_a: RoaringSet = vec![1, 2, 3].into_iter().collect();
    /// let set_b: RoaringSet = vec![2].into_iter().collect();
    ///
    /// // Note how reversing a and b here will return an empty set.
    /// let set_result = (&set_b).andnot(&set_a);
    ///
    /// assert!(set_result.is_empty());
    /// ```
    fn andnot(self, rhs: &RoaringSet) -> RoaringSet {
        self.difference(rhs)
    }
}

/// An iterator over the values of a `RoaringSet`, in ascending order.
#[derive(Debug)]
pub struct Iter<'a> {
    containers: slice::Iter<'a, (u16, Container)>,
    current: Option<(u16, ContainerIter<'a>)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some((key, citer)) = &mut self.current {
                if let Some(low) = citer.next() {
                    return Some(combine(*key, low));
                }
            }
            let (key, con) = self.containers.next()?;
            self.current = Some((*key, con.iter()));
        }
    }
}

impl<'a> IntoIterator for &'a RoaringSet {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

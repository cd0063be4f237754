//! Containers hold the low 16 bits of every value sharing one key. A container is
//! one of three representations, and adapts between them based on its content:
//!
//! * `Array` - a sorted list of values, for sparse content.
//! * `Bitmap` - a fixed 65536 bit vector, for dense content.
//! * `Run` - a sorted list of inclusive ranges, for clustered content.
//!
//! Set operations between containers pick the cheapest algorithm for the pair of
//! representations involved, and the result is normalised so that the invariants
//! below hold once an operation returns.
//!
//! * A non-run container is an `Array` if and only if it holds at most
//!   [`ARRAY_MAX_SIZE`] values.
//! * A `Run` container is only kept while it encodes smaller than the best non-run
//!   form of the same content.

use smallvec::{smallvec, SmallVec};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::{fmt, slice};
use tracing::trace;

/// Above this many values an array container is promoted to a bitmap. 4096 `u16`
/// values occupy the same 8KB as a bitmap container.
pub(crate) const ARRAY_MAX_SIZE: usize = 4096;

/// Number of `u64` words in a bitmap container.
pub(crate) const BITMAP_WORDS: usize = 1024;

/// Encoded size of a bitmap container.
pub(crate) const BITMAP_BYTES: usize = BITMAP_WORDS * 8;

/// Most keys in an ID workload only hold a handful of values, so we keep a small
/// number of them inline before spilling to the heap. 8 values fit in the space
/// the heap pointer and length would take anyway.
const DEFAULT_ARRAY_ALLOC: usize = 8;

/// When one array is this many times larger than the other, binary searching the
/// larger one for each value of the smaller one beats a linear merge.
const FAST_PATH_BST_RATIO: usize = 8;

pub(crate) type Lows = SmallVec<[u16; DEFAULT_ARRAY_ALLOC]>;
pub(crate) type Words = Box<[u64; BITMAP_WORDS]>;

/// An inclusive range of values, `start ..= start + length`. The length is stored
/// as the number of values minus one so that a full container is representable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Run {
    pub(crate) start: u16,
    pub(crate) length: u16,
}

impl Run {
    #[inline(always)]
    pub(crate) fn new(start: u16, end: u16) -> Self {
        debug_assert!(start <= end);
        Run {
            start,
            length: end - start,
        }
    }

    #[inline(always)]
    pub(crate) fn end(&self) -> u16 {
        self.start + self.length
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.length as usize + 1
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Kind {
    Array,
    Bitmap,
    Run,
}

#[derive(Clone)]
pub(crate) enum Container {
    Array(Lows),
    Bitmap(Words),
    Run(Vec<Run>),
}

#[inline(always)]
fn word_bit(low: u16) -> (usize, u64) {
    ((low >> 6) as usize, 1 << (low & 63))
}

fn empty_words() -> Words {
    Box::new([0; BITMAP_WORDS])
}

fn popcount(words: &[u64; BITMAP_WORDS]) -> usize {
    words.iter().map(|w| w.count_ones() as usize).sum()
}

/// Set every bit in `start ..= end`.
fn set_range(words: &mut [u64; BITMAP_WORDS], start: u16, end: u16) {
    let (sw, ew) = ((start >> 6) as usize, (end >> 6) as usize);
    let first = !0u64 << (start & 63);
    let last = !0u64 >> (63 - (end & 63));
    if sw == ew {
        words[sw] |= first & last;
    } else {
        words[sw] |= first;
        words[sw + 1..ew].iter_mut().for_each(|w| *w = !0);
        words[ew] |= last;
    }
}

fn runs_to_words(runs: &[Run]) -> Words {
    let mut words = empty_words();
    runs.iter()
        .for_each(|r| set_range(&mut words, r.start, r.end()));
    words
}

/// Count the maximal runs of set bits. A bit starts a run when the bit below it
/// (carried over from the previous word for bit 0) is clear.
fn count_runs_words(words: &[u64; BITMAP_WORDS]) -> usize {
    let mut carry = 0u64;
    words.iter().fold(0, |acc, &w| {
        let starts = w & !((w << 1) | carry);
        carry = w >> 63;
        acc + starts.count_ones() as usize
    })
}

/// Append `start ..= end` to a run list sorted by start, coalescing it with the
/// last run when they overlap or touch.
pub(crate) fn push_run(runs: &mut Vec<Run>, start: u16, end: u16) {
    if let Some(last) = runs.last_mut() {
        debug_assert!(start >= last.start);
        if start as u32 <= last.end() as u32 + 1 {
            if end > last.end() {
                last.length = end - last.start;
            }
            return;
        }
    }
    runs.push(Run::new(start, end));
}

fn runs_from_sorted<I: Iterator<Item = u16>>(iter: I) -> Vec<Run> {
    let mut runs = Vec::new();
    iter.for_each(|v| push_run(&mut runs, v, v));
    runs
}

#[inline(always)]
fn run_size(nruns: usize) -> usize {
    2 + 4 * nruns
}

/// The smallest representation for content with `card` values forming `nruns` runs.
fn smallest_kind(card: usize, nruns: usize) -> Kind {
    let (kind, size) = if card <= ARRAY_MAX_SIZE {
        (Kind::Array, card * 2)
    } else {
        (Kind::Bitmap, BITMAP_BYTES)
    };
    if run_size(nruns) < size {
        Kind::Run
    } else {
        kind
    }
}

fn add_to_runs(runs: &mut Vec<Run>, low: u16) -> bool {
    // First run that ends at or after the value.
    let pos = runs.partition_point(|r| r.end() < low);
    if pos < runs.len() && runs[pos].start <= low {
        return false;
    }

    let extend_prev = pos > 0 && runs[pos - 1].end() as u32 + 1 == low as u32;
    let extend_next = pos < runs.len() && runs[pos].start as u32 == low as u32 + 1;

    match (extend_prev, extend_next) {
        (true, true) => {
            let end = runs[pos].end();
            runs[pos - 1].length = end - runs[pos - 1].start;
            runs.remove(pos);
        }
        (true, false) => runs[pos - 1].length += 1,
        (false, true) => {
            runs[pos].start = low;
            runs[pos].length += 1;
        }
        (false, false) => runs.insert(pos, Run::new(low, low)),
    }
    true
}

fn search_runs(runs: &[Run], low: u16) -> Result<usize, usize> {
    runs.binary_search_by(|r| {
        if r.end() < low {
            Ordering::Less
        } else if r.start > low {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

fn remove_from_runs(runs: &mut Vec<Run>, low: u16) -> bool {
    let pos = match search_runs(runs, low) {
        Ok(pos) => pos,
        Err(_) => return false,
    };

    let run = runs[pos];
    let end = run.end();
    if run.length == 0 {
        runs.remove(pos);
    } else if low == run.start {
        runs[pos] = Run::new(low + 1, end);
    } else if low == end {
        runs[pos].length -= 1;
    } else {
        // Split around the value.
        runs[pos] = Run::new(run.start, low - 1);
        runs.insert(pos + 1, Run::new(low + 1, end));
    }
    true
}

fn union_arrays(lhs: &[u16], rhs: &[u16]) -> Lows {
    let mut nlist = SmallVec::with_capacity(lhs.len() + rhs.len());

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        let n = match l.cmp(r) {
            Ordering::Equal => {
                lnext = liter.next();
                rnext = riter.next();
                l
            }
            Ordering::Less => {
                lnext = liter.next();
                l
            }
            Ordering::Greater => {
                rnext = riter.next();
                r
            }
        };
        nlist.push(*n);
    }

    // At most one of these has anything left.
    nlist.extend(lnext.into_iter().chain(liter).copied());
    nlist.extend(rnext.into_iter().chain(riter).copied());
    nlist
}

fn intersect_arrays_fast_path(smol: &[u16], lrg: &[u16]) -> Lows {
    let mut nlist = SmallVec::with_capacity(smol.len());
    // We cache the idx inbetween to narrow the bst sizes.
    let mut idx_min = 0;
    smol.iter().for_each(|id| {
        let (_, partition) = lrg.split_at(idx_min);
        match partition.binary_search(id) {
            Ok(idx) => {
                debug_assert!(Ok(idx + idx_min) == lrg.binary_search(id));
                nlist.push(*id);
                idx_min += idx;
            }
            Err(idx) => idx_min += idx,
        }
    });
    nlist
}

fn intersect_arrays(lhs: &[u16], rhs: &[u16]) -> Lows {
    // Fast path if there is a really large difference in the sizes.
    if !lhs.is_empty() && (rhs.len() / lhs.len()) >= FAST_PATH_BST_RATIO {
        return intersect_arrays_fast_path(lhs, rhs);
    } else if !rhs.is_empty() && (lhs.len() / rhs.len()) >= FAST_PATH_BST_RATIO {
        return intersect_arrays_fast_path(rhs, lhs);
    }

    let mut nlist = SmallVec::with_capacity(lhs.len().min(rhs.len()));

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        match l.cmp(r) {
            Ordering::Equal => {
                nlist.push(*l);
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
    nlist
}

fn difference_arrays(lhs: &[u16], rhs: &[u16]) -> Lows {
    let mut nlist = SmallVec::with_capacity(lhs.len());

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        match l.cmp(r) {
            Ordering::Equal => {
                // It's in right, so exclude.
                lnext = liter.next();
                rnext = riter.next();
            }
            Ordering::Less => {
                nlist.push(*l);
                lnext = liter.next();
            }
            Ordering::Greater => {
                rnext = riter.next();
            }
        }
    }

    // Drain remaining left elements.
    nlist.extend(lnext.into_iter().chain(liter).copied());
    nlist
}

/// Keep the values of `arr` that are (or are not) covered by `runs`.
fn filter_array_by_runs(arr: &[u16], runs: &[Run], inside: bool) -> Lows {
    let mut nlist = SmallVec::with_capacity(arr.len());
    let mut riter = runs.iter().peekable();
    for &v in arr {
        while riter.next_if(|r| r.end() < v).is_some() {}
        let covered = riter.peek().is_some_and(|r| r.start <= v);
        if covered == inside {
            nlist.push(v);
        }
    }
    nlist
}

fn union_runs(lhs: &[Run], rhs: &[Run]) -> Vec<Run> {
    let mut runs = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() || j < rhs.len() {
        let next = if j >= rhs.len() || (i < lhs.len() && lhs[i].start <= rhs[j].start) {
            i += 1;
            lhs[i - 1]
        } else {
            j += 1;
            rhs[j - 1]
        };
        push_run(&mut runs, next.start, next.end());
    }
    runs
}

fn intersect_runs(lhs: &[Run], rhs: &[Run]) -> Vec<Run> {
    let mut runs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        let (l, r) = (lhs[i], rhs[j]);
        let start = l.start.max(r.start);
        let end = l.end().min(r.end());
        if start <= end {
            push_run(&mut runs, start, end);
        }
        // Advance whichever run finishes first, the other may still overlap.
        if l.end() < r.end() {
            i += 1;
        } else {
            j += 1;
        }
    }
    runs
}

fn difference_runs(lhs: &[Run], rhs: &[Run]) -> Vec<Run> {
    let mut runs = Vec::with_capacity(lhs.len());
    let mut j = 0;
    for run in lhs {
        let end = run.end() as u32;
        let mut cur = run.start as u32;
        while j < rhs.len() && (rhs[j].end() as u32) < cur {
            j += 1;
        }
        // Cuts may extend into the next left run, so scan without consuming them.
        let mut k = j;
        while cur <= end && k < rhs.len() && rhs[k].start as u32 <= end {
            let cut = rhs[k];
            if cut.start as u32 > cur {
                runs.push(Run::new(cur as u16, cut.start - 1));
            }
            cur = cur.max(cut.end() as u32 + 1);
            k += 1;
        }
        if cur <= end {
            runs.push(Run::new(cur as u16, end as u16));
        }
    }
    runs
}

impl Container {
    pub(crate) fn from_low(low: u16) -> Self {
        Container::Array(smallvec![low])
    }

    /// A container holding every value of `start ..= end`, normalised.
    pub(crate) fn from_range(start: u16, end: u16) -> Self {
        let mut container = Container::Run(vec![Run::new(start, end)]);
        container.normalize();
        container
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Container::Array(_) => Kind::Array,
            Container::Bitmap(_) => Kind::Bitmap,
            Container::Run(_) => Kind::Run,
        }
    }

    pub(crate) fn cardinality(&self) -> usize {
        match self {
            Container::Array(arr) => arr.len(),
            Container::Bitmap(words) => popcount(words),
            Container::Run(runs) => runs.iter().map(Run::len).sum(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Container::Array(arr) => arr.is_empty(),
            Container::Bitmap(words) => words.iter().all(|&w| w == 0),
            Container::Run(runs) => runs.is_empty(),
        }
    }

    /// The number of maximal runs of consecutive values.
    pub(crate) fn num_runs(&self) -> usize {
        match self {
            Container::Array(arr) => {
                if arr.is_empty() {
                    0
                } else {
                    1 + arr.windows(2).filter(|w| w[1] != w[0] + 1).count()
                }
            }
            Container::Bitmap(words) => count_runs_words(words),
            Container::Run(runs) => runs.len(),
        }
    }

    pub(crate) fn contains(&self, low: u16) -> bool {
        match self {
            Container::Array(arr) => arr.binary_search(&low).is_ok(),
            Container::Bitmap(words) => {
                let (w, b) = word_bit(low);
                words[w] & b != 0
            }
            Container::Run(runs) => search_runs(runs, low).is_ok(),
        }
    }

    /// Insert a value, returning true if it was not already present.
    pub(crate) fn add(&mut self, low: u16) -> bool {
        let added = match self {
            Container::Array(arr) => match arr.binary_search(&low) {
                Ok(_) => false,
                Err(idx) => {
                    arr.insert(idx, low);
                    true
                }
            },
            Container::Bitmap(words) => {
                let (w, b) = word_bit(low);
                let added = words[w] & b == 0;
                words[w] |= b;
                added
            }
            Container::Run(runs) => add_to_runs(runs, low),
        };
        // A bitmap only grows here, so it can never need demoting.
        if added && self.kind() != Kind::Bitmap {
            self.normalize();
        }
        added
    }

    /// Remove a value, returning true if it was present. The container may be
    /// left empty, which the caller must handle.
    pub(crate) fn remove(&mut self, low: u16) -> bool {
        let removed = match self {
            Container::Array(arr) => match arr.binary_search(&low) {
                Ok(idx) => {
                    arr.remove(idx);
                    true
                }
                Err(_) => false,
            },
            Container::Bitmap(words) => {
                let (w, b) = word_bit(low);
                let removed = words[w] & b != 0;
                words[w] &= !b;
                removed
            }
            Container::Run(runs) => remove_from_runs(runs, low),
        };
        if removed {
            self.normalize();
        }
        removed
    }

    pub(crate) fn min(&self) -> Option<u16> {
        self.iter().next()
    }

    pub(crate) fn max(&self) -> Option<u16> {
        match self {
            Container::Array(arr) => arr.last().copied(),
            Container::Bitmap(words) => words
                .iter()
                .enumerate()
                .rev()
                .find(|(_, w)| **w != 0)
                .map(|(idx, w)| ((idx << 6) + 63 - w.leading_zeros() as usize) as u16),
            Container::Run(runs) => runs.last().map(Run::end),
        }
    }

    pub(crate) fn iter(&self) -> ContainerIter<'_> {
        match self {
            Container::Array(arr) => ContainerIter::Array(arr.iter()),
            Container::Bitmap(words) => ContainerIter::Bitmap {
                words,
                idx: 0,
                word: words[0],
            },
            Container::Run(runs) => ContainerIter::Run {
                runs: runs.iter(),
                next: 1,
                end: 0,
            },
        }
    }

    fn to_words(&self) -> Words {
        match self {
            Container::Array(arr) => {
                let mut words = empty_words();
                arr.iter().for_each(|&v| {
                    let (w, b) = word_bit(v);
                    words[w] |= b;
                });
                words
            }
            Container::Bitmap(words) => words.clone(),
            Container::Run(runs) => runs_to_words(runs),
        }
    }

    fn to_runs(&self) -> Vec<Run> {
        match self {
            Container::Run(runs) => runs.clone(),
            _ => runs_from_sorted(self.iter()),
        }
    }

    fn converted(&self, target: Kind) -> Container {
        match target {
            Kind::Array => Container::Array(self.iter().collect()),
            Kind::Bitmap => Container::Bitmap(self.to_words()),
            Kind::Run => Container::Run(self.to_runs()),
        }
    }

    fn convert(&mut self, target: Kind) {
        let from = self.kind();
        if from != target {
            *self = self.converted(target);
            trace!(?from, to = ?target, "converted container");
        }
    }

    /// Restore the representation invariants after a mutation. This never promotes
    /// to a run container, that is left to `optimize`.
    pub(crate) fn normalize(&mut self) {
        let target = match self {
            Container::Array(arr) if arr.len() > ARRAY_MAX_SIZE => Kind::Bitmap,
            Container::Bitmap(words) if popcount(words) <= ARRAY_MAX_SIZE => Kind::Array,
            Container::Run(runs) => smallest_kind(runs.iter().map(Run::len).sum(), runs.len()),
            _ => return,
        };
        self.convert(target);
    }

    /// The smallest representation for the current content.
    pub(crate) fn best_kind(&self) -> Kind {
        smallest_kind(self.cardinality(), self.num_runs())
    }

    /// Convert to the smallest representation for the current content. Returns
    /// true if the representation changed.
    pub(crate) fn optimize(&mut self) -> bool {
        let target = self.best_kind();
        if target == self.kind() {
            false
        } else {
            self.convert(target);
            true
        }
    }

    /// The optimized form of this container, borrowing when it already is optimal.
    pub(crate) fn optimized(&self) -> Cow<'_, Container> {
        let target = self.best_kind();
        if target == self.kind() {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(self.converted(target))
        }
    }

    pub(crate) fn union(&self, other: &Self) -> Self {
        let mut result = match (self, other) {
            (Container::Array(lhs), Container::Array(rhs)) => {
                Container::Array(union_arrays(lhs, rhs))
            }
            (Container::Bitmap(lhs), Container::Bitmap(rhs)) => {
                let mut words = lhs.clone();
                words.iter_mut().zip(rhs.iter()).for_each(|(l, r)| *l |= r);
                Container::Bitmap(words)
            }
            (Container::Array(arr), Container::Bitmap(words))
            | (Container::Bitmap(words), Container::Array(arr)) => {
                let mut words = words.clone();
                arr.iter().for_each(|&v| {
                    let (w, b) = word_bit(v);
                    words[w] |= b;
                });
                Container::Bitmap(words)
            }
            (Container::Run(lhs), Container::Run(rhs)) => Container::Run(union_runs(lhs, rhs)),
            (Container::Run(runs), Container::Array(arr))
            | (Container::Array(arr), Container::Run(runs)) => {
                let arr_runs = runs_from_sorted(arr.iter().copied());
                Container::Run(union_runs(runs, &arr_runs))
            }
            (Container::Run(runs), Container::Bitmap(words))
            | (Container::Bitmap(words), Container::Run(runs)) => {
                let mut words = words.clone();
                runs.iter()
                    .for_each(|r| set_range(&mut words, r.start, r.end()));
                Container::Bitmap(words)
            }
        };
        result.normalize();
        result
    }

    /// The values present in both containers. The result may be empty.
    pub(crate) fn intersect(&self, other: &Self) -> Self {
        let mut result = match (self, other) {
            (Container::Array(lhs), Container::Array(rhs)) => {
                Container::Array(intersect_arrays(lhs, rhs))
            }
            (Container::Bitmap(lhs), Container::Bitmap(rhs)) => {
                let mut words = lhs.clone();
                words.iter_mut().zip(rhs.iter()).for_each(|(l, r)| *l &= r);
                Container::Bitmap(words)
            }
            (Container::Array(arr), Container::Bitmap(words))
            | (Container::Bitmap(words), Container::Array(arr)) => Container::Array(
                arr.iter()
                    .copied()
                    .filter(|&v| {
                        let (w, b) = word_bit(v);
                        words[w] & b != 0
                    })
                    .collect(),
            ),
            (Container::Array(arr), Container::Run(runs))
            | (Container::Run(runs), Container::Array(arr)) => {
                Container::Array(filter_array_by_runs(arr, runs, true))
            }
            (Container::Run(lhs), Container::Run(rhs)) => {
                Container::Run(intersect_runs(lhs, rhs))
            }
            (Container::Run(runs), Container::Bitmap(words))
            | (Container::Bitmap(words), Container::Run(runs)) => {
                let mut mask = runs_to_words(runs);
                mask.iter_mut().zip(words.iter()).for_each(|(m, w)| *m &= w);
                Container::Bitmap(mask)
            }
        };
        result.normalize();
        result
    }

    /// The values of this container that are not in `other`. The result may be empty.
    pub(crate) fn difference(&self, other: &Self) -> Self {
        let mut result = match (self, other) {
            (Container::Array(lhs), Container::Array(rhs)) => {
                Container::Array(difference_arrays(lhs, rhs))
            }
            (Container::Array(arr), Container::Bitmap(words)) => Container::Array(
                arr.iter()
                    .copied()
                    .filter(|&v| {
                        let (w, b) = word_bit(v);
                        words[w] & b == 0
                    })
                    .collect(),
            ),
            (Container::Array(arr), Container::Run(runs)) => {
                Container::Array(filter_array_by_runs(arr, runs, false))
            }
            (Container::Bitmap(lhs), Container::Bitmap(rhs)) => {
                let mut words = lhs.clone();
                words.iter_mut().zip(rhs.iter()).for_each(|(l, r)| *l &= !r);
                Container::Bitmap(words)
            }
            (Container::Bitmap(words), Container::Array(arr)) => {
                let mut words = words.clone();
                arr.iter().for_each(|&v| {
                    let (w, b) = word_bit(v);
                    words[w] &= !b;
                });
                Container::Bitmap(words)
            }
            (Container::Bitmap(words), Container::Run(runs)) => {
                let mask = runs_to_words(runs);
                let mut words = words.clone();
                words.iter_mut().zip(mask.iter()).for_each(|(w, m)| *w &= !m);
                Container::Bitmap(words)
            }
            (Container::Run(lhs), Container::Run(rhs)) => {
                Container::Run(difference_runs(lhs, rhs))
            }
            (Container::Run(runs), Container::Array(arr)) => {
                let arr_runs = runs_from_sorted(arr.iter().copied());
                Container::Run(difference_runs(runs, &arr_runs))
            }
            (Container::Run(runs), Container::Bitmap(words)) => {
                let mut lhs = runs_to_words(runs);
                lhs.iter_mut().zip(words.iter()).for_each(|(l, w)| *l &= !w);
                Container::Bitmap(lhs)
            }
        };
        result.normalize();
        result
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Container::Array(lhs), Container::Array(rhs)) => lhs == rhs,
            (Container::Bitmap(lhs), Container::Bitmap(rhs)) => lhs == rhs,
            // Runs are always kept coalesced, so equal content means equal lists.
            (Container::Run(lhs), Container::Run(rhs)) => lhs == rhs,
            _ => self.cardinality() == other.cardinality() && self.iter().eq(other.iter()),
        }
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Array(arr) => write!(f, "Array ({} values)", arr.len()),
            Container::Bitmap(_) => write!(f, "Bitmap ({} values)", self.cardinality()),
            Container::Run(runs) => write!(
                f,
                "Run ({} runs, {} values)",
                runs.len(),
                self.cardinality()
            ),
        }
    }
}

/// Ascending iteration over the values of a container.
#[derive(Debug)]
pub(crate) enum ContainerIter<'a> {
    Array(slice::Iter<'a, u16>),
    Bitmap {
        words: &'a [u64; BITMAP_WORDS],
        idx: usize,
        word: u64,
    },
    Run {
        runs: slice::Iter<'a, Run>,
        next: u32,
        end: u32,
    },
}

impl<'a> Iterator for ContainerIter<'a> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match self {
            ContainerIter::Array(i) => i.next().copied(),
            ContainerIter::Bitmap { words, idx, word } => loop {
                if *word != 0 {
                    let bit = word.trailing_zeros() as usize;
                    // Clear the lowest set bit.
                    *word &= *word - 1;
                    return Some(((*idx << 6) + bit) as u16);
                }
                if *idx + 1 >= BITMAP_WORDS {
                    return None;
                }
                *idx += 1;
                *word = words[*idx];
            },
            ContainerIter::Run { runs, next, end } => {
                if *next > *end {
                    let run = runs.next()?;
                    *next = run.start as u32;
                    *end = run.end() as u32;
                }
                let value = *next;
                *next += 1;
                Some(value as u16)
            }
        }
    }
}

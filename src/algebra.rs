//! Set algebra over many sets at once.

use crate::error::Error;
use crate::set::RoaringSet;
use tracing::trace;

/// Union all the given sets into a new set. The inputs are not modified. An empty
/// input produces an empty set.
///
/// # Examples
/// ```
/// use roarset::{union_many, RoaringSet};
///
/// let sets: Vec<RoaringSet> = (0..10).map(|i| vec![i * 100_000].into_iter().collect()).collect();
/// let result = union_many(&sets);
/// assert_eq!(result.cardinality(), 10);
/// ```
pub fn union_many<'a, I>(sets: I) -> RoaringSet
where
    I: IntoIterator<Item = &'a RoaringSet>,
{
    let mut operands = 0;
    let result = sets.into_iter().fold(RoaringSet::new(), |mut acc, set| {
        operands += 1;
        acc.union_with(set);
        acc
    });
    trace!(
        operands,
        containers = result.num_containers(),
        "union_many complete"
    );
    result
}

/// Intersect all the given sets into a new set. The first set is copied, then
/// intersected in place against each following set in turn. The inputs are not
/// modified.
///
/// At least two sets are required, fewer is reported as
/// [`Error::InvalidArgument`].
///
/// # Examples
/// ```
/// use roarset::{intersect_many, RoaringSet};
///
/// let a: RoaringSet = vec![1, 2, 3].into_iter().collect();
/// let b: RoaringSet = vec![2, 3, 4].into_iter().collect();
/// let c: RoaringSet = vec![3, 4, 5].into_iter().collect();
///
/// let result = intersect_many(vec![&a, &b, &c]).unwrap();
/// assert_eq!(result.iter().collect::<Vec<_>>(), vec![3]);
/// assert!(intersect_many(vec![&a]).is_err());
/// ```
pub fn intersect_many<'a, I>(sets: I) -> Result<RoaringSet, Error>
where
    I: IntoIterator<Item = &'a RoaringSet>,
{
    let mut iter = sets.into_iter();
    let (first, second) = match (iter.next(), iter.next()) {
        (Some(first), Some(second)) => (first, second),
        _ => {
            return Err(Error::InvalidArgument(
                "intersect_many requires at least two sets",
            ))
        }
    };

    let mut result = first.intersection(second);
    let mut operands = 2;
    for set in iter {
        if result.is_empty() {
            break;
        }
        result.intersect_with(set);
        operands += 1;
    }
    trace!(
        operands,
        containers = result.num_containers(),
        "intersect_many complete"
    );
    Ok(result)
}

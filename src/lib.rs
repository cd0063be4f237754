//! Roarset - a compressed set of `u32` values, built on the roaring bitmap layout.
//!
//! Values are grouped by their high 16 bits into containers, and each container
//! picks whichever of a sorted array, a 65536 bit bitmap, or a list of runs is
//! smallest for its content. This keeps sets of IDs compact whether they are
//! sparse or dense, while membership, union and intersection stay fast.
//!
//! Sets can be written to and read from the portable roaring format, so the
//! bytes are interchangeable with other roaring implementations.
//!
//! ```
//! use roarset::{intersect_many, RoaringSet};
//!
//! let mut a = RoaringSet::new();
//! a.add_range(0..100_000);
//! let b: RoaringSet = vec![5, 70_000, 200_000].into_iter().collect();
//!
//! let both = &a & &b;
//! assert_eq!(both.iter().collect::<Vec<_>>(), vec![5, 70_000]);
//!
//! let bytes = both.serialize();
//! assert_eq!(RoaringSet::deserialize(&bytes), Ok(both));
//!
//! let c: RoaringSet = vec![70_000].into_iter().collect();
//! assert_eq!(intersect_many(vec![&a, &b, &c]).unwrap().cardinality(), 1);
//! ```

pub mod algebra;
pub mod codec;
mod container;
pub mod error;
pub mod set;

pub use crate::algebra::{intersect_many, union_many};
pub use crate::codec::DecodeConfig;
pub use crate::error::Error;
pub use crate::set::{Iter, RoaringSet};

/// Bit trait representing the equivalent of a & (!b). This allows set operations
/// such as "The set A does not contain any element of set B".
pub trait AndNot<RHS = Self> {
    /// The type of set implementation to return.
    type Output;

    /// Perform an AndNot (exclude) operation between two sets. This returns
    /// a new set containing the results. The set on the right is the candidate
    /// set to exclude from the set of the left.
    fn andnot(self, rhs: RHS) -> Self::Output;
}

//! Errors returned by set operations and the portable codec.

use thiserror::Error;

/// Error type for roaring set operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("value {0} is outside the u32 domain")]
    InvalidValue(u64),
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),
    #[error("container limit exceeded: {0} > {1}")]
    LimitExceeded(usize, usize), // found, max
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

use thiserror::Error;

use crate::ChannelId;

/// Errors that can occur when allocating, releasing or querying slots.
///
/// The pool never retries or logs on its own - every failure is reported to the immediate
/// caller, who decides whether to retry, log or abort. A failed allocation leaves the pool
/// exactly as it was before the call.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A pool was configured with a capacity of zero slots.
    #[error("slot pool capacity must be non-zero")]
    InvalidCapacity,

    /// The caller provided an argument that can never be satisfied by the pool.
    #[error("invalid argument: {problem}")]
    InvalidArgument {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// There are not enough free slots left in the pool to satisfy the request.
    #[error("requested {requested} slots but only {available} are available")]
    Exhausted {
        /// The number of slots requested.
        requested: u32,

        /// The number of slots that were free at the time of the request.
        available: u32,
    },

    /// The pool only hands out contiguous ranges and no free block is large enough.
    #[error("no contiguous run of {requested} slots exists (largest free run is {largest})")]
    NoFit {
        /// The number of slots requested.
        requested: u32,

        /// The length of the largest free run at the time of the request.
        largest: u32,
    },

    /// Even stitching together free blocks (and wrapping around, if permitted) could not
    /// satisfy the request.
    #[error("could not assemble {requested} slots from the free blocks of the pool")]
    InsufficientSlots {
        /// The number of slots requested.
        requested: u32,
    },

    /// No grant with the given base exists in the grant set.
    #[error("no grant with base slot {base} exists in the grant set")]
    NotFound {
        /// The base slot the caller referenced.
        base: u32,
    },

    /// The offset does not fall inside the referenced grant.
    #[error("offset {offset} is outside the grant at base slot {base} which spans {total} slots")]
    OutOfRange {
        /// The base slot of the grant.
        base: u32,

        /// The offset the caller asked to translate.
        offset: u32,

        /// The number of slots covered by the grant.
        total: u32,
    },

    /// The pool or port was torn down while slots were still allocated.
    #[error("{allocated} slots are still allocated")]
    NotEmpty {
        /// The number of slots that were still allocated.
        allocated: u32,
    },

    /// The target of a share operation already refers to a grant set.
    #[error("the share target already refers to a grant set")]
    AlreadyInitialized,

    /// The range handed to the free space of an unseeded pool is not entirely reserved.
    #[error("slots {base}..{end} are not reserved by the pool", end = u64::from(*base) + u64::from(*length))]
    NotReserved {
        /// The first slot of the range.
        base: u32,

        /// The number of slots in the range.
        length: u32,
    },

    /// The port does not know about the referenced channel.
    #[error("channel {channel} is not open on this port")]
    UnknownChannel {
        /// The channel the caller referenced.
        channel: ChannelId,
    },
}

impl Error {
    pub(crate) fn invalid_argument(problem: impl Into<String>) -> Self {
        Self::InvalidArgument {
            problem: problem.into(),
        }
    }
}

/// A specialized `Result` type for slot pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn messages_include_values() {
        let error = Error::Exhausted {
            requested: 8,
            available: 3,
        };
        assert_eq!(
            error.to_string(),
            "requested 8 slots but only 3 are available"
        );

        let error = Error::NotReserved { base: 4, length: 4 };
        assert_eq!(error.to_string(), "slots 4..8 are not reserved by the pool");
    }

    #[test]
    fn near_max_reserved_range_does_not_overflow_message() {
        let error = Error::NotReserved {
            base: u32::MAX,
            length: 2,
        };

        assert!(error.to_string().contains("4294967295.."));
    }

    #[test]
    fn invalid_argument_carries_problem() {
        let error = Error::invalid_argument("zero slots");

        assert_eq!(error.to_string(), "invalid argument: zero slots");
    }
}

use std::ops::Range;

use smallvec::SmallVec;

use crate::BlockId;

/// The record of one successful allocation.
///
/// Most grants are a single block; stitched and wrapped grants rarely need more than two.
#[derive(Debug)]
pub(crate) struct Grant {
    /// Blocks in the order they were claimed. The first one determines the grant base.
    elements: SmallVec<[BlockId; 2]>,
    base: u32,
    total: u32,
}

impl Grant {
    /// # Panics
    ///
    /// Panics if `elements` is empty or `total` is zero.
    #[must_use]
    pub(crate) fn new(elements: SmallVec<[BlockId; 2]>, base: u32, total: u32) -> Self {
        assert!(!elements.is_empty(), "a grant always consumes at least one block");
        assert!(total > 0, "a grant always covers at least one slot");

        Self {
            elements,
            base,
            total,
        }
    }

    #[must_use]
    pub(crate) fn elements(&self) -> &[BlockId] {
        &self.elements
    }

    #[must_use]
    pub(crate) fn base(&self) -> u32 {
        self.base
    }

    #[must_use]
    pub(crate) fn total(&self) -> u32 {
        self.total
    }

    /// `floor(log2(total))`. Callers request power-of-two sizes, in which case this is exact.
    #[must_use]
    pub(crate) fn bit_width(&self) -> u32 {
        self.total.ilog2()
    }
}

/// A snapshot of a grant, as reported by [`SlotPool::grant()`][crate::SlotPool::grant].
///
/// # Example
///
/// ```rust
/// use slot_pool::SlotPool;
///
/// let mut pool = SlotPool::builder().capacity(8).build().unwrap();
/// let set = pool.grant_set();
///
/// let allocation = pool.alloc(&set, 4).unwrap();
/// let grant = pool.grant(&set, allocation.base()).unwrap();
///
/// assert_eq!(grant.total(), 4);
/// assert_eq!(grant.elements(), &[0..4]);
/// # pool.release_grant_set(set);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GrantInfo {
    base: u32,
    total: u32,
    bit_width: u32,
    elements: Vec<Range<u32>>,
}

impl GrantInfo {
    pub(crate) fn new(grant: &Grant, elements: Vec<Range<u32>>) -> Self {
        Self {
            base: grant.base(),
            total: grant.total(),
            bit_width: grant.bit_width(),
            elements,
        }
    }

    /// The base slot returned when the grant was allocated.
    ///
    /// This is the first slot of the first element, which is not necessarily the numerically
    /// smallest slot covered by the grant.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The number of slots covered by the grant.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// `floor(log2(total))`.
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// The slot ranges that make up the grant, in the order they were claimed.
    #[must_use]
    pub fn elements(&self) -> &[Range<u32>] {
        &self.elements
    }

    /// The number of separate slot ranges that make up the grant.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

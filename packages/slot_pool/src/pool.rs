use std::ops::Range;

use smallvec::{SmallVec, smallvec};

use crate::{
    Allocation, BlockId, BlockMap, BlockState, Error, Grant, GrantInfo, GrantSet, GrantSetState,
    GrantSetTable, PoolId, SlotPoolBuilder,
};

/// A best-fit allocator for ranges of slots in a fixed-size hardware table.
///
/// The pool owns a linear slot space `[0, capacity)` that is always completely partitioned into
/// blocks, each of which is free, claimed by a grant or reserved by the pool itself. Allocation
/// prefers the smallest free block that satisfies a request. If no single block is large enough,
/// the pool either fails (for [contiguous-only][SlotPoolBuilder::contiguous_only] pools) or
/// assembles the request from several free blocks, optionally combining the block at the end of
/// the slot space with the one at its start. Released blocks are coalesced with their free
/// neighbors.
///
/// Every allocation belongs to a [`GrantSet`] obtained from the same pool. Grant sets can be
/// shared between several owners and release all of their grants at once.
///
/// # Example
///
/// ```rust
/// use slot_pool::SlotPool;
///
/// let mut pool = SlotPool::builder().capacity(8).build().unwrap();
/// let set = pool.grant_set();
///
/// let a = pool.alloc(&set, 5).unwrap();
/// let b = pool.alloc(&set, 3).unwrap();
/// assert_eq!(a.base(), 0);
/// assert_eq!(b.base(), 5);
///
/// pool.free(&set, a.base()).unwrap();
///
/// // The freed range is reused for the next request that fits.
/// let c = pool.alloc(&set, 2).unwrap();
/// assert_eq!(c.base(), 0);
/// assert_eq!(pool.max_free(1), 3);
///
/// pool.release_grant_set(set);
/// pool.fini().unwrap();
/// ```
///
/// # Thread safety
///
/// The pool performs no internal synchronization. It is [`Send`] and [`Sync`], with every
/// operation that touches the blocks (including queries) requiring the caller to serialize
/// access, typically by holding the pool behind the same lock as the port that owns it.
#[derive(Debug)]
pub struct SlotPool {
    id: PoolId,
    blocks: BlockMap,
    contiguous_only: bool,
    wrap_allowed: bool,

    /// Slots claimed on behalf of grants.
    allocated: u32,

    /// Slots of an unseeded pool that have not been released into the free space yet.
    reserved: u32,

    grant_sets: GrantSetTable,
}

impl SlotPool {
    /// Starts building a new [`SlotPool`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::SlotPool;
    ///
    /// let pool = SlotPool::builder().capacity(32).build().unwrap();
    ///
    /// assert_eq!(pool.capacity(), 32);
    /// assert!(pool.is_empty());
    /// ```
    pub fn builder() -> SlotPoolBuilder {
        SlotPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        capacity: u32,
        contiguous_only: bool,
        wrap_allowed: bool,
        seeded: bool,
    ) -> crate::Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        let (initial, reserved) = if seeded {
            (BlockState::Free, 0)
        } else {
            (BlockState::Reserved, capacity)
        };

        Ok(Self {
            id: PoolId::next(),
            blocks: BlockMap::new(capacity, initial),
            contiguous_only,
            wrap_allowed,
            allocated: 0,
            reserved,
            grant_sets: GrantSetTable::default(),
        })
    }

    /// Tears down the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEmpty`] if any slots are still allocated. The pool is dropped
    /// regardless, so the error only serves to report the leak to the caller.
    pub fn fini(self) -> crate::Result<()> {
        if self.allocated > 0 {
            return Err(Error::NotEmpty {
                allocated: self.allocated,
            });
        }

        Ok(())
    }

    /// The number of slots in the slot space.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.blocks.capacity()
    }

    /// Whether every grant must be a single contiguous range.
    #[must_use]
    pub fn is_contiguous_only(&self) -> bool {
        self.contiguous_only
    }

    /// Whether grants may wrap around from the end of the slot space to its start.
    #[must_use]
    pub fn is_wrap_allowed(&self) -> bool {
        self.wrap_allowed
    }

    /// The number of slots claimed on behalf of grants.
    #[must_use]
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// The number of slots of an unseeded pool that are not yet available for allocation.
    #[must_use]
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// The number of slots that are free for allocation.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.capacity()
            .checked_sub(self.allocated)
            .and_then(|remaining| remaining.checked_sub(self.reserved))
            .expect("allocated and reserved slots never exceed the capacity")
    }

    /// Whether no slots are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// The free ranges of the slot space, in ascending order.
    ///
    /// Adjacent free slots are always reported as a single range.
    #[must_use]
    pub fn free_ranges(&self) -> Vec<Range<u32>> {
        self.blocks.free_ranges()
    }

    /// The length of the largest free run of at least `min` slots, or zero if there is none.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::SlotPool;
    ///
    /// let mut pool = SlotPool::builder().capacity(16).build().unwrap();
    /// let set = pool.grant_set();
    ///
    /// pool.alloc(&set, 4).unwrap();
    ///
    /// assert_eq!(pool.max_free(1), 12);
    /// assert_eq!(pool.max_free(13), 0);
    /// # pool.release_grant_set(set);
    /// ```
    #[must_use]
    pub fn max_free(&self, min: u32) -> u32 {
        self.blocks
            .find_max_fit(min)
            .map_or(0, |id| self.blocks.get(id).length())
    }

    /// Moves `base..base + length` of an unseeded pool into the free space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `length` is zero and [`Error::NotReserved`] if
    /// the range is not entirely reserved (e.g. because it was already released).
    pub fn release_unseeded(&mut self, base: u32, length: u32) -> crate::Result<()> {
        if length == 0 {
            return Err(Error::invalid_argument("cannot release an empty range"));
        }

        self.blocks
            .release_reserved(base, length)
            .ok_or(Error::NotReserved { base, length })?;

        self.reserved = self
            .reserved
            .checked_sub(length)
            .expect("the released range was reserved, so it was counted");

        Ok(())
    }

    /// Creates a new, empty grant set served by this pool.
    ///
    /// The returned handle must eventually be passed to [`release_grant_set()`][1].
    ///
    /// [1]: Self::release_grant_set
    pub fn grant_set(&mut self) -> GrantSet {
        let index = self.grant_sets.insert(GrantSetState::new());
        GrantSet::new(self.id, index)
    }

    /// Gives `target` its own handle to the grant set behind `source`.
    ///
    /// Both handles refer to the same grants: allocations made through either are visible
    /// through both, and the grants are only released once every handle has been released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if `target` already holds a handle.
    ///
    /// # Panics
    ///
    /// Panics if `source` was not issued by this pool.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::SlotPool;
    ///
    /// let mut pool = SlotPool::builder().capacity(16).build().unwrap();
    /// let owner = pool.grant_set();
    /// pool.alloc(&owner, 4).unwrap();
    ///
    /// let mut borrower = None;
    /// pool.share(&mut borrower, &owner).unwrap();
    /// let borrower = borrower.unwrap();
    ///
    /// // The borrower releasing its handle leaves the grants in place.
    /// pool.release_grant_set(borrower);
    /// assert_eq!(pool.allocated(), 4);
    ///
    /// pool.release_grant_set(owner);
    /// assert_eq!(pool.allocated(), 0);
    /// ```
    pub fn share(&mut self, target: &mut Option<GrantSet>, source: &GrantSet) -> crate::Result<()> {
        self.assert_owns(source);

        if target.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        self.grant_sets.get_mut(source.index()).add_instance();
        *target = Some(GrantSet::new(self.id, source.index()));

        Ok(())
    }

    /// Releases a handle to a grant set.
    ///
    /// If this is the last handle to the set, every grant it holds is returned to the pool and
    /// the set ceases to exist. Otherwise, only the handle is released.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    #[expect(
        clippy::needless_pass_by_value,
        reason = "consuming the handle is what ends its validity"
    )]
    pub fn release_grant_set(&mut self, set: GrantSet) {
        self.assert_owns(&set);

        let state = self.grant_sets.get_mut(set.index());
        if !state.remove_instance() {
            return;
        }

        let state = self.grant_sets.remove(set.index());
        for grant in state.grants() {
            self.release_grant(grant);
        }
    }

    /// Allocates `count` slots on behalf of `set`.
    ///
    /// The request is satisfied from the smallest free block that is large enough. If there is
    /// no such block and the pool is not contiguous-only, the request is assembled from the
    /// free block at the end and the free block at the start of the slot space (if wraparound is
    /// allowed and they suffice) or else from the smallest free blocks in turn.
    ///
    /// On failure, the pool is left unchanged.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `count` is zero or exceeds the capacity.
    /// * [`Error::Exhausted`] if fewer than `count` slots are free.
    /// * [`Error::NoFit`] if the pool is contiguous-only and no free block has `count` slots.
    /// * [`Error::InsufficientSlots`] if the free blocks could not be assembled into a grant.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    pub fn alloc(&mut self, set: &GrantSet, count: u32) -> crate::Result<Allocation> {
        self.assert_owns(set);

        if count == 0 {
            return Err(Error::invalid_argument("cannot allocate zero slots"));
        }

        let capacity = self.capacity();
        if count > capacity {
            return Err(Error::invalid_argument(format!(
                "requested {count} slots from a pool with capacity {capacity}"
            )));
        }

        let available = self.available();
        if count > available {
            return Err(Error::Exhausted {
                requested: count,
                available,
            });
        }

        let elements = self.claim(count)?;
        let first = *elements
            .first()
            .expect("a successful claim consumes at least one block");
        let base = self.blocks.get(first).base();

        let grant = Grant::new(elements, base, count);
        let allocation = Allocation::new(base, grant.bit_width());

        self.allocated = self
            .allocated
            .checked_add(count)
            .expect("guarded by the availability check above");
        self.grant_sets.get_mut(set.index()).push(grant);

        Ok(allocation)
    }

    fn claim(&mut self, count: u32) -> crate::Result<SmallVec<[BlockId; 2]>> {
        if let Some(id) = self.blocks.find_min_fit(count) {
            return Ok(smallvec![self.blocks.split_or_claim(id, count)]);
        }

        if self.contiguous_only {
            return Err(Error::NoFit {
                requested: count,
                largest: self.max_free(1),
            });
        }

        if self.wrap_allowed {
            if let Some(elements) = self.claim_wrapped(count) {
                return Ok(elements);
            }
        }

        let mut elements = SmallVec::new();
        let mut remaining = count;

        while remaining > 0 {
            let Some(id) = self.blocks.find_min_fit(1) else {
                break;
            };

            let claimed = self.blocks.split_or_claim(id, remaining);
            remaining = remaining
                .checked_sub(self.blocks.get(claimed).length())
                .expect("split_or_claim never claims more than requested");
            elements.push(claimed);
        }

        if remaining > 0 {
            for &id in elements.iter().rev() {
                self.blocks.release(id);
            }

            return Err(Error::InsufficientSlots { requested: count });
        }

        Ok(elements)
    }

    /// Claims the free block at the end of the slot space followed by the free block at the
    /// start, if together they cover `count` slots.
    fn claim_wrapped(&mut self, count: u32) -> Option<SmallVec<[BlockId; 2]>> {
        let first = self.blocks.first_block()?;
        let last = self.blocks.last_block()?;

        if first == last {
            return None;
        }

        let (head, tail) = (self.blocks.get(first), self.blocks.get(last));
        if !head.is_free() || !tail.is_free() {
            return None;
        }

        let combined = head
            .length()
            .checked_add(tail.length())
            .expect("disjoint blocks together never exceed the capacity");
        if combined < count {
            return None;
        }

        // No single block fits, so the tail is always consumed whole.
        let tail_length = tail.length();
        let tail = self.blocks.split_or_claim(last, count);
        let head = self.blocks.split_or_claim(
            first,
            count
                .checked_sub(tail_length)
                .expect("the tail is shorter than the request"),
        );

        Some(smallvec![tail, head])
    }

    /// Releases the grant that starts at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `set` holds no grant with that base.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    pub fn free(&mut self, set: &GrantSet, base: u32) -> crate::Result<()> {
        self.assert_owns(set);

        let grant = self
            .grant_sets
            .get_mut(set.index())
            .take(base)
            .ok_or(Error::NotFound { base })?;

        self.release_grant(&grant);
        Ok(())
    }

    fn release_grant(&mut self, grant: &Grant) {
        for &id in grant.elements() {
            self.blocks.release(id);
        }

        self.allocated = self
            .allocated
            .checked_sub(grant.total())
            .expect("the pool total always includes every live grant");
    }

    /// Translates an offset within the grant that starts at `base` into a slot number.
    ///
    /// Offsets are counted across the elements of the grant in the order they were claimed, so
    /// for a grant that wraps around, offsets past the end of the slot space continue at its
    /// start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `set` holds no grant with that base and
    /// [`Error::OutOfRange`] if `offset` is not less than the size of the grant.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    pub fn slot_index(&self, set: &GrantSet, base: u32, offset: u32) -> crate::Result<u32> {
        self.assert_owns(set);

        let grant = self
            .grant_sets
            .get(set.index())
            .find(base)
            .ok_or(Error::NotFound { base })?;

        let mut remaining = offset;

        for &id in grant.elements() {
            let block = self.blocks.get(id);

            if let Some(rest) = remaining.checked_sub(block.length()) {
                remaining = rest;
            } else {
                return Ok(block
                    .base()
                    .checked_add(remaining)
                    .expect("the offset falls inside the block"));
            }
        }

        Err(Error::OutOfRange {
            base,
            offset,
            total: grant.total(),
        })
    }

    /// Describes the grant that starts at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `set` holds no grant with that base.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    pub fn grant(&self, set: &GrantSet, base: u32) -> crate::Result<GrantInfo> {
        self.assert_owns(set);

        let grant = self
            .grant_sets
            .get(set.index())
            .find(base)
            .ok_or(Error::NotFound { base })?;

        let elements = grant
            .elements()
            .iter()
            .map(|&id| self.blocks.get(id).range())
            .collect();

        Ok(GrantInfo::new(grant, elements))
    }

    /// The number of slot ranges across all grants of a grant set.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    #[must_use]
    pub fn element_count(&self, set: &GrantSet) -> usize {
        self.assert_owns(set);

        self.grant_sets
            .get(set.index())
            .grants()
            .iter()
            .map(|grant| grant.elements().len())
            .sum()
    }

    /// The number of grants held by a grant set.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    #[must_use]
    pub fn grant_count(&self, set: &GrantSet) -> usize {
        self.assert_owns(set);

        self.grant_sets.get(set.index()).grants().len()
    }

    /// The number of slots held by a grant set.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    #[must_use]
    pub fn grant_set_allocated(&self, set: &GrantSet) -> u32 {
        self.assert_owns(set);

        self.grant_sets.get(set.index()).allocated()
    }

    /// The number of live handles to a grant set.
    ///
    /// # Panics
    ///
    /// Panics if `set` was not issued by this pool.
    #[must_use]
    pub fn instance_count(&self, set: &GrantSet) -> u32 {
        self.assert_owns(set);

        self.grant_sets.get(set.index()).instance_count()
    }

    fn assert_owns(&self, set: &GrantSet) {
        assert!(
            set.pool_id() == self.id,
            "provided handle does not belong to this pool"
        );
    }

    /// Verifies the partition and accounting invariants.
    #[cfg(test)]
    pub(crate) fn assert_integrity(&self) {
        self.blocks.assert_integrity();

        let free = self.blocks.free_total();
        assert_eq!(
            u64::from(free) + u64::from(self.allocated) + u64::from(self.reserved),
            u64::from(self.capacity())
        );

        let in_sets: u32 = self.grant_sets.iter().map(GrantSetState::allocated).sum();
        assert_eq!(in_sets, self.allocated);

        let in_grants: u32 = self
            .grant_sets
            .iter()
            .flat_map(GrantSetState::grants)
            .map(Grant::total)
            .sum();
        assert_eq!(in_grants, self.allocated);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SlotPool: Send, Sync, std::fmt::Debug);

    fn pool(capacity: u32, contiguous_only: bool, wrap_allowed: bool) -> SlotPool {
        SlotPool::builder()
            .capacity(capacity)
            .contiguous_only(contiguous_only)
            .wrap_allowed(wrap_allowed)
            .build()
            .unwrap()
    }

    /// Leaves `[0, 3)` and `[11, 16)` free with everything in between held by `set`.
    fn fragmented(pool: &mut SlotPool, set: &GrantSet) {
        let front = pool.alloc(set, 3).unwrap();
        let middle = pool.alloc(set, 8).unwrap();
        assert_eq!(front.base(), 0);
        assert_eq!(middle.base(), 3);

        pool.free(set, front.base()).unwrap();
        assert_eq!(pool.free_ranges(), vec![0..3, 11..16]);
    }

    #[test]
    fn worked_example() {
        let mut pool = pool(8, false, false);
        let set = pool.grant_set();

        let a = pool.alloc(&set, 5).unwrap();
        let b = pool.alloc(&set, 3).unwrap();
        assert_eq!(a.base(), 0);
        assert_eq!(b.base(), 5);

        pool.free(&set, a.base()).unwrap();
        assert_eq!(pool.free_ranges(), vec![0..5]);

        let c = pool.alloc(&set, 2).unwrap();
        assert_eq!(c.base(), 0);
        assert_eq!(c.bit_width(), 1);
        assert_eq!(pool.max_free(1), 3);

        pool.assert_integrity();
        pool.release_grant_set(set);
        pool.assert_integrity();
        pool.fini().unwrap();
    }

    #[test]
    fn whole_capacity_once() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();

        let all = pool.alloc(&set, 16).unwrap();
        assert_eq!(all.base(), 0);
        assert_eq!(all.bit_width(), 4);

        assert_eq!(
            pool.alloc(&set, 1).unwrap_err(),
            Error::Exhausted {
                requested: 1,
                available: 0
            }
        );

        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn invalid_counts_are_rejected() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();

        assert!(matches!(
            pool.alloc(&set, 0),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            pool.alloc(&set, 17),
            Err(Error::InvalidArgument { .. })
        ));

        assert!(pool.is_empty());
        pool.release_grant_set(set);
    }

    #[test]
    fn exhausted_counts_other_sets() {
        let mut pool = pool(16, false, false);
        let a = pool.grant_set();
        let b = pool.grant_set();

        pool.alloc(&a, 12).unwrap();

        assert_eq!(
            pool.alloc(&b, 8).unwrap_err(),
            Error::Exhausted {
                requested: 8,
                available: 4
            }
        );

        pool.release_grant_set(a);
        pool.release_grant_set(b);
    }

    #[test]
    fn round_trip_restores_space() {
        let mut pool = pool(32, false, false);
        let set = pool.grant_set();

        let allocation = pool.alloc(&set, 8).unwrap();
        pool.free(&set, allocation.base()).unwrap();

        assert!(pool.max_free(8) >= 8);
        assert_eq!(pool.free_ranges(), vec![0..32]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn double_free_is_not_found() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();

        let allocation = pool.alloc(&set, 4).unwrap();
        pool.free(&set, allocation.base()).unwrap();

        assert_eq!(
            pool.free(&set, allocation.base()).unwrap_err(),
            Error::NotFound { base: 0 }
        );
        pool.release_grant_set(set);
    }

    #[test]
    fn free_only_searches_own_set() {
        let mut pool = pool(16, false, false);
        let a = pool.grant_set();
        let b = pool.grant_set();

        let allocation = pool.alloc(&a, 4).unwrap();

        assert_eq!(
            pool.free(&b, allocation.base()).unwrap_err(),
            Error::NotFound { base: 0 }
        );
        assert_eq!(pool.allocated(), 4);

        pool.release_grant_set(a);
        pool.release_grant_set(b);
    }

    #[test]
    fn best_fit_picks_smallest_block() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();

        // Free: [0,4) and [6,16).
        let a = pool.alloc(&set, 4).unwrap();
        pool.alloc(&set, 2).unwrap();
        pool.free(&set, a.base()).unwrap();

        let fitted = pool.alloc(&set, 3).unwrap();
        assert_eq!(fitted.base(), 0);
        assert_eq!(pool.free_ranges(), vec![3..4, 6..16]);

        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn contiguous_only_reports_no_fit() {
        let mut pool = pool(16, true, false);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        // 8 slots are free in total but the largest run is 5.
        assert_eq!(
            pool.alloc(&set, 6).unwrap_err(),
            Error::NoFit {
                requested: 6,
                largest: 5
            }
        );

        assert_eq!(pool.free_ranges(), vec![0..3, 11..16]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn wraparound_combines_last_then_first() {
        let mut pool = pool(16, false, true);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        let allocation = pool.alloc(&set, 8).unwrap();
        assert_eq!(allocation.base(), 11);
        assert_eq!(allocation.bit_width(), 3);

        let grant = pool.grant(&set, allocation.base()).unwrap();
        assert_eq!(grant.element_count(), 2);
        assert_eq!(grant.elements(), &[11..16, 0..3]);

        assert_eq!(pool.slot_index(&set, 11, 4).unwrap(), 15);
        assert_eq!(pool.slot_index(&set, 11, 5).unwrap(), 0);
        assert_eq!(pool.slot_index(&set, 11, 7).unwrap(), 2);
        assert_eq!(
            pool.slot_index(&set, 11, 8).unwrap_err(),
            Error::OutOfRange {
                base: 11,
                offset: 8,
                total: 8
            }
        );

        assert!(pool.free_ranges().is_empty());
        pool.assert_integrity();

        pool.free(&set, allocation.base()).unwrap();
        assert_eq!(pool.free_ranges(), vec![0..3, 11..16]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn wraparound_splits_first_block() {
        let mut pool = pool(16, false, true);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        let allocation = pool.alloc(&set, 7).unwrap();
        let grant = pool.grant(&set, allocation.base()).unwrap();

        assert_eq!(grant.elements(), &[11..16, 0..2]);
        assert_eq!(pool.free_ranges(), vec![2..3]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn stitching_takes_smallest_blocks_first() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        let allocation = pool.alloc(&set, 7).unwrap();
        let grant = pool.grant(&set, allocation.base()).unwrap();

        assert_eq!(allocation.base(), 0);
        assert_eq!(grant.elements(), &[0..3, 11..15]);
        assert_eq!(pool.free_ranges(), vec![15..16]);
        assert_eq!(pool.slot_index(&set, 0, 3).unwrap(), 11);
        pool.assert_integrity();

        pool.free(&set, 0).unwrap();
        assert_eq!(pool.free_ranges(), vec![0..3, 11..16]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn wraparound_needs_both_ends_free() {
        let mut pool = pool(16, false, true);
        let set = pool.grant_set();

        let bases = [4, 2, 4, 4, 2].map(|count| pool.alloc(&set, count).unwrap().base());
        assert_eq!(bases, [0, 4, 6, 10, 14]);

        // Free: [4,6) and [10,14), both ends of the slot space stay claimed.
        pool.free(&set, bases[1]).unwrap();
        pool.free(&set, bases[3]).unwrap();

        let allocation = pool.alloc(&set, 5).unwrap();
        let grant = pool.grant(&set, allocation.base()).unwrap();

        assert_eq!(grant.elements(), &[4..6, 10..13]);
        assert_eq!(pool.free_ranges(), vec![13..14]);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn claim_rolls_back_on_shortfall() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        // Only 8 slots are free, so stitching runs dry after claiming both blocks.
        assert_eq!(
            pool.claim(9).unwrap_err(),
            Error::InsufficientSlots { requested: 9 }
        );

        assert_eq!(pool.free_ranges(), vec![0..3, 11..16]);
        assert_eq!(pool.allocated(), 8);
        assert_eq!(pool.max_free(1), 5);
        pool.assert_integrity();
        pool.release_grant_set(set);
    }

    #[test]
    fn slot_index_unknown_base() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();

        pool.alloc(&set, 4).unwrap();

        assert_eq!(
            pool.slot_index(&set, 1, 0).unwrap_err(),
            Error::NotFound { base: 1 }
        );
        assert_eq!(pool.slot_index(&set, 0, 3).unwrap(), 3);
        pool.release_grant_set(set);
    }

    #[test]
    fn sharing_defers_release_to_last_handle() {
        let mut pool = pool(16, false, false);
        let source = pool.grant_set();
        pool.alloc(&source, 4).unwrap();

        let mut target1 = None;
        let mut target2 = None;
        pool.share(&mut target1, &source).unwrap();
        pool.share(&mut target2, &source).unwrap();
        assert_eq!(pool.instance_count(&source), 3);

        // Allocations through any handle land in the same set.
        let target1 = target1.unwrap();
        pool.alloc(&target1, 2).unwrap();
        assert_eq!(pool.grant_count(&source), 2);
        assert_eq!(pool.grant_set_allocated(&source), 6);

        pool.release_grant_set(target1);
        assert_eq!(pool.allocated(), 6);
        assert_eq!(pool.instance_count(&source), 2);

        pool.release_grant_set(target2.unwrap());
        assert_eq!(pool.allocated(), 6);
        assert_eq!(pool.instance_count(&source), 1);

        pool.release_grant_set(source);
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.free_ranges(), vec![0..16]);
        pool.assert_integrity();
    }

    #[test]
    fn share_into_populated_target_fails() {
        let mut pool = pool(16, false, false);
        let a = pool.grant_set();
        let b = pool.grant_set();

        let mut target = Some(b);
        assert_eq!(
            pool.share(&mut target, &a).unwrap_err(),
            Error::AlreadyInitialized
        );
        assert_eq!(pool.instance_count(&a), 1);

        pool.release_grant_set(target.unwrap());
        pool.release_grant_set(a);
    }

    #[test]
    fn element_count_spans_grants() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();
        fragmented(&mut pool, &set);

        // The 8-slot middle grant is one element, the stitched grant two.
        pool.alloc(&set, 7).unwrap();

        assert_eq!(pool.grant_count(&set), 2);
        assert_eq!(pool.element_count(&set), 3);
        pool.release_grant_set(set);
    }

    #[test]
    fn fini_with_outstanding_grants_fails() {
        let mut pool = pool(16, false, false);
        let set = pool.grant_set();
        pool.alloc(&set, 4).unwrap();

        assert_eq!(pool.fini().unwrap_err(), Error::NotEmpty { allocated: 4 });
    }

    #[test]
    #[should_panic]
    fn foreign_handle_panics() {
        let mut a = pool(16, false, false);
        let mut b = pool(16, false, false);

        let set = a.grant_set();
        _ = b.alloc(&set, 1);
    }

    #[test]
    fn unseeded_pool_starts_reserved() {
        let mut pool = SlotPool::builder()
            .capacity(16)
            .seeded(false)
            .build()
            .unwrap();
        let set = pool.grant_set();

        assert_eq!(pool.reserved(), 16);
        assert_eq!(
            pool.alloc(&set, 1).unwrap_err(),
            Error::Exhausted {
                requested: 1,
                available: 0
            }
        );

        pool.release_unseeded(4, 8).unwrap();
        assert_eq!(pool.available(), 8);
        assert_eq!(
            pool.release_unseeded(6, 2).unwrap_err(),
            Error::NotReserved { base: 6, length: 2 }
        );
        assert!(matches!(
            pool.release_unseeded(0, 0),
            Err(Error::InvalidArgument { .. })
        ));

        let allocation = pool.alloc(&set, 8).unwrap();
        assert_eq!(allocation.base(), 4);
        pool.assert_integrity();

        pool.release_grant_set(set);
        pool.assert_integrity();
        pool.fini().unwrap();
    }
}

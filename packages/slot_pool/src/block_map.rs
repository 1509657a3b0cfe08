use std::ops::Range;

use foldhash::{HashMap, HashMapExt};

use crate::{Block, BlockId, BlockState};

/// The complete partition of `[0, capacity)` into blocks.
///
/// Blocks live in an arena and are addressed by [`BlockId`]. The arena order carries no meaning;
/// address adjacency is always derived arithmetically via the `base` and `end` lookups, which
/// hold exactly one entry per live block.
///
/// Free blocks are coalesced eagerly, so no two free blocks are ever adjacent.
#[derive(Debug)]
pub(crate) struct BlockMap {
    capacity: u32,

    /// `None` marks a vacant entry whose index is listed in `vacant` for reuse.
    blocks: Vec<Option<Block>>,
    vacant: Vec<usize>,

    by_base: HashMap<u32, BlockId>,
    by_end: HashMap<u32, BlockId>,
}

impl BlockMap {
    /// Creates a map with a single block in the `initial` state covering the whole capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub(crate) fn new(capacity: u32, initial: BlockState) -> Self {
        assert!(capacity > 0, "BlockMap must have non-zero capacity");

        let mut map = Self {
            capacity,
            blocks: Vec::new(),
            vacant: Vec::new(),
            by_base: HashMap::new(),
            by_end: HashMap::new(),
        };

        map.insert(Block::new(initial, 0, capacity));
        map
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    /// # Panics
    ///
    /// Panics if the block has been absorbed by a neighbor.
    #[must_use]
    pub(crate) fn get(&self, id: BlockId) -> &Block {
        self.blocks
            .get(id.index())
            .and_then(Option::as_ref)
            .expect("block id must refer to a live block")
    }

    fn get_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .expect("block id must refer to a live block")
    }

    fn insert(&mut self, block: Block) -> BlockId {
        let (base, end) = (block.base(), block.end());

        let id = if let Some(index) = self.vacant.pop() {
            let entry = self
                .blocks
                .get_mut(index)
                .expect("vacant indexes always refer to existing arena entries");
            debug_assert!(entry.is_none());
            *entry = Some(block);
            BlockId::new(index)
        } else {
            self.blocks.push(Some(block));
            BlockId::new(
                self.blocks
                    .len()
                    .checked_sub(1)
                    .expect("we just pushed an entry"),
            )
        };

        self.by_base.insert(base, id);
        self.by_end.insert(end, id);

        id
    }

    fn remove(&mut self, id: BlockId) -> Block {
        let block = self
            .blocks
            .get_mut(id.index())
            .and_then(Option::take)
            .expect("block id must refer to a live block");

        self.by_base.remove(&block.base());
        self.by_end.remove(&block.end());
        self.vacant.push(id.index());

        block
    }

    /// Live blocks in arena order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(index, block)| block.as_ref().map(|block| (BlockId::new(index), block)))
    }

    fn free_blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.iter().filter(|(_, block)| block.is_free())
    }

    /// The smallest free block with at least `min` slots.
    ///
    /// Among equally sized candidates, any one may be returned.
    #[must_use]
    pub(crate) fn find_min_fit(&self, min: u32) -> Option<BlockId> {
        self.free_blocks()
            .filter(|(_, block)| block.length() >= min)
            .min_by_key(|(_, block)| block.length())
            .map(|(id, _)| id)
    }

    /// The largest free block with at least `min` slots.
    #[must_use]
    pub(crate) fn find_max_fit(&self, min: u32) -> Option<BlockId> {
        self.free_blocks()
            .filter(|(_, block)| block.length() >= min)
            .max_by_key(|(_, block)| block.length())
            .map(|(id, _)| id)
    }

    /// The block that starts at slot zero.
    #[must_use]
    pub(crate) fn first_block(&self) -> Option<BlockId> {
        self.by_base.get(&0).copied()
    }

    /// The block that ends at the capacity.
    #[must_use]
    pub(crate) fn last_block(&self) -> Option<BlockId> {
        self.by_end.get(&self.capacity).copied()
    }

    /// Splits the first `count` slots of a block off into a new block in the same state.
    ///
    /// The original block keeps its identity and shrinks to the remaining slots.
    fn split_front(&mut self, id: BlockId, count: u32) -> BlockId {
        let block = self.get(id);
        let front = Block::new(block.state(), block.base(), count);
        let old_base = block.base();

        let block = self.get_mut(id);
        block.shrink_front(count);
        let new_base = block.base();

        self.by_base.remove(&old_base);
        self.by_base.insert(new_base, id);

        self.insert(front)
    }

    /// Claims `need` slots from the start of a free block.
    ///
    /// If the block is longer than `need`, a new claimed block is carved from its start and the
    /// free block shrinks in place. Otherwise, the whole block is claimed.
    pub(crate) fn split_or_claim(&mut self, id: BlockId, need: u32) -> BlockId {
        debug_assert!(self.get(id).is_free(), "only free blocks can be claimed");

        let claimed = if self.get(id).length() > need {
            self.split_front(id, need)
        } else {
            id
        };

        self.get_mut(claimed).set_state(BlockState::Claimed);
        claimed
    }

    /// Returns a block to the free space, coalescing it with free neighbors.
    ///
    /// Returns the identity of the resulting free block.
    pub(crate) fn release(&mut self, id: BlockId) -> BlockId {
        self.get_mut(id).set_state(BlockState::Free);
        self.merge_free_neighbors(id)
    }

    fn free_neighbor_before(&self, id: BlockId) -> Option<BlockId> {
        let base = self.get(id).base();

        self.by_end
            .get(&base)
            .copied()
            .filter(|&neighbor| self.get(neighbor).is_free())
    }

    fn free_neighbor_after(&self, id: BlockId) -> Option<BlockId> {
        let end = self.get(id).end();

        self.by_base
            .get(&end)
            .copied()
            .filter(|&neighbor| self.get(neighbor).is_free())
    }

    /// Absorbs the free blocks that are address-adjacent to a free block.
    ///
    /// The absorbed blocks cease to exist; the given block keeps its identity.
    pub(crate) fn merge_free_neighbors(&mut self, id: BlockId) -> BlockId {
        debug_assert!(self.get(id).is_free(), "only free blocks are merged");

        while let Some(predecessor) = self.free_neighbor_before(id) {
            let absorbed = self.remove(predecessor);

            let block = self.get_mut(id);
            let old_base = block.base();
            block.absorb_predecessor(&absorbed);
            let new_base = block.base();

            self.by_base.remove(&old_base);
            self.by_base.insert(new_base, id);
        }

        while let Some(successor) = self.free_neighbor_after(id) {
            let absorbed = self.remove(successor);

            let block = self.get_mut(id);
            let old_end = block.end();
            block.absorb_successor(&absorbed);
            let new_end = block.end();

            self.by_end.remove(&old_end);
            self.by_end.insert(new_end, id);
        }

        id
    }

    /// Moves `base..base + length` from a reserved block into the free space.
    ///
    /// Returns `None` if the range is not entirely inside a single reserved block.
    pub(crate) fn release_reserved(&mut self, base: u32, length: u32) -> Option<BlockId> {
        let end = base.checked_add(length)?;

        let (id, block) = self.iter().find(|(_, block)| {
            block.state() == BlockState::Reserved && block.base() <= base && end <= block.end()
        })?;

        let prefix = base
            .checked_sub(block.base())
            .expect("the containing block starts at or before base");

        if prefix > 0 {
            // The prefix stays reserved as a block of its own.
            _ = self.split_front(id, prefix);
        }

        let middle = if self.get(id).length() > length {
            self.split_front(id, length)
        } else {
            id
        };

        Some(self.release(middle))
    }

    /// Total number of free slots.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn free_total(&self) -> u32 {
        self.free_blocks()
            .map(|(_, block)| block.length())
            .fold(0, |total, length| {
                total
                    .checked_add(length)
                    .expect("free slots never exceed the capacity")
            })
    }

    /// Free ranges in ascending address order.
    #[must_use]
    pub(crate) fn free_ranges(&self) -> Vec<Range<u32>> {
        let mut ranges = self
            .free_blocks()
            .map(|(_, block)| block.range())
            .collect::<Vec<_>>();

        ranges.sort_unstable_by_key(|range| range.start);
        ranges
    }

    /// Verifies the partition invariant and the consistency of the lookups.
    #[cfg(test)]
    pub(crate) fn assert_integrity(&self) {
        let mut blocks = self.iter().collect::<Vec<_>>();
        blocks.sort_unstable_by_key(|(_, block)| block.base());

        assert_eq!(self.by_base.len(), blocks.len());
        assert_eq!(self.by_end.len(), blocks.len());

        let mut expected_base = 0;
        let mut previous_free = false;

        for (id, block) in blocks {
            assert_eq!(block.base(), expected_base, "gap or overlap at {block:?}");
            assert_eq!(self.by_base.get(&block.base()), Some(&id));
            assert_eq!(self.by_end.get(&block.end()), Some(&id));
            assert!(
                !(previous_free && block.is_free()),
                "adjacent free blocks at {block:?}"
            );

            previous_free = block.is_free();
            expected_base = block.end();
        }

        assert_eq!(expected_base, self.capacity);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    /// Builds a map where the given ranges are claimed and everything else is free.
    fn map_with_claimed(capacity: u32, claimed: &[Range<u32>]) -> (BlockMap, Vec<BlockId>) {
        let mut map = BlockMap::new(capacity, BlockState::Free);
        let mut ids = Vec::new();

        for range in claimed {
            let (id, block) = map
                .iter()
                .find(|(_, block)| {
                    block.is_free() && block.base() <= range.start && range.end <= block.end()
                })
                .expect("test ranges must not overlap");

            // Temporarily claim the slots in front of the range so the block starts where we want.
            let prefix = range.start - block.base();
            let spacer = (prefix > 0).then(|| map.split_or_claim(id, prefix));

            ids.push(map.split_or_claim(id, range.end - range.start));

            if let Some(spacer) = spacer {
                map.release(spacer);
            }
        }

        map.assert_integrity();
        (map, ids)
    }

    #[test]
    fn new_map_is_single_block() {
        let map = BlockMap::new(16, BlockState::Free);

        assert_eq!(map.free_ranges(), vec![0..16]);
        assert_eq!(map.first_block(), map.last_block());
        assert_eq!(map.free_total(), 16);
        map.assert_integrity();
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        _ = BlockMap::new(0, BlockState::Free);
    }

    #[test]
    fn split_carves_from_start() {
        let mut map = BlockMap::new(8, BlockState::Free);
        let whole = map.first_block().unwrap();

        let claimed = map.split_or_claim(whole, 3);

        assert_ne!(claimed, whole);
        assert_eq!(map.get(claimed).range(), 0..3);
        assert_eq!(map.get(claimed).state(), BlockState::Claimed);
        assert_eq!(map.get(whole).range(), 3..8);
        assert_eq!(map.first_block(), Some(claimed));
        assert_eq!(map.last_block(), Some(whole));
        map.assert_integrity();
    }

    #[test]
    fn exact_fit_claims_whole_block() {
        let mut map = BlockMap::new(8, BlockState::Free);
        let whole = map.first_block().unwrap();

        let claimed = map.split_or_claim(whole, 8);

        assert_eq!(claimed, whole);
        assert!(map.free_ranges().is_empty());
        map.assert_integrity();
    }

    #[test]
    fn min_fit_prefers_smallest_qualifying() {
        // Free: [0,2) [4,9) [11,14) [15,16)
        let (map, _) = map_with_claimed(16, &[2..4, 9..11, 14..15]);

        let id = map.find_min_fit(3).unwrap();
        assert_eq!(map.get(id).range(), 11..14);

        let id = map.find_min_fit(1).unwrap();
        assert_eq!(map.get(id).range(), 15..16);

        assert!(map.find_min_fit(6).is_none());
    }

    #[test]
    fn min_fit_ties_pick_some_minimal_block() {
        // Free: [0,2) [4,6) [8,16)
        let (map, _) = map_with_claimed(16, &[2..4, 6..8]);

        let id = map.find_min_fit(2).unwrap();
        assert_eq!(map.get(id).length(), 2);
    }

    #[test]
    fn max_fit_prefers_largest() {
        let (map, _) = map_with_claimed(16, &[2..4, 9..11, 14..15]);

        let id = map.find_max_fit(1).unwrap();
        assert_eq!(map.get(id).range(), 4..9);

        assert!(map.find_max_fit(6).is_none());
    }

    #[test]
    fn release_merges_both_neighbors() {
        let (mut map, ids) = map_with_claimed(16, &[4..8]);
        assert_eq!(map.free_ranges(), vec![0..4, 8..16]);

        let merged = map.release(ids[0]);

        assert_eq!(map.get(merged).range(), 0..16);
        assert_eq!(map.free_ranges(), vec![0..16]);
        map.assert_integrity();
    }

    #[test]
    fn release_next_to_claimed_blocks_does_not_merge() {
        let (mut map, ids) = map_with_claimed(12, &[0..4, 4..8, 8..12]);

        map.release(ids[1]);

        assert_eq!(map.free_ranges(), vec![4..8]);
        map.assert_integrity();
    }

    #[test]
    fn release_reserved_middle() {
        let mut map = BlockMap::new(16, BlockState::Reserved);

        let released = map.release_reserved(4, 6).unwrap();

        assert_eq!(map.get(released).range(), 4..10);
        assert_eq!(map.free_ranges(), vec![4..10]);
        assert_eq!(map.free_total(), 6);
        map.assert_integrity();
    }

    #[test]
    fn release_reserved_merges_with_free_neighbor() {
        let mut map = BlockMap::new(16, BlockState::Reserved);

        map.release_reserved(0, 4).unwrap();
        map.release_reserved(4, 4).unwrap();

        assert_eq!(map.free_ranges(), vec![0..8]);
        map.assert_integrity();
    }

    #[test]
    fn release_reserved_rejects_unreserved_ranges() {
        let mut map = BlockMap::new(16, BlockState::Reserved);
        map.release_reserved(0, 8).unwrap();

        assert!(map.release_reserved(6, 4).is_none());
        assert!(map.release_reserved(12, 8).is_none());
        assert!(map.release_reserved(u32::MAX, 2).is_none());
        map.assert_integrity();
    }

    #[test]
    fn vacant_ids_are_reused() {
        let (mut map, ids) = map_with_claimed(8, &[2..4]);
        map.release(ids[0]);

        let arena_len = map.blocks.len();

        let whole = map.first_block().unwrap();
        _ = map.split_or_claim(whole, 1);
        _ = map.split_or_claim(whole, 1);

        assert_eq!(map.blocks.len(), arena_len);
        map.assert_integrity();
    }
}

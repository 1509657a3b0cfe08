use std::ops::Range;

/// Stable identity of a block within a [`BlockMap`][crate::BlockMap].
///
/// Identifiers are reused once the block they refer to has been absorbed by a neighbor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct BlockId(usize);

impl BlockId {
    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Who currently holds the slots of a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BlockState {
    /// Available for allocation.
    Free,

    /// Claimed on behalf of a grant.
    Claimed,

    /// Held back by the pool itself until released into the free space.
    Reserved,
}

/// A run of consecutive slots that share the same [`BlockState`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Block {
    state: BlockState,
    base: u32,
    length: u32,
}

impl Block {
    #[must_use]
    pub(crate) fn new(state: BlockState, base: u32, length: u32) -> Self {
        debug_assert!(length > 0, "blocks are never empty");

        Self {
            state,
            base,
            length,
        }
    }

    #[must_use]
    pub(crate) fn state(&self) -> BlockState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: BlockState) {
        self.state = state;
    }

    #[must_use]
    pub(crate) fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }

    #[must_use]
    pub(crate) fn base(&self) -> u32 {
        self.base
    }

    #[must_use]
    pub(crate) fn length(&self) -> u32 {
        self.length
    }

    /// One past the last slot of the block.
    #[must_use]
    pub(crate) fn end(&self) -> u32 {
        self.base
            .checked_add(self.length)
            .expect("blocks never extend past the pool capacity, which is a u32")
    }

    #[must_use]
    pub(crate) fn range(&self) -> Range<u32> {
        self.base..self.end()
    }

    /// Whether `next` starts exactly where this block ends.
    #[must_use]
    pub(crate) fn precedes(&self, next: &Self) -> bool {
        self.end() == next.base
    }

    /// Moves the start of the block forward by `count` slots, keeping its end in place.
    pub(crate) fn shrink_front(&mut self, count: u32) {
        assert!(
            count < self.length,
            "shrinking a block must leave at least one slot"
        );

        self.base = self
            .base
            .checked_add(count)
            .expect("guarded by the length check above");
        self.length = self
            .length
            .checked_sub(count)
            .expect("guarded by the length check above");
    }

    /// Absorbs the block that immediately precedes this one.
    pub(crate) fn absorb_predecessor(&mut self, predecessor: &Self) {
        debug_assert!(predecessor.precedes(self));

        self.base = predecessor.base;
        self.length = self
            .length
            .checked_add(predecessor.length)
            .expect("adjacent blocks together never exceed the pool capacity");
    }

    /// Absorbs the block that immediately follows this one.
    pub(crate) fn absorb_successor(&mut self, successor: &Self) {
        debug_assert!(self.precedes(successor));

        self.length = self
            .length
            .checked_add(successor.length)
            .expect("adjacent blocks together never exceed the pool capacity");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn adjacency_is_arithmetic() {
        let a = Block::new(BlockState::Free, 0, 4);
        let b = Block::new(BlockState::Claimed, 4, 2);
        let c = Block::new(BlockState::Free, 7, 1);

        assert!(a.precedes(&b));
        assert!(!b.precedes(&c));
        assert!(!b.precedes(&a));
    }

    #[test]
    fn shrink_front_keeps_end() {
        let mut block = Block::new(BlockState::Free, 3, 5);
        block.shrink_front(2);

        assert_eq!(block.range(), 5..8);
    }

    #[test]
    #[should_panic]
    fn shrink_front_to_empty_panics() {
        let mut block = Block::new(BlockState::Free, 3, 5);
        block.shrink_front(5);
    }

    #[test]
    fn absorb_both_sides() {
        let before = Block::new(BlockState::Free, 0, 2);
        let mut middle = Block::new(BlockState::Free, 2, 3);
        let after = Block::new(BlockState::Free, 5, 4);

        middle.absorb_predecessor(&before);
        middle.absorb_successor(&after);

        assert_eq!(middle.range(), 0..9);
        assert!(middle.is_free());
    }
}

/// The result of a successful [`SlotPool::alloc()`][crate::SlotPool::alloc].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Allocation {
    base: u32,
    bit_width: u32,
}

impl Allocation {
    pub(crate) fn new(base: u32, bit_width: u32) -> Self {
        Self { base, bit_width }
    }

    /// The first slot of the grant. Pass this to [`SlotPool::free()`][crate::SlotPool::free]
    /// to release the grant and to [`SlotPool::slot_index()`][crate::SlotPool::slot_index] to
    /// translate offsets within the grant into slots.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// `floor(log2(count))` of the allocated slot count, as programmed into hardware that
    /// addresses slot groups by base and width.
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
}

use std::cell::Cell;
use std::marker::PhantomData;

use crate::SlotPool;

/// Builder for creating an instance of [`SlotPool`].
///
/// The capacity is mandatory, whereas other settings are optional. By default, the pool
/// stitches together non-adjacent free blocks when no single block is large enough, does not
/// wrap around from the end of the slot space to its start and begins with every slot free.
///
/// # Examples
///
/// A pool of 32 slots that may hand out ranges wrapping around the end of the slot space:
///
/// ```
/// use slot_pool::SlotPool;
///
/// let pool = SlotPool::builder()
///     .capacity(32)
///     .wrap_allowed(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.available(), 32);
/// ```
///
/// A pool of 16 slots that only ever hands out single contiguous ranges:
///
/// ```
/// use slot_pool::SlotPool;
///
/// let pool = SlotPool::builder()
///     .capacity(16)
///     .contiguous_only(true)
///     .build()
///     .unwrap();
///
/// assert!(pool.is_contiguous_only());
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct SlotPoolBuilder {
    capacity: Option<u32>,
    contiguous_only: bool,
    wrap_allowed: bool,
    seeded: bool,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl SlotPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            contiguous_only: false,
            wrap_allowed: false,
            seeded: true,
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of slots in the pool. Slots are numbered from zero.
    #[inline]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Requires every grant to be a single contiguous range of slots.
    ///
    /// When set, a request that no single free block can satisfy fails with
    /// [`Error::NoFit`][crate::Error::NoFit] even if enough slots are free in total.
    #[inline]
    pub fn contiguous_only(mut self, contiguous_only: bool) -> Self {
        self.contiguous_only = contiguous_only;
        self
    }

    /// Allows a grant to combine the free block at the end of the slot space with the free
    /// block at its start, forming a range that is contiguous modulo the capacity.
    ///
    /// Has no effect on pools that are [contiguous only][Self::contiguous_only].
    #[inline]
    pub fn wrap_allowed(mut self, wrap_allowed: bool) -> Self {
        self.wrap_allowed = wrap_allowed;
        self
    }

    /// Whether the pool starts with every slot free (the default).
    ///
    /// An unseeded pool starts with every slot reserved; ranges become available for
    /// allocation only once handed over via [`SlotPool::release_unseeded()`].
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::SlotPool;
    ///
    /// let mut pool = SlotPool::builder()
    ///     .capacity(16)
    ///     .seeded(false)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(pool.available(), 0);
    ///
    /// // Only the upper half of the table is usable.
    /// pool.release_unseeded(8, 8).unwrap();
    /// assert_eq!(pool.available(), 8);
    /// ```
    #[inline]
    pub fn seeded(mut self, seeded: bool) -> Self {
        self.seeded = seeded;
        self
    }

    /// Builds the slot pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`][crate::Error::InvalidCapacity] if no capacity has
    /// been set or the capacity is zero.
    #[inline]
    pub fn build(self) -> crate::Result<SlotPool> {
        SlotPool::new_inner(
            self.capacity.unwrap_or_default(),
            self.contiguous_only,
            self.wrap_allowed,
            self.seeded,
        )
    }
}

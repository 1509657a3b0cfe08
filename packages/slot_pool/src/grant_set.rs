use crate::{Grant, PoolId};

/// A caller's handle to a set of grants held in a [`SlotPool`][crate::SlotPool].
///
/// A grant set collects every allocation made on behalf of one logical owner (typically one
/// network channel), so that all of them can be released in bulk. The same set can be shared
/// by several owners via [`SlotPool::share()`][crate::SlotPool::share], each of which receives
/// its own handle. The slots only return to the pool when the last handle is released via
/// [`SlotPool::release_grant_set()`][crate::SlotPool::release_grant_set].
///
/// Handles cannot be cloned. Releasing a handle consumes it, so a released handle can never be
/// used again. A handle that is dropped without being released keeps its grants allocated until
/// the pool itself is dropped.
///
/// # Example
///
/// ```rust
/// use slot_pool::SlotPool;
///
/// let mut pool = SlotPool::builder().capacity(16).build().unwrap();
///
/// let set = pool.grant_set();
/// pool.alloc(&set, 4).unwrap();
/// pool.alloc(&set, 2).unwrap();
/// assert_eq!(pool.allocated(), 6);
///
/// // Releasing the only handle returns every grant in the set to the pool.
/// pool.release_grant_set(set);
/// assert_eq!(pool.allocated(), 0);
/// ```
#[derive(Debug)]
#[must_use = "grant sets must be returned to their pool via release_grant_set()"]
pub struct GrantSet {
    pool_id: PoolId,
    index: usize,
}

impl GrantSet {
    pub(crate) fn new(pool_id: PoolId, index: usize) -> Self {
        Self { pool_id, index }
    }

    pub(crate) fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// The shared state behind every handle to the same grant set.
#[derive(Debug)]
pub(crate) struct GrantSetState {
    grants: Vec<Grant>,

    /// Sum of `total` over `grants`.
    allocated: u32,

    /// Number of live handles referring to this set.
    instance_count: u32,
}

impl GrantSetState {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            grants: Vec::new(),
            allocated: 0,
            instance_count: 1,
        }
    }

    pub(crate) fn grants(&self) -> &[Grant] {
        &self.grants
    }

    #[must_use]
    pub(crate) fn allocated(&self) -> u32 {
        self.allocated
    }

    #[must_use]
    pub(crate) fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[must_use]
    pub(crate) fn find(&self, base: u32) -> Option<&Grant> {
        self.grants.iter().find(|grant| grant.base() == base)
    }

    pub(crate) fn push(&mut self, grant: Grant) {
        self.allocated = self
            .allocated
            .checked_add(grant.total())
            .expect("a grant set never holds more slots than its pool capacity");
        self.grants.push(grant);
    }

    /// Removes the grant with the given base, if any.
    pub(crate) fn take(&mut self, base: u32) -> Option<Grant> {
        let position = self.grants.iter().position(|grant| grant.base() == base)?;
        let grant = self.grants.swap_remove(position);

        self.allocated = self
            .allocated
            .checked_sub(grant.total())
            .expect("the set total always includes every grant it holds");

        Some(grant)
    }

    pub(crate) fn add_instance(&mut self) {
        self.instance_count = self
            .instance_count
            .checked_add(1)
            .expect("grant set instance count overflow");
    }

    /// Drops one instance. Returns `true` if that was the last one.
    pub(crate) fn remove_instance(&mut self) -> bool {
        if self.instance_count <= 1 {
            self.instance_count = 0;
            return true;
        }

        self.instance_count = self
            .instance_count
            .checked_sub(1)
            .expect("guarded by the check above");
        false
    }
}

/// Storage for the grant sets served by one pool, addressed by stable index.
#[derive(Debug, Default)]
pub(crate) struct GrantSetTable {
    entries: Vec<Option<GrantSetState>>,
    vacant: Vec<usize>,
}

impl GrantSetTable {
    pub(crate) fn insert(&mut self, state: GrantSetState) -> usize {
        if let Some(index) = self.vacant.pop() {
            let entry = self
                .entries
                .get_mut(index)
                .expect("vacant indexes always refer to existing entries");
            *entry = Some(state);
            index
        } else {
            self.entries.push(Some(state));
            self.entries
                .len()
                .checked_sub(1)
                .expect("we just pushed an entry")
        }
    }

    /// # Panics
    ///
    /// Panics if the entry has been removed.
    pub(crate) fn get(&self, index: usize) -> &GrantSetState {
        self.entries
            .get(index)
            .and_then(Option::as_ref)
            .expect("grant set handles always refer to live grant sets")
    }

    /// # Panics
    ///
    /// Panics if the entry has been removed.
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut GrantSetState {
        self.entries
            .get_mut(index)
            .and_then(Option::as_mut)
            .expect("grant set handles always refer to live grant sets")
    }

    pub(crate) fn remove(&mut self, index: usize) -> GrantSetState {
        let state = self
            .entries
            .get_mut(index)
            .and_then(Option::take)
            .expect("grant set handles always refer to live grant sets");

        self.vacant.push(index);
        state
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &GrantSetState> {
        self.entries.iter().flatten()
    }
}

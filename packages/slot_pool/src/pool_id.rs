use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes pools from each other so that handles cannot be used with the wrong pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PoolId(u64);

impl PoolId {
    #[must_use]
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);

        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

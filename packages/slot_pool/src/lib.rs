#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Allocates ranges of slots in fixed-size hardware tables, such as the QPN routing table and the
//! TCAM classification table that a network adapter exposes for each of its ports.
//!
//! This is part of the [Folo project](https://github.com/folo-rs/folo) that provides mechanisms for
//! high-performance hardware-aware programming in Rust.
//!
//! # Allocation model
//!
//! A [`SlotPool`] owns the slot space `[0, capacity)` of one table. Callers allocate slots on
//! behalf of a [`GrantSet`] and receive the base slot of the resulting grant:
//!
//! * The smallest free block that can hold the request is used (best fit).
//! * If no single block is large enough, a pool that is not
//!   [contiguous-only][SlotPoolBuilder::contiguous_only] assembles the request from several free
//!   blocks. With [wraparound][SlotPoolBuilder::wrap_allowed] enabled, it first tries to combine
//!   the free block at the end of the table with the free block at its start.
//! * Released blocks are merged with adjacent free blocks, so free space never fragments more
//!   than the outstanding grants require.
//! * A failed allocation leaves the pool unchanged.
//!
//! Grant sets release all of their grants in one go and can be shared between several owners,
//! each of which holds its own handle. The grants are only released once the last handle is.
//!
//! [`PortSlots`] bundles the QPN and TCAM pools of one port with the channels that draw from
//! them.
//!
//! # Example
//!
//! ```
//! use slot_pool::SlotPool;
//!
//! let mut pool = SlotPool::builder()
//!     .capacity(16)
//!     .wrap_allowed(true)
//!     .build()
//!     .unwrap();
//!
//! let set = pool.grant_set();
//!
//! let head = pool.alloc(&set, 3).unwrap();
//! pool.alloc(&set, 8).unwrap();
//! pool.free(&set, head.base()).unwrap();
//!
//! // Slots 0..3 and 11..16 are free. No single block holds 8 slots, so the grant wraps around.
//! let wrapped = pool.alloc(&set, 8).unwrap();
//! assert_eq!(wrapped.base(), 11);
//! assert_eq!(pool.slot_index(&set, wrapped.base(), 5).unwrap(), 0);
//!
//! pool.release_grant_set(set);
//! assert!(pool.is_empty());
//! ```
//!
//! # Thread safety
//!
//! Nothing in this crate is internally synchronized. All types are [`Send`] and [`Sync`] plain
//! data; mutating operations take `&mut self`, so callers that share a pool or port between
//! threads hold it behind a lock of their choosing.

mod allocation;
mod block;
mod block_map;
mod builder;
mod error;
mod grant;
mod grant_set;
mod pool;
mod pool_id;
mod port;
mod port_builder;

pub use allocation::*;
pub(crate) use block::*;
pub(crate) use block_map::*;
pub use builder::*;
pub use error::*;
pub use grant::GrantInfo;
pub(crate) use grant::Grant;
pub use grant_set::GrantSet;
pub(crate) use grant_set::{GrantSetState, GrantSetTable};
pub use pool::SlotPool;
pub(crate) use pool_id::*;
pub use port::{ChannelId, PortSlots, SlotKind};
pub use port_builder::*;

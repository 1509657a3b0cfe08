use std::fmt;

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::{Allocation, Error, GrantSet, PortSlotsBuilder, SlotPool};

/// The hardware slot tables that exist once per physical port.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SlotKind {
    /// Routing-table entries that map a packet match result to a queue pair.
    Qpn,

    /// Ternary-content-addressable classification entries.
    Tcam,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qpn => write!(f, "qpn"),
            Self::Tcam => write!(f, "tcam"),
        }
    }
}

/// Identifies a channel opened on a [`PortSlots`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(u32);

impl ChannelId {
    /// The numeric value of the identifier.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The grant sets a channel holds, one per slot kind, created on first use.
#[derive(Debug, Default)]
struct Channel {
    qpn: Option<GrantSet>,
    tcam: Option<GrantSet>,
}

impl Channel {
    fn slot(&self, kind: SlotKind) -> Option<&GrantSet> {
        match kind {
            SlotKind::Qpn => self.qpn.as_ref(),
            SlotKind::Tcam => self.tcam.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut Option<GrantSet> {
        match kind {
            SlotKind::Qpn => &mut self.qpn,
            SlotKind::Tcam => &mut self.tcam,
        }
    }
}

/// The QPN and TCAM slot pools of one physical port and the channels that draw from them.
///
/// Each channel holds at most one grant set per slot kind. The grant set is created the first
/// time the channel allocates slots of that kind, or when it starts sharing another channel's
/// slots via [`share()`][Self::share]. Closing a channel releases its handles; slots shared with
/// other channels stay allocated until the last of them is closed.
///
/// Like the pools it contains, the port is not internally synchronized. Callers that operate on
/// a port from several threads hold it behind a lock of their choosing.
///
/// # Example
///
/// ```rust
/// use slot_pool::{PortSlots, SlotKind};
///
/// let mut port = PortSlots::builder().port(0).build().unwrap();
///
/// let rx = port.open_channel();
/// let qpn = port.alloc(rx, SlotKind::Qpn, 8).unwrap();
/// assert_eq!(qpn.bit_width(), 3);
///
/// // A second channel reuses the routing slots of the first one.
/// let tx = port.open_channel();
/// port.share(tx, rx, SlotKind::Qpn).unwrap();
///
/// port.close_channel(rx).unwrap();
/// assert_eq!(port.pool(SlotKind::Qpn).allocated(), 8);
///
/// port.close_channel(tx).unwrap();
/// assert_eq!(port.pool(SlotKind::Qpn).allocated(), 0);
///
/// port.fini().unwrap();
/// ```
#[derive(Debug)]
pub struct PortSlots {
    port: u32,
    qpn: SlotPool,
    tcam: SlotPool,
    channels: HashMap<ChannelId, Channel>,
    next_channel: u32,
}

impl PortSlots {
    /// Starts building a new [`PortSlots`].
    pub fn builder() -> PortSlotsBuilder {
        PortSlotsBuilder::new()
    }

    pub(crate) fn new_inner(port: u32, qpn: SlotPool, tcam: SlotPool) -> Self {
        debug!(
            port,
            qpn_slots = qpn.capacity(),
            tcam_slots = tcam.capacity(),
            "port slot pools created"
        );

        Self {
            port,
            qpn,
            tcam,
            channels: HashMap::new(),
            next_channel: 0,
        }
    }

    /// The number of the physical port.
    #[must_use]
    pub fn port(&self) -> u32 {
        self.port
    }

    /// The pool that serves slots of the given kind.
    #[must_use]
    pub fn pool(&self, kind: SlotKind) -> &SlotPool {
        match kind {
            SlotKind::Qpn => &self.qpn,
            SlotKind::Tcam => &self.tcam,
        }
    }

    fn split_mut(&mut self, kind: SlotKind) -> (&mut SlotPool, &mut HashMap<ChannelId, Channel>) {
        let pool = match kind {
            SlotKind::Qpn => &mut self.qpn,
            SlotKind::Tcam => &mut self.tcam,
        };

        (pool, &mut self.channels)
    }

    /// The number of open channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether the channel is open on this port.
    #[must_use]
    pub fn is_open(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Registers a new channel that does not hold any slots yet.
    pub fn open_channel(&mut self) -> ChannelId {
        let channel = ChannelId(self.next_channel);
        self.next_channel = self
            .next_channel
            .checked_add(1)
            .expect("channel identifier space exhausted");

        self.channels.insert(channel, Channel::default());

        debug!(port = self.port, %channel, "channel opened");
        channel
    }

    /// Allocates `count` slots of the given kind on behalf of a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if the channel is not open and otherwise the errors
    /// of [`SlotPool::alloc()`].
    pub fn alloc(
        &mut self,
        channel: ChannelId,
        kind: SlotKind,
        count: u32,
    ) -> crate::Result<Allocation> {
        let port = self.port;
        let (pool, channels) = self.split_mut(kind);

        let slot = channels
            .get_mut(&channel)
            .ok_or(Error::UnknownChannel { channel })?
            .slot_mut(kind);
        let set = slot.get_or_insert_with(|| pool.grant_set());

        pool.alloc(set, count)
            .inspect(|allocation| {
                trace!(
                    port,
                    %channel,
                    %kind,
                    count,
                    base = allocation.base(),
                    bit_width = allocation.bit_width(),
                    "slots allocated"
                );
            })
            .inspect_err(|error| {
                debug!(port, %channel, %kind, count, %error, "slot allocation failed");
            })
    }

    /// Releases the grant that starts at `base` from a channel's slots of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if the channel is not open and [`Error::NotFound`]
    /// if the channel holds no grant with that base.
    pub fn free(&mut self, channel: ChannelId, kind: SlotKind, base: u32) -> crate::Result<()> {
        let port = self.port;
        let (pool, channels) = self.split_mut(kind);

        let set = channels
            .get(&channel)
            .ok_or(Error::UnknownChannel { channel })?
            .slot(kind)
            .ok_or(Error::NotFound { base })?;

        pool.free(set, base)?;

        trace!(port, %channel, %kind, base, "slots released");
        Ok(())
    }

    /// Makes `target` share the slots of the given kind held by `source`.
    ///
    /// From then on, allocations made by either channel are visible through both, and the
    /// slots stay allocated until both channels have been closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if either channel is not open,
    /// [`Error::AlreadyInitialized`] if `target` already holds slots of that kind and
    /// [`Error::InvalidArgument`] if both refer to the same channel.
    pub fn share(
        &mut self,
        target: ChannelId,
        source: ChannelId,
        kind: SlotKind,
    ) -> crate::Result<()> {
        if target == source {
            return Err(Error::invalid_argument(
                "a channel cannot share slots with itself",
            ));
        }

        let port = self.port;
        let (pool, channels) = self.split_mut(kind);

        if channels
            .get(&target)
            .ok_or(Error::UnknownChannel { channel: target })?
            .slot(kind)
            .is_some()
        {
            return Err(Error::AlreadyInitialized);
        }

        let source_set = channels
            .get_mut(&source)
            .ok_or(Error::UnknownChannel { channel: source })?
            .slot_mut(kind)
            .get_or_insert_with(|| pool.grant_set());

        let mut shared = None;
        pool.share(&mut shared, source_set)?;

        *channels
            .get_mut(&target)
            .expect("presence checked above")
            .slot_mut(kind) = shared;

        debug!(port, %target, %source, %kind, "channel slots shared");
        Ok(())
    }

    /// Translates an offset within one of a channel's grants into a slot number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if the channel is not open and otherwise the errors
    /// of [`SlotPool::slot_index()`].
    pub fn slot_index(
        &self,
        channel: ChannelId,
        kind: SlotKind,
        base: u32,
        offset: u32,
    ) -> crate::Result<u32> {
        let set = self
            .channels
            .get(&channel)
            .ok_or(Error::UnknownChannel { channel })?
            .slot(kind)
            .ok_or(Error::NotFound { base })?;

        self.pool(kind).slot_index(set, base, offset)
    }

    /// The number of slots of the given kind that a channel can use, including shared ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if the channel is not open.
    pub fn channel_allocated(&self, channel: ChannelId, kind: SlotKind) -> crate::Result<u32> {
        let slot = self
            .channels
            .get(&channel)
            .ok_or(Error::UnknownChannel { channel })?
            .slot(kind);

        Ok(slot.map_or(0, |set| self.pool(kind).grant_set_allocated(set)))
    }

    /// Closes a channel, releasing its handles to the grant sets it holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if the channel is not open.
    pub fn close_channel(&mut self, channel: ChannelId) -> crate::Result<()> {
        let Channel { qpn, tcam } = self
            .channels
            .remove(&channel)
            .ok_or(Error::UnknownChannel { channel })?;

        if let Some(set) = qpn {
            self.qpn.release_grant_set(set);
        }

        if let Some(set) = tcam {
            self.tcam.release_grant_set(set);
        }

        debug!(
            port = self.port,
            %channel,
            qpn_allocated = self.qpn.allocated(),
            tcam_allocated = self.tcam.allocated(),
            "channel closed"
        );
        Ok(())
    }

    /// Tears down the port, closing any channels that are still open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEmpty`] if slots remain allocated after every channel was closed.
    pub fn fini(mut self) -> crate::Result<()> {
        let mut open = self.channels.keys().copied().collect::<Vec<_>>();
        open.sort_unstable();

        for channel in open {
            debug!(port = self.port, %channel, "closing channel left open at teardown");
            self.close_channel(channel)?;
        }

        let Self { qpn, tcam, .. } = self;
        qpn.fini()?;
        tcam.fini()
    }
}

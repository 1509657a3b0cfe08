use crate::{PortSlots, SlotPool};

/// The number of QPN routing slots on a port, unless configured otherwise.
pub const DEFAULT_QPN_SLOTS: u32 = 32;

/// The number of TCAM classification slots on a port, unless configured otherwise.
pub const DEFAULT_TCAM_SLOTS: u32 = 16;

/// Builder for creating an instance of [`PortSlots`].
///
/// The slot table sizes default to [`DEFAULT_QPN_SLOTS`] and [`DEFAULT_TCAM_SLOTS`]. When the
/// hardware reports different sizes in its capability registers, pass those instead.
///
/// # Examples
///
/// ```
/// use slot_pool::{PortSlots, SlotKind};
///
/// let port = PortSlots::builder()
///     .port(1)
///     .qpn_slots(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(port.pool(SlotKind::Qpn).capacity(), 64);
/// assert_eq!(port.pool(SlotKind::Tcam).capacity(), 16);
/// ```
#[derive(Debug)]
#[must_use]
pub struct PortSlotsBuilder {
    port: u32,
    qpn_slots: u32,
    tcam_slots: u32,
}

impl PortSlotsBuilder {
    pub(crate) fn new() -> Self {
        Self {
            port: 0,
            qpn_slots: DEFAULT_QPN_SLOTS,
            tcam_slots: DEFAULT_TCAM_SLOTS,
        }
    }

    /// Sets the number of the physical port, as reported in log events.
    pub fn port(mut self, port: u32) -> Self {
        self.port = port;
        self
    }

    /// Sets the number of QPN routing slots.
    pub fn qpn_slots(mut self, slots: u32) -> Self {
        self.qpn_slots = slots;
        self
    }

    /// Sets the number of TCAM classification slots.
    pub fn tcam_slots(mut self, slots: u32) -> Self {
        self.tcam_slots = slots;
        self
    }

    /// Builds the port with one pool per slot kind.
    ///
    /// QPN slots may be stitched together from several free blocks and may wrap around the end
    /// of the table. TCAM slots are always handed out as one contiguous range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`][crate::Error::InvalidCapacity] if either slot count
    /// is zero.
    pub fn build(self) -> crate::Result<PortSlots> {
        let qpn = SlotPool::builder()
            .capacity(self.qpn_slots)
            .wrap_allowed(true)
            .build()?;

        let tcam = SlotPool::builder()
            .capacity(self.tcam_slots)
            .contiguous_only(true)
            .build()?;

        Ok(PortSlots::new_inner(self.port, qpn, tcam))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{Error, SlotKind};

    #[test]
    fn defaults() {
        let port = PortSlotsBuilder::new().build().unwrap();

        assert_eq!(port.port(), 0);
        assert_eq!(port.pool(SlotKind::Qpn).capacity(), DEFAULT_QPN_SLOTS);
        assert_eq!(port.pool(SlotKind::Tcam).capacity(), DEFAULT_TCAM_SLOTS);
    }

    #[test]
    fn pool_policies_follow_slot_kind() {
        let port = PortSlotsBuilder::new().build().unwrap();

        let qpn = port.pool(SlotKind::Qpn);
        assert!(!qpn.is_contiguous_only());
        assert!(qpn.is_wrap_allowed());

        let tcam = port.pool(SlotKind::Tcam);
        assert!(tcam.is_contiguous_only());
        assert!(!tcam.is_wrap_allowed());
    }

    #[test]
    fn zero_slots_are_invalid() {
        let result = PortSlotsBuilder::new().tcam_slots(0).build();

        assert_eq!(result.unwrap_err(), Error::InvalidCapacity);
    }
}

//! Demonstrates channels drawing slots from the pools of a port.
//!
//! One channel allocates routing and classification slots and a second channel shares its
//! routing slots. The routing slots stay allocated until both channels are closed.

use slot_pool::{PortSlots, SlotKind};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Port Channels Example ===");

    let mut port = PortSlots::builder().port(0).qpn_slots(16).build().unwrap();

    let rx = port.open_channel();
    let tx = port.open_channel();

    let routing = port.alloc(rx, SlotKind::Qpn, 8).unwrap();
    let filter = port.alloc(rx, SlotKind::Tcam, 2).unwrap();
    port.share(tx, rx, SlotKind::Qpn).unwrap();

    println!(
        "Routing slots start at {} with bit width {}",
        routing.base(),
        routing.bit_width()
    );
    println!("Filter slots start at {}", filter.base());

    for offset in 0..8 {
        let slot = port
            .slot_index(tx, SlotKind::Qpn, routing.base(), offset)
            .unwrap();
        println!("  Offset {offset} maps to routing slot {slot}");
    }

    port.close_channel(rx).unwrap();
    println!(
        "Routing slots still allocated after closing rx: {}",
        port.pool(SlotKind::Qpn).allocated()
    );

    port.close_channel(tx).unwrap();
    assert_eq!(port.pool(SlotKind::Qpn).allocated(), 0);

    port.fini().unwrap();
    println!("Example completed successfully!");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Link (Ethernet) device, spec.md §4.7: two on-wire protocols sharing
//! one Ethernet MAC/buffer chip behind the [`chip::NetChip`] seam, one
//! selected per boot from configuration.

#![cfg_attr(not(test), no_std)]

pub mod chip;
pub mod inquiry;
pub mod protocol_a;
pub mod protocol_b;
pub mod stats;

use drv_scsi_logic::{read_command, CommandOutcome, IllegalLunResponses, Sense};
use drv_scsi_phy::pins::PhyPins;
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};

use crate::chip::{NetChip, TxBuffer};
use crate::inquiry::INQUIRY_DATA_NUVOLINK;
use crate::stats::LinkStats;

pub use chip::PacketHeader;

/// Which on-wire protocol this link device presents, chosen once at
/// configuration time (spec.md §4.7: "one selected per boot").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Protocol {
    Nuvolink,
    Daynaport,
}

/// Mutable state shared by both protocol handlers: the two MAC address
/// copies, the AppleTalk-multicast flag, the receive packet counter,
/// current TX buffer, sense data, and the statistics block.
pub struct LinkState {
    pub mac_rom: [u8; 6],
    pub mac_dyn: [u8; 6],
    pub allow_atalk: bool,
    pub rx_packet_id: u8,
    pub tx_buffer: TxBuffer,
    pub sense: Sense,
    pub stats: LinkStats,
}

impl LinkState {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            mac_rom: mac,
            mac_dyn: mac,
            allow_atalk: false,
            rx_packet_id: 0,
            tx_buffer: TxBuffer::A,
            sense: Sense::new(),
            stats: LinkStats::new(),
        }
    }
}

/// A link target, LUN 0 behind some target ID, generic over the
/// Ethernet chip it's paired with.
pub struct Link<N: NetChip> {
    protocol: Protocol,
    chip: N,
    state: LinkState,
}

impl<N: NetChip> Link<N> {
    pub fn new(protocol: Protocol, chip: N, mac: [u8; 6]) -> Self {
        Self {
            protocol,
            chip,
            state: LinkState::new(mac),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn stats(&self) -> LinkStats {
        self.state.stats
    }

    /// Services one command once COMMAND framing has resolved this
    /// target/LUN for a fresh (non-reselected) selection.
    pub fn service<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        let illegal = IllegalLunResponses {
            inquiry: &INQUIRY_DATA_NUVOLINK,
            sense: self.state.sense.bytes(),
        };
        let (outcome, cdb) = read_command(pins, phy, clock, timings, illegal);
        if outcome != CommandOutcome::Ready {
            return;
        }

        match self.protocol {
            Protocol::Nuvolink => {
                protocol_a::service(pins, phy, clock, timings, &mut self.chip, &mut self.state, &cdb)
            }
            Protocol::Daynaport => {
                protocol_b::service(pins, phy, clock, timings, &mut self.chip, &mut self.state, &cdb)
            }
        }
    }

    /// Polled by the main loop between selections. Only meaningful for
    /// the Nuvolink protocol, which is the only one that reselects
    /// (spec.md §4.7); a no-op otherwise.
    pub fn check_rx(&mut self, phy: &PhyState) {
        if self.protocol == Protocol::Nuvolink {
            protocol_a::check_rx(&mut self.chip, phy, &mut self.state);
        }
    }

    /// Drives a successfully reselected transaction to completion.
    /// Only the Nuvolink protocol ever reselects.
    pub fn service_reselected<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        if self.protocol == Protocol::Nuvolink {
            protocol_a::service_reselected(pins, phy, clock, timings, &mut self.chip, &mut self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::tests_support::MockChip;
    use drv_scsi_phy::pins::mock::MockPins;
    use drv_scsi_phy::PhyState;

    struct FakeClock;
    impl Clock for FakeClock {
        fn now_ticks(&self) -> u64 {
            0
        }
        fn delay_ticks(&mut self, _ticks: u64) {}
    }

    fn timings() -> ArbitrationTimings {
        ArbitrationTimings {
            phase_settle_ticks: 0,
            bus_free_ticks: 0,
            bus_free_window_ticks: 0,
            arbitration_wait_ticks: 0,
            reselect_poll_ticks: 0,
            disconnect_delay_ticks: 0,
        }
    }

    #[test]
    fn nuvolink_test_unit_ready_round_trip() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.feed.borrow_mut().extend([0x00u8, 0, 0, 0, 0, 0]);
        let phy = PhyState::new();
        phy.on_selected(0x01);
        let mut link = Link::new(Protocol::Nuvolink, MockChip::default(), [1, 2, 3, 4, 5, 6]);
        link.service(&mut pins, &phy, &mut FakeClock, &timings());
        assert_eq!(phy.last_message_in(), 0x00);
    }

    #[test]
    fn daynaport_check_rx_is_a_noop() {
        let phy = PhyState::new();
        phy.on_selected(0x01);
        let mut link = Link::new(Protocol::Daynaport, MockChip::default(), [0u8; 6]);
        link.check_rx(&phy);
        assert!(!phy.reselect_pending());
    }
}

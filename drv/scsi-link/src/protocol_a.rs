// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nuvolink-compatible "push" protocol, spec.md §4.7. The only link
//! variant that reselects: once a packet is waiting and the initiator
//! has granted disconnect privilege, `check_rx` asks the Arbitration
//! Engine to pull the initiator back so packets can be delivered
//! without polling.

use drv_scsi_logic::{
    data_in, data_out_dummy, message_in, request_sense, send_diagnostic, status, Cdb, Status,
};
use drv_scsi_phy::pins::PhyPins;
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_bulk_checked, phase_change};
use drv_scsi_phy::Phase;
use ringbuf::*;

use crate::chip::{ChipSink, NetChip, TxBuffer};
use crate::inquiry::{DIAGNOSTIC_RESULTS, INQUIRY_DATA_NUVOLINK};
use crate::stats::LinkStats;
use crate::LinkState;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Opcode(u8),
    AskingReselect,
    ReselectedReceiving,
    ShortTxRequested(u16),
}
ringbuf!(Trace, 16, Trace::None);

/// Maximum Ethernet II frame this target will ever move in one go
/// (14-byte header + 1500-byte payload), per `original_source/link.c`.
const MAXIMUM_TRANSFER_LENGTH: u16 = 1514;

fn good<P: PhyPins, C: Clock>(pins: &mut P, phy: &PhyState, clock: &mut C, timings: &ArbitrationTimings) {
    status(pins, phy, clock, timings, Status::Good);
    message_in(pins, phy, clock, timings, 0x00);
}

fn send_packet<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
    mut length: u16,
) {
    if length > MAXIMUM_TRANSFER_LENGTH {
        length = MAXIMUM_TRANSFER_LENGTH;
    }
    phase_change(pins, phy, clock, timings, Phase::DataOut);
    chip.start_write(link.tx_buffer);
    chip.write_bytes(&[0x00]);
    let mut sink = ChipSink::new(chip);
    let _ = drv_scsi_phy::transfer::ask_bulk(pins, &mut sink, length as usize);
    chip.end_write();
    chip.transmit(link.tx_buffer, length + 1);
    link.tx_buffer = link.tx_buffer.next();
    link.stats.note_sent();
}

/// Services one command once COMMAND framing has resolved this target
/// for the Nuvolink protocol.
pub fn service<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
    cdb: &Cdb,
) {
    ringbuf_entry!(Trace::Opcode(cdb.opcode()));
    match cdb.opcode() {
        0x00 | 0x08 | 0x0A | 0x0C => good(pins, phy, clock, timings),
        0x02 => {
            link.stats.reset();
            good(pins, phy, clock, timings);
        }
        0x03 => request_sense(pins, phy, clock, timings, cdb, &mut link.sense),
        0x05 => {
            let length = (((cdb.bytes[3] & 0x07) as u16) << 8) | cdb.bytes[4] as u16;
            send_packet(pins, phy, clock, timings, chip, link, length);
            good(pins, phy, clock, timings);
        }
        0x06 => {
            let alloc = cdb.bytes[4];
            if alloc > 0 {
                data_out_dummy(pins, phy, clock, timings, alloc as u16);
            }
            good(pins, phy, clock, timings);
        }
        0x09 => {
            let mut data = [0u8; 8];
            let alloc = (cdb.bytes[4] as usize).min(8);
            phase_change(pins, phy, clock, timings, Phase::DataOut);
            for slot in data.iter_mut().take(alloc) {
                *slot = ask_byte(pins);
            }
            let multicast = data[7] & 0x80 != 0;
            chip.set_multicast_filter(multicast);
            good(pins, phy, clock, timings);
        }
        0x12 => inquiry(pins, phy, clock, timings, link, cdb),
        0x1C => {
            data_in(pins, phy, clock, timings, &DIAGNOSTIC_RESULTS);
            good(pins, phy, clock, timings);
        }
        0x1D => send_diagnostic(pins, phy, clock, timings, cdb),
        _ => {
            link.sense.illegal_op();
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
        }
    }
}

fn inquiry<P: PhyPins, C: Clock>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    link: &LinkState,
    cdb: &Cdb,
) {
    let alloc = (((cdb.bytes[3] & 1) as usize) << 8) | cdb.bytes[4] as usize;
    if alloc > 0 {
        phase_change(pins, phy, clock, timings, Phase::DataIn);
        let limit = alloc.min(36);
        for &b in &INQUIRY_DATA_NUVOLINK[..limit] {
            drv_scsi_phy::transfer::offer_byte(pins, b, false);
        }
        if alloc >= 96 {
            for &b in &link.mac_rom {
                drv_scsi_phy::transfer::offer_byte(pins, b, false);
            }
            for _ in 0..14 {
                drv_scsi_phy::transfer::offer_byte(pins, 0x00, false);
            }
            for &b in &link.mac_dyn {
                drv_scsi_phy::transfer::offer_byte(pins, b, false);
            }
            for _ in 0..34 {
                drv_scsi_phy::transfer::offer_byte(pins, 0x00, false);
            }
        }
        if alloc >= 292 {
            for &b in &link.stats.to_block() {
                drv_scsi_phy::transfer::offer_byte(pins, b, false);
            }
        }
    }
    if pins.is_asserted(drv_scsi_phy::pins::Control::Atn) {
        drv_scsi_logic::message_out(pins, phy, clock, timings);
    }
    status(pins, phy, clock, timings, Status::Good);
    message_in(pins, phy, clock, timings, 0x00);
}

/// Polled by the main loop between selections (spec.md §4.7's Protocol
/// A receive path). Asks the Arbitration Engine for a reselect if a
/// packet is waiting and the initiator previously granted disconnect
/// privilege (IDENTIFY bit 0x40); otherwise, with no privilege granted,
/// drops the waiting packet so the chip doesn't stall.
pub fn check_rx<N: NetChip>(chip: &mut N, phy: &PhyState, link: &mut LinkState) {
    if !chip.packet_pending_line() {
        return;
    }
    if phy.reselect_pending() {
        return;
    }
    match phy.last_identify() {
        Some(identify) if identify & 0x40 != 0 => {
            ringbuf_entry!(Trace::AskingReselect);
            phy.request_reselect(false);
        }
        _ => {
            let header = chip.start_read();
            chip.end_read();
            chip.advance_past_packet(header.next_packet);
            link.stats.note_dropped();
        }
    }
}

/// Drives a reselected transaction end to end: IDENTIFY, MESSAGE OUT,
/// then the packet-delivery loop, per spec.md §4.7 steps 1-4.
pub fn service_reselected<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
) {
    ringbuf_entry!(Trace::ReselectedReceiving);
    message_in(pins, phy, clock, timings, 0x81);

    let mut short_tx: u16 = message_out_post_rx(pins, phy, clock, timings);

    while phy.is_active() && (chip.packet_pending_line() || short_tx > 0) {
        if short_tx > 0 {
            ringbuf_entry!(Trace::ShortTxRequested(short_tx));
            send_packet(pins, phy, clock, timings, chip, link, short_tx);
            message_in(pins, phy, clock, timings, 0x04);
            phase_change(pins, phy, clock, timings, Phase::BusFree);
            short_tx = 0;
        } else {
            deliver_one_packet(pins, phy, clock, timings, chip, link);
            short_tx = message_out_post_rx(pins, phy, clock, timings);
        }
    }

    phy.clear_reselect_request();
    if phy.is_active() {
        message_in(pins, phy, clock, timings, 0x04);
        phase_change(pins, phy, clock, timings, Phase::BusFree);
    }
}

fn deliver_one_packet<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
) {
    let header = chip.start_read();

    let mut driver_header = [0u8; 19];
    driver_header[0] = if header.broadcast_or_multicast { 0x21 } else { 0x01 };
    driver_header[1] = link.rx_packet_id;
    link.rx_packet_id = link.rx_packet_id.wrapping_add(1);
    driver_header[2] = (header.length >> 8) as u8;
    driver_header[3] = header.length as u8;
    chip.read_bytes(&mut driver_header[4..19]);

    phase_change(pins, phy, clock, timings, Phase::DataIn);
    clock.delay_ticks(6);
    let _ = offer_bulk_checked(pins, false, &driver_header);

    let remaining = header.length.saturating_sub(15) as usize;
    let mut buf = [0u8; 64];
    let mut left = remaining;
    while left > 0 {
        let take = buf.len().min(left);
        chip.read_bytes(&mut buf[..take]);
        let sent = offer_bulk_checked(pins, false, &buf[..take]);
        left -= take;
        if sent < take {
            break;
        }
    }

    chip.end_read();
    chip.advance_past_packet(header.next_packet);
    link.stats.note_received();
}

/// Handles MESSAGE OUT immediately following a packet delivery, which
/// may be a plain NO OPERATION or the Nuvolink extended "short TX"
/// request. This proprietary extended-message format isn't part of
/// `drv-scsi-logic::message_out`'s repertoire, so it's parsed directly
/// here (mirroring `link_nuvo_message_out_post_rx`).
fn message_out_post_rx<P: PhyPins, C: Clock>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
) -> u16 {
    if !phy.is_active() {
        return 0;
    }
    phase_change(pins, phy, clock, timings, Phase::MessageOut);
    let message = ask_byte(pins);
    if message == 0x08 {
        return 0;
    }
    if message == 0x01 {
        let ext_len = ask_byte(pins);
        if ext_len == 3 {
            let ext_cmd = ask_byte(pins);
            if ext_cmd == 0xFF {
                let hi = ask_byte(pins);
                let lo = ask_byte(pins);
                return ((hi as u16) << 8) | lo as u16;
            }
            let _ = ask_byte(pins);
            let _ = ask_byte(pins);
        } else {
            let real_len = if ext_len == 0 { 256 } else { ext_len as u16 };
            for _ in 0..real_len {
                let _ = ask_byte(pins);
            }
        }
        phase_change(pins, phy, clock, timings, Phase::BusFree);
        return 0;
    }
    phase_change(pins, phy, clock, timings, Phase::BusFree);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::tests_support::MockChip;
    use drv_scsi_phy::pins::mock::MockPins;

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

    fn cdb(bytes: [u8; 10], len: u8) -> Cdb {
        Cdb { bytes, len, lun: 0 }
    }

    #[test]
    fn test_unit_ready_reports_good() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let phy = PhyState::new();
        phy.on_selected(0x01);
        let mut chip = MockChip::default();
        let mut link = LinkState::new([1, 2, 3, 4, 5, 6]);
        let c = cdb([0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0], 6);
        service(&mut pins, &phy, &mut FakeClock, &timings(), &mut chip, &mut link, &c);
        assert_eq!(phy.last_message_in(), 0x00);
    }

    #[test]
    fn reset_stats_clears_counters() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let phy = PhyState::new();
        phy.on_selected(0x01);
        let mut chip = MockChip::default();
        let mut link = LinkState::new([0u8; 6]);
        link.stats.note_sent();
        let c = cdb([0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0], 6);
        service(&mut pins, &phy, &mut FakeClock, &timings(), &mut chip, &mut link, &c);
        assert_eq!(link.stats, LinkStats::new());
    }

    #[test]
    fn check_rx_requests_reselect_when_privilege_granted() {
        let phy = PhyState::new();
        phy.on_selected(0x01);
        phy.set_last_identify(0xC0);
        let mut chip = MockChip::default();
        chip.queue_packet(&[0xAAu8; 20], false);
        let mut link = LinkState::new([0u8; 6]);
        check_rx(&mut chip, &phy, &mut link);
        assert!(phy.reselect_pending());
    }

    #[test]
    fn check_rx_drops_packet_without_disconnect_privilege() {
        let phy = PhyState::new();
        phy.on_selected(0x01);
        phy.set_last_identify(0x80);
        let mut chip = MockChip::default();
        chip.queue_packet(&[0xAAu8; 20], false);
        let mut link = LinkState::new([0u8; 6]);
        check_rx(&mut chip, &phy, &mut link);
        assert!(!phy.reselect_pending());
        assert_eq!(link.stats.packets_dropped, 1);
    }
}

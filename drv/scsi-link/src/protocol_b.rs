// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DaynaPort-compatible "pull" protocol, spec.md §4.7. Never reselects:
//! the initiator polls with GET MESSAGE on its own schedule.

use drv_scsi_logic::{data_in, data_out_dummy, message_in, request_sense, status, Cdb, Status};
use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_byte, phase_change};
use drv_scsi_phy::Phase;
use ringbuf::*;

use crate::chip::{ChipSink, NetChip, TxBuffer};
use crate::inquiry::INQUIRY_DATA_DAYNAPORT;
use crate::LinkState;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Opcode(u8),
    NoPacketsPending,
    PacketDropped,
    PacketDelivered(u16),
}
ringbuf!(Trace, 16, Trace::None);

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
/// for the DaynaPort protocol.
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
        0x00 | 0x0E => good(pins, phy, clock, timings),
        0x03 => {
            // Allocation is always force-set to 9 for this protocol.
            let mut forced = *cdb;
            forced.bytes[4] = 9;
            request_sense(pins, phy, clock, timings, &forced, &mut link.sense);
        }
        0x08 => get_message(pins, phy, clock, timings, chip, link, cdb),
        0x09 => {
            phase_change(pins, phy, clock, timings, Phase::DataIn);
            for &b in &link.mac_dyn {
                offer_byte(pins, b, false);
            }
            for _ in 0..12 {
                offer_byte(pins, 0x00, false);
            }
            if pins.is_asserted(Control::Atn) {
                drv_scsi_logic::message_out(pins, phy, clock, timings);
            }
            good(pins, phy, clock, timings);
        }
        0x0A => {
            let length = ((cdb.bytes[3] as u16) << 8) | cdb.bytes[4] as u16;
            let wrapped = cdb.bytes[5] == 0x80;
            if wrapped {
                data_out_dummy(pins, phy, clock, timings, 4);
            }
            send_packet(pins, phy, clock, timings, chip, link, length);
            if wrapped {
                data_out_dummy(pins, phy, clock, timings, 4);
            }
            good(pins, phy, clock, timings);
        }
        0x0C => {
            if cdb.bytes[5] == 0x40 {
                data_out_dummy(pins, phy, clock, timings, 6);
            }
            good(pins, phy, clock, timings);
        }
        0x0D => set_multicast_filter(pins, phy, clock, timings, chip, link, cdb),
        0x12 => inquiry(pins, phy, clock, timings, cdb),
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
    cdb: &Cdb,
) {
    let mut alloc = (((cdb.bytes[3] & 1) as usize) << 8) | cdb.bytes[4] as usize;
    if alloc > 255 {
        alloc = 255;
    }
    if alloc > 0 {
        data_in(pins, phy, clock, timings, &INQUIRY_DATA_DAYNAPORT[..alloc]);
    }
    status(pins, phy, clock, timings, Status::Good);
    message_in(pins, phy, clock, timings, 0x00);
}

fn set_multicast_filter<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
    cdb: &Cdb,
) {
    let alloc = ((cdb.bytes[3] as u16) << 8) | cdb.bytes[4] as u16;
    link.allow_atalk = false;
    phase_change(pins, phy, clock, timings, Phase::DataOut);
    for i in 0..alloc {
        let b = ask_byte(pins);
        if (i == 0 || i == 6 || i == 12) && b == 0x09 {
            link.allow_atalk = true;
        }
    }
    chip.set_multicast_filter(link.allow_atalk);
    good(pins, phy, clock, timings);
}

/// GET MESSAGE(6): the pull-model receive path, spec.md §4.7. Unlike
/// Protocol A this never reselects; the initiator simply polls.
fn get_message<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    link: &mut LinkState,
    cdb: &Cdb,
) {
    let allocation = ((cdb.bytes[3] as u16) << 8) | cdb.bytes[4] as u16;
    if allocation == 1 {
        status(pins, phy, clock, timings, Status::Good);
        message_in(pins, phy, clock, timings, 0x00);
        return;
    }

    let total_packets = chip.pending_packets();
    if total_packets == 0 {
        ringbuf_entry!(Trace::NoPacketsPending);
        phase_change(pins, phy, clock, timings, Phase::DataIn);
        for _ in 0..6 {
            offer_byte(pins, 0x00, false);
        }
        status(pins, phy, clock, timings, Status::Good);
        message_in(pins, phy, clock, timings, 0x00);
        return;
    }

    let mut remaining = total_packets;
    let mut found: Option<([u8; 6], u16, bool)> = None;
    while remaining > 0 {
        let header = chip.start_read();
        let mut dest = [0u8; 6];
        chip.read_bytes(&mut dest);

        let is_unicast = dest == link.mac_dyn;
        let is_broadcast = dest == [0xFFu8; 6];
        let is_appletalk = link.allow_atalk
            && dest[0] == 0x09
            && dest[1] == 0x00
            && dest[2] == 0x07
            && ((dest[3] == 0x00 && dest[4] == 0x00) || (dest[3] == 0xFF && dest[4] == 0xFF && dest[5] == 0xFF));

        if is_unicast || is_broadcast || is_appletalk {
            found = Some((dest, header.length, remaining > 1));
            chip.end_read();
            link.stats.note_received();
            deliver_found_packet(pins, phy, clock, timings, chip, &dest, header.length, remaining > 1, allocation);
            chip.advance_past_packet(header.next_packet);
            break;
        }

        chip.end_read();
        chip.advance_past_packet(header.next_packet);
        remaining -= 1;
    }

    if found.is_none() {
        ringbuf_entry!(Trace::PacketDropped);
        phase_change(pins, phy, clock, timings, Phase::DataIn);
        for _ in 0..6 {
            offer_byte(pins, 0x00, false);
        }
    }

    if pins.is_asserted(Control::Atn) {
        drv_scsi_logic::message_out(pins, phy, clock, timings);
    }
    status(pins, phy, clock, timings, Status::Good);
    message_in(pins, phy, clock, timings, 0x00);
}

fn deliver_found_packet<P: PhyPins, C: Clock, N: NetChip>(
    pins: &mut P,
    phy: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    chip: &mut N,
    dest: &[u8; 6],
    mut length: u16,
    more_pending: bool,
    allocation: u16,
) {
    if allocation > 6 && length > allocation - 6 {
        length = allocation - 6;
    }
    ringbuf_entry!(Trace::PacketDelivered(length));

    let mut preamble = [0u8; 6];
    preamble[0] = (length >> 8) as u8;
    preamble[1] = length as u8;
    preamble[5] = if more_pending { 0x10 } else { 0x00 };

    phase_change(pins, phy, clock, timings, Phase::DataIn);
    for &b in &preamble {
        offer_byte(pins, b, false);
    }
    clock.delay_ticks(1);
    for &b in dest {
        offer_byte(pins, b, false);
    }

    let body_len = length.saturating_sub(6) as usize;
    let mut buf = [0u8; 64];
    let mut left = body_len;
    while left > 0 {
        let take = buf.len().min(left);
        chip.read_bytes(&mut buf[..take]);
        for &b in &buf[..take] {
            offer_byte(pins, b, false);
        }
        left -= take;
    }
}

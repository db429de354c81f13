// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte transfer (REQ/ACK interlock) and phase-change transitions,
//! spec.md §4.1.
//!
//! Every function here is generic over [`PhyPins`] and [`Clock`] so the
//! same code runs against real silicon or against
//! [`crate::pins::mock::MockPins`] in a host-side test.

use media::{ByteSink, ByteSource, MediaError};

use crate::parity::odd_parity_bit;
use crate::phase::Phase;
use crate::pins::{Control, PhyPins};
use crate::state::PhyState;
use crate::timing::{ArbitrationTimings, Clock};

/// Target-to-initiator: drive one byte and wait for it to be taken.
/// Parity is computed and driven alongside the data whenever `parity`
/// is enabled for the bus (spec.md §4.1: "Outbound parity ... is always
/// generated on bytes this target drives onto the bus").
pub fn offer_byte<P: PhyPins>(pins: &mut P, byte: u8, parity_enabled: bool) {
    while pins.is_asserted(Control::Ack) {}
    let bit = if parity_enabled {
        Some(odd_parity_bit(byte))
    } else {
        None
    };
    pins.write_data(byte, bit);
    pins.assert(Control::Req);
    while !pins.is_asserted(Control::Ack) {}
    pins.deassert(Control::Req);
    pins.release_data();
}

/// Initiator-to-target: request and sample one byte. Inbound parity is
/// never checked (spec.md §4.1).
pub fn ask_byte<P: PhyPins>(pins: &mut P) -> u8 {
    while pins.is_asserted(Control::Ack) {}
    pins.assert(Control::Req);
    while !pins.is_asserted(Control::Ack) {}
    let byte = pins.read_data();
    pins.deassert(Control::Req);
    byte
}

/// Streams `len` bytes out of `source` and onto the bus, one REQ/ACK
/// handshake per byte, without ever materializing the whole transfer in
/// a buffer (spec.md §9: no intermediate SRAM bounce buffer). Pulled in
/// small chunks so the on-stack buffer stays bounded regardless of
/// transfer length.
pub fn offer_bulk<P: PhyPins, S: ByteSource>(
    pins: &mut P,
    parity_enabled: bool,
    source: &mut S,
    mut len: usize,
) -> Result<(), MediaError> {
    let mut chunk = [0u8; 64];
    while len > 0 {
        let take = chunk.len().min(len);
        source.take(&mut chunk[..take])?;
        for &b in &chunk[..take] {
            offer_byte(pins, b, parity_enabled);
        }
        len -= take;
    }
    Ok(())
}

/// Streams `len` bytes off the bus and into `sink`. Mirrors
/// [`offer_bulk`].
pub fn ask_bulk<P: PhyPins, K: ByteSink>(
    pins: &mut P,
    sink: &mut K,
    mut len: usize,
) -> Result<(), MediaError> {
    let mut chunk = [0u8; 64];
    while len > 0 {
        let take = chunk.len().min(len);
        for slot in chunk[..take].iter_mut() {
            *slot = ask_byte(pins);
        }
        sink.put(&chunk[..take])?;
        len -= take;
    }
    Ok(())
}

/// Like [`offer_bulk`], but polls ATN after every byte and returns early
/// (with the count of bytes actually transferred) if the initiator
/// raises it mid-stream. Used by the link-device handlers, which per
/// spec.md §4.7 must be able to interrupt a long DATA IN run.
pub fn offer_bulk_checked<P: PhyPins>(
    pins: &mut P,
    parity_enabled: bool,
    data: &[u8],
) -> usize {
    for (i, &b) in data.iter().enumerate() {
        if pins.is_asserted(Control::Atn) {
            return i;
        }
        offer_byte(pins, b, parity_enabled);
    }
    data.len()
}

/// Phase-change transition, spec.md §4.1's four-step rule: release the
/// data bus and wait for ACK to deassert, settle, drive the new
/// MSG/C/D/I/O combination (dropping BSY and clearing transaction state
/// if the new phase is BUS FREE), settle again. A change to the phase
/// already in effect is a no-op.
pub fn phase_change<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    new_phase: Phase,
) {
    if state.phase() == new_phase {
        return;
    }

    pins.release_data();
    pins.deassert(Control::Req);
    while pins.is_asserted(Control::Ack) {}
    clock.delay_ticks(timings.phase_settle_ticks);

    if new_phase.asserts_msg() {
        pins.assert(Control::Msg);
    } else {
        pins.deassert(Control::Msg);
    }
    if new_phase.asserts_cd() {
        pins.assert(Control::Cd);
    } else {
        pins.deassert(Control::Cd);
    }
    if new_phase.asserts_io() {
        pins.assert(Control::Io);
    } else {
        pins.deassert(Control::Io);
    }

    if new_phase == Phase::BusFree {
        pins.release_all();
        state.go_bus_free();
    } else {
        state.set_phase(new_phase);
    }

    clock.delay_ticks(timings.phase_settle_ticks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::mock::MockPins;
    use std::cell::Cell as StdCell;

    struct FakeClock {
        pub waited: StdCell<u64>,
    }

    impl Clock for FakeClock {
        fn now_ticks(&self) -> u64 {
            0
        }
        fn delay_ticks(&mut self, ticks: u64) {
            self.waited.set(self.waited.get() + ticks);
        }
    }

    fn timings() -> ArbitrationTimings {
        ArbitrationTimings {
            phase_settle_ticks: 4,
            bus_free_ticks: 8,
            bus_free_window_ticks: 10,
            arbitration_wait_ticks: 24,
            reselect_poll_ticks: 300,
            disconnect_delay_ticks: 50_000,
        }
    }

    #[test]
    fn offer_byte_asserts_req_and_waits_for_ack() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        offer_byte(&mut pins, 0x42, true);
        assert!(!pins.req.get());
        assert!(!pins.ack.get());
        assert!(!pins.data_driven.get());
        assert_eq!(pins.data.get(), 0x42);
    }

    #[test]
    fn ask_byte_returns_sampled_data() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x7e);
        let byte = ask_byte(&mut pins);
        assert_eq!(byte, 0x7e);
        assert!(!pins.req.get());
    }

    #[test]
    fn phase_change_same_phase_is_noop() {
        let mut pins = MockPins::default();
        let state = PhyState::new();
        state.on_selected(0x01);
        let mut clock = FakeClock {
            waited: StdCell::new(0),
        };
        phase_change(&mut pins, &state, &mut clock, &timings(), Phase::DataOut);
        assert_eq!(clock.waited.get(), 0);
    }

    #[test]
    fn phase_change_to_command_sets_cd() {
        let mut pins = MockPins::default();
        let state = PhyState::new();
        state.on_selected(0x01);
        let mut clock = FakeClock {
            waited: StdCell::new(0),
        };
        phase_change(
            &mut pins,
            &state,
            &mut clock,
            &timings(),
            Phase::Command,
        );
        assert!(pins.cd.get());
        assert!(!pins.io.get());
        assert!(!pins.msg.get());
        assert_eq!(state.phase(), Phase::Command);
        assert_eq!(clock.waited.get(), 8);
    }

    #[test]
    fn phase_change_to_bus_free_clears_active() {
        let mut pins = MockPins::default();
        let state = PhyState::new();
        state.on_selected(0x01);
        pins.bsy.set(true);
        let mut clock = FakeClock {
            waited: StdCell::new(0),
        };
        phase_change(
            &mut pins,
            &state,
            &mut clock,
            &timings(),
            Phase::BusFree,
        );
        assert!(!state.is_active());
        assert!(!pins.bsy.get());
    }

    #[test]
    fn offer_bulk_checked_stops_on_atn() {
        let mut pins = MockPins::default();
        pins.atn.set(true);
        let sent = offer_bulk_checked(&mut pins, false, &[1, 2, 3]);
        assert_eq!(sent, 0);
    }

    struct VecSource(std::vec::Vec<u8>, usize);
    impl ByteSource for VecSource {
        fn take(&mut self, buf: &mut [u8]) -> Result<(), MediaError> {
            let end = self.1 + buf.len();
            buf.copy_from_slice(&self.0[self.1..end]);
            self.1 = end;
            Ok(())
        }
    }

    struct VecSink(std::vec::Vec<u8>);
    impl ByteSink for VecSink {
        fn put(&mut self, data: &[u8]) -> Result<(), MediaError> {
            self.0.extend_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn offer_bulk_streams_every_byte() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let data: std::vec::Vec<u8> = (0u8..200).collect();
        let mut source = VecSource(data, 0);
        offer_bulk(&mut pins, false, &mut source, 200).unwrap();
        assert_eq!(source.1, 200);
    }

    #[test]
    fn ask_bulk_collects_every_byte() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x55);
        let mut sink = VecSink(std::vec::Vec::new());
        ask_bulk(&mut pins, &mut sink, 130).unwrap();
        assert_eq!(sink.0.len(), 130);
        assert!(sink.0.iter().all(|&b| b == 0x55));
    }
}

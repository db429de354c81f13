// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DATA OUT / DATA IN phases, spec.md §4.3.
//!
//! Device handlers reach for [`drv_scsi_phy::transfer::offer_bulk`] /
//! `ask_bulk` directly for large, media-backed transfers so bytes never
//! bounce through an intermediate buffer; these helpers cover the small,
//! fixed-size exchanges logic-level code needs (mode parameter lists,
//! canned INQUIRY/sense responses, and the like).

use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_byte, phase_change};
use drv_scsi_phy::Phase;

use crate::message::message_out;

/// Reads `buf.len()` bytes from the initiator. Returns the number of
/// bytes actually read; a short read signals the bus went away mid
/// transfer.
pub fn data_out<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    buf: &mut [u8],
) -> usize {
    if !state.is_active() {
        return 0;
    }
    phase_change(pins, state, clock, timings, Phase::DataOut);
    let mut n = 0;
    for slot in buf.iter_mut() {
        *slot = ask_byte(pins);
        n += 1;
    }
    if pins.is_asserted(Control::Atn) {
        message_out(pins, state, clock, timings);
    }
    n
}

/// As [`data_out`], but discards the bytes. Used to satisfy a transfer
/// length this target has no use for (e.g. a MODE SELECT parameter list
/// for a page it ignores).
pub fn data_out_dummy<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    len: u16,
) {
    if !state.is_active() {
        return;
    }
    phase_change(pins, state, clock, timings, Phase::DataOut);
    for _ in 0..len {
        let _ = ask_byte(pins);
    }
    if pins.is_asserted(Control::Atn) {
        message_out(pins, state, clock, timings);
    }
}

/// Sends `data` to the initiator.
pub fn data_in<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    data: &[u8],
) {
    if !state.is_active() {
        return;
    }
    phase_change(pins, state, clock, timings, Phase::DataIn);
    for &b in data {
        offer_byte(pins, b, false);
    }
    if pins.is_asserted(Control::Atn) {
        message_out(pins, state, clock, timings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn data_out_reads_requested_length() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.feed.borrow_mut().extend([1u8, 2, 3, 4]);
        let state = PhyState::new();
        state.on_selected(0x01);
        let mut buf = [0u8; 4];
        let n = data_out(&mut pins, &state, &mut FakeClock, &timings(), &mut buf);
        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn data_in_sends_every_byte() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        data_in(&mut pins, &state, &mut FakeClock, &timings(), &[9, 8, 7]);
        assert_eq!(state.phase(), Phase::DataIn);
    }
}

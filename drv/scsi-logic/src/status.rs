// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STATUS phase, spec.md §4.3.

use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{offer_byte, phase_change};
use drv_scsi_phy::Phase;

use crate::message::message_out;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Status {
    Good = 0x00,
    CheckCondition = 0x02,
    Busy = 0x08,
}

/// Enters STATUS and sends the given code, then handles a trailing
/// MESSAGE OUT if the initiator raises /ATN immediately after (spec.md
/// §4.3, matching the original's fold-in of stray attention checks).
pub fn status<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    code: Status,
) {
    if !state.is_active() {
        return;
    }
    phase_change(pins, state, clock, timings, Phase::Status);
    offer_byte(pins, code as u8, false);
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
    fn status_sends_code_without_atn() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        status(&mut pins, &state, &mut FakeClock, &timings(), Status::Good);
        assert_eq!(state.phase(), Phase::Status);
    }

    #[test]
    fn status_is_noop_when_inactive() {
        let mut pins = MockPins::default();
        let state = PhyState::new();
        status(&mut pins, &state, &mut FakeClock, &timings(), Status::Good);
        assert!(!pins.req.get());
    }
}

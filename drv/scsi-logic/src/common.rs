// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operation handlers shared by every device kind, spec.md §4.3/§4.4.

use drv_scsi_phy::pins::PhyPins;
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};

use crate::command::Cdb;
use crate::data::{data_in, data_out_dummy};
use crate::message::message_in;
use crate::sense::{Sense, NO_SENSE_RECORDED};
use crate::status::{status, Status};

/// REQUEST SENSE: hands back the pending sense data (clearing it) or a
/// canned all-zero "no sense" response, then GOOD/COMMAND COMPLETE.
pub fn request_sense<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    cdb: &Cdb,
    sense: &mut Sense,
) {
    let alloc = (cdb.bytes[4] as usize).min(18);
    if sense.is_valid() {
        data_in(pins, state, clock, timings, &sense.bytes()[..alloc]);
        sense.clear();
    } else {
        data_in(pins, state, clock, timings, &NO_SENSE_RECORDED[..alloc]);
    }
    status(pins, state, clock, timings, Status::Good);
    message_in(pins, state, clock, timings, 0x00);
}

/// SEND DIAGNOSTIC: accepts and discards any parameter list, then
/// unconditionally reports GOOD. This target performs no actual
/// self-test (spec.md §4.4 Non-goals).
pub fn send_diagnostic<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    cdb: &Cdb,
) {
    let param_len = u16::from_be_bytes([cdb.bytes[3], cdb.bytes[4]]);
    if param_len > 0 {
        data_out_dummy(pins, state, clock, timings, param_len);
    }
    status(pins, state, clock, timings, Status::Good);
    message_in(pins, state, clock, timings, 0x00);
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

    fn cdb(bytes: [u8; 10], len: u8) -> Cdb {
        Cdb { bytes, len, lun: 0 }
    }

    #[test]
    fn request_sense_clears_after_delivery() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        let mut sense = Sense::new();
        sense.illegal_op();
        let c = cdb([0x03, 0, 0, 0, 18, 0, 0, 0, 0, 0], 6);
        request_sense(&mut pins, &state, &mut FakeClock, &timings(), &c, &mut sense);
        assert!(!sense.is_valid());
    }

    #[test]
    fn send_diagnostic_with_zero_param_list_just_reports_good() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        let c = cdb([0x1D, 0, 0, 0, 0, 0, 0, 0, 0, 0], 6);
        send_diagnostic(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert_eq!(state.last_message_in(), 0x00);
    }
}

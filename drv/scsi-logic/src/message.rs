// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MESSAGE OUT / MESSAGE IN handling, spec.md §4.3.
//!
//! `message_out` implements the small, fixed repertoire of messages this
//! target understands: everything else gets MESSAGE REJECT. It is meant
//! to be called unconditionally at the tail of any phase handler while
//! /ATN stays asserted, and is also reachable directly (e.g. to send
//! COMMAND COMPLETE).

use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_byte, phase_change};
use drv_scsi_phy::Phase;
use ringbuf::*;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ControlMessage {
    CommandComplete = 0x00,
    Disconnect = 0x04,
    InitiatorDetectedError = 0x05,
    Abort = 0x06,
    Reject = 0x07,
    NoOperation = 0x08,
    ParityError = 0x09,
    BusDeviceReset = 0x0C,
}

impl ControlMessage {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::CommandComplete,
            0x04 => Self::Disconnect,
            0x05 => Self::InitiatorDetectedError,
            0x06 => Self::Abort,
            0x07 => Self::Reject,
            0x08 => Self::NoOperation,
            0x09 => Self::ParityError,
            0x0C => Self::BusDeviceReset,
            _ => return None,
        })
    }
}

/// Outcome of a MESSAGE OUT exchange, telling the caller what (if
/// anything) it needs to do next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Handled entirely internally (e.g. NO OPERATION, a resent MESSAGE
    /// IN after MESSAGE PARITY ERROR); the caller should proceed as if
    /// nothing happened.
    Continue,
    /// The bus has already gone BUS FREE (ABORT, REJECT, an illegal
    /// IDENTIFY change, or the device-local end of a DISCONNECT/INITIATOR
    /// DETECTED ERROR handshake). The caller must stop the transaction.
    BusFree,
    /// BUS DEVICE RESET was received. The real hardware's behavior here
    /// is a full MCU reset; callers that can't perform one should at
    /// least treat this like `BusFree`.
    BusDeviceReset,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Received(u8),
    Unsupported(u8),
}
ringbuf!(Trace, 16, Trace::None);

/// Unconditionally enters MESSAGE OUT and processes messages until
/// /ATN is released (spec.md §4.3). Updates `state`'s last-IDENTIFY and
/// last-MESSAGE-IN tracking as a side effect.
pub fn message_out<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
) -> Outcome {
    if !state.is_active() {
        return Outcome::BusFree;
    }

    loop {
        phase_change(pins, state, clock, timings, Phase::MessageOut);
        let byte = ask_byte(pins);
        ringbuf_entry!(Trace::Received(byte));

        if byte < 0x80 {
            match ControlMessage::from_byte(byte) {
                Some(ControlMessage::Abort) => {
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusFree;
                }
                Some(ControlMessage::BusDeviceReset) => {
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusDeviceReset;
                }
                Some(ControlMessage::Disconnect) => {
                    send_message_in(pins, state, clock, timings, 0x04);
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusFree;
                }
                Some(ControlMessage::InitiatorDetectedError) => {
                    send_message_in(pins, state, clock, timings, 0x04);
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusFree;
                }
                Some(ControlMessage::ParityError) => {
                    let resend = state.last_message_in();
                    send_message_in(pins, state, clock, timings, resend);
                }
                Some(ControlMessage::Reject) => {
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusFree;
                }
                Some(ControlMessage::NoOperation) => {}
                Some(ControlMessage::CommandComplete) | None => {
                    ringbuf_entry!(Trace::Unsupported(byte));
                    send_message_in(pins, state, clock, timings, ControlMessage::Reject as u8);
                }
            }
        } else {
            // IDENTIFY: reject reserved-bit combinations or target
            // routine requests (bits 0x38); otherwise latch the LUN
            // unless one is already latched and disagrees (illegal).
            if byte & 0x38 != 0 {
                send_message_in(pins, state, clock, timings, ControlMessage::Reject as u8);
            } else if let Some(prior) = state.last_identify() {
                if (prior & 0x07) != (byte & 0x07) {
                    phase_change(pins, state, clock, timings, Phase::BusFree);
                    return Outcome::BusFree;
                }
            } else {
                state.set_last_identify(byte);
            }
        }

        if !(state.is_active() && pins.is_asserted(Control::Atn)) {
            break;
        }
    }
    Outcome::Continue
}

/// Enters MESSAGE IN and sends one byte, recursing into
/// [`message_out`] if /ATN comes up immediately after (spec.md §4.3).
pub fn message_in<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    message: u8,
) {
    if !state.is_active() {
        return;
    }
    send_message_in(pins, state, clock, timings, message);
    if pins.is_asserted(Control::Atn) {
        message_out(pins, state, clock, timings);
    }
}

fn send_message_in<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    message: u8,
) {
    phase_change(pins, state, clock, timings, Phase::MessageIn);
    state.set_last_message_in(message);
    offer_byte(pins, message, false);
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn no_operation_continues() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x08);
        let state = PhyState::new();
        state.on_selected(0x01);
        let outcome = message_out(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(outcome, Outcome::Continue);
        assert!(state.is_active());
    }

    #[test]
    fn abort_goes_bus_free() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x06);
        let state = PhyState::new();
        state.on_selected(0x01);
        let outcome = message_out(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(outcome, Outcome::BusFree);
        assert!(!state.is_active());
    }

    #[test]
    fn identify_latches_lun() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x82); // IDENTIFY, LUN 2
        let state = PhyState::new();
        state.on_selected(0x01);
        let outcome = message_out(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(state.last_identify(), Some(0x82));
    }

    #[test]
    fn identify_changing_lun_goes_bus_free() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        state.set_last_identify(0x81);
        pins.data.set(0x82);
        let outcome = message_out(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(outcome, Outcome::BusFree);
    }

    #[test]
    fn unsupported_message_is_rejected_then_continues() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.data.set(0x23); // not one we handle, not IDENTIFY
        let state = PhyState::new();
        state.on_selected(0x01);
        let outcome = message_out(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(state.last_message_in(), ControlMessage::Reject as u8);
    }
}

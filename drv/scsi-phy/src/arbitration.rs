// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arbitration and (re)selection, spec.md §4.2.
//!
//! Selection is detected by the target passively: the initiator does
//! all the arbitrating and asserts our ID bit plus SEL. That path is a
//! fast, interrupt-driven one-shot ([`selected`]) and lives mostly in
//! `state::PhyState::on_selected`.
//!
//! Reselection is the target's own job: this module owns the state
//! machine that waits for bus-free, arbitrates for the bus against any
//! other initiator activity, and asserts the initiator's ID bit plus
//! our own, per the timing windows in [`ArbitrationTimings`].

use crate::phase::Phase;
use crate::pins::{Control, PhyPins};
use crate::state::PhyState;
use crate::timing::{ArbitrationTimings, Clock};

/// Fast path for the selection interrupt: called once BSY and SEL are
/// both observed asserted with our ID bit set on the data bus. Per
/// spec.md §4.2, the target asserts BSY in response and the bus enters
/// DATA OUT.
pub fn selected<P: PhyPins>(pins: &mut P, state: &PhyState, our_mask: u8) {
    pins.assert(Control::Bsy);
    state.on_selected(our_mask);
}

/// True if the data bus (sampled during a SEL-asserted window) carries
/// exactly our ID bit and the initiator's, i.e. this is a selection
/// addressed to us rather than another target.
pub fn selection_matches(data: u8, our_mask: u8) -> bool {
    data & our_mask != 0
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReselectState {
    /// Waiting for a reselection to be requested by the main loop (a
    /// disconnected transaction with a deferred I/O wants to resume).
    Idle,
    /// Observed the bus go free; waiting out the minimum free period
    /// before arbitrating.
    AwaitingBusFree { since_ticks: u64 },
    /// Within the arbitration wait, BSY and our ID bit are asserted;
    /// waiting for the wait period to elapse before sampling for a
    /// higher-priority contender.
    Arbitrating { started_ticks: u64 },
    /// Won arbitration; asserting SEL, our ID, the initiator's ID and
    /// I/O, waiting for the initiator to answer with its own BSY.
    Reselecting { started_ticks: u64 },
    /// Initiator answered; BSY asserted by us is/was released as the
    /// handshake concludes and MESSAGE IN (IDENTIFY) begins.
    Won,
    /// The initiator didn't respond within the poll window; back off to
    /// idle and let the main loop retry later (spec.md §4.2: reselection
    /// can be deferred and retried).
    TimedOut,
}

/// Drives the reselection state machine one step. `initiator_mask` is
/// the initiator to be reselected (bit set in the last disconnect's
/// IDENTIFY) and `our_mask` is this target's own ID bit; SCSI
/// reselection asserts both simultaneously on the data bus.
pub struct Reselector {
    state: ReselectState,
}

impl Reselector {
    pub const fn new() -> Self {
        Self {
            state: ReselectState::Idle,
        }
    }

    pub fn state(&self) -> ReselectState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = ReselectState::Idle;
    }

    /// Moves an idle state machine into `AwaitingBusFree`. Called by the
    /// main loop once it sees `PhyState::reselect_pending` and the
    /// machine isn't already running one attempt (spec.md §4.2: "a
    /// disconnected transaction with a deferred I/O wants to resume").
    /// A no-op if a reselection attempt is already underway.
    pub fn begin(&mut self, now_ticks: u64) {
        if matches!(self.state, ReselectState::Idle) {
            self.state = ReselectState::AwaitingBusFree {
                since_ticks: now_ticks,
            };
        }
    }

    /// Advances the state machine by one poll. Returns `true` once
    /// `ReselectState::Won` is reached (the caller should then drive
    /// `PhyState::on_reselected` and move to MESSAGE IN to send
    /// IDENTIFY).
    pub fn step<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        clock: &mut C,
        timings: &ArbitrationTimings,
        our_mask: u8,
        initiator_mask: u8,
    ) -> bool {
        let now = clock.now_ticks();
        match self.state {
            ReselectState::Idle => false,
            ReselectState::AwaitingBusFree { since_ticks } => {
                if pins.is_asserted(Control::Bsy) || pins.is_asserted(Control::Sel) {
                    // Bus went busy again before our free window
                    // elapsed; restart the observation.
                    self.state = ReselectState::AwaitingBusFree { since_ticks: now };
                    return false;
                }
                if now.saturating_sub(since_ticks) >= timings.bus_free_ticks {
                    pins.assert(Control::Bsy);
                    pins.write_data(our_mask, None);
                    self.state = ReselectState::Arbitrating { started_ticks: now };
                }
                false
            }
            ReselectState::Arbitrating { started_ticks } => {
                if now.saturating_sub(started_ticks) < timings.arbitration_wait_ticks {
                    return false;
                }
                let winner = pins.read_data();
                if winner != our_mask {
                    // Someone of higher priority is also arbitrating;
                    // back off entirely and let the main loop retry.
                    pins.release_data();
                    pins.deassert(Control::Bsy);
                    self.state = ReselectState::TimedOut;
                    return false;
                }
                pins.assert(Control::Sel);
                pins.write_data(our_mask | initiator_mask, None);
                pins.assert(Control::Io);
                self.state = ReselectState::Reselecting { started_ticks: now };
                false
            }
            ReselectState::Reselecting { started_ticks } => {
                if initiator_answered(pins) {
                    pins.deassert(Control::Sel);
                    pins.release_data();
                    self.state = ReselectState::Won;
                    return true;
                }
                if now.saturating_sub(started_ticks) >= timings.reselect_poll_ticks {
                    pins.deassert(Control::Bsy);
                    pins.deassert(Control::Sel);
                    pins.deassert(Control::Io);
                    pins.release_data();
                    self.state = ReselectState::TimedOut;
                }
                false
            }
            ReselectState::Won | ReselectState::TimedOut => false,
        }
    }

    pub fn retry(&mut self) {
        if matches!(self.state, ReselectState::TimedOut) {
            self.state = ReselectState::Idle;
        }
    }
}

impl Default for Reselector {
    fn default() -> Self {
        Self::new()
    }
}

/// The initiator answers a reselection by asserting its own BSY once it
/// has sampled SEL and its ID bit; we keep asserting BSY ourselves until
/// that happens, then hand off (spec.md §4.2).
fn initiator_answered<P: PhyPins>(pins: &P) -> bool {
    pins.is_asserted(Control::Bsy) && pins.is_asserted(Control::Sel)
}

/// Call after a successful reselection handoff to put the PHY into
/// MESSAGE IN with `active`/`continued` set, matching the state an
/// initial SELECTION leaves (spec.md §4.2, §5).
pub fn complete_reselection(state: &PhyState, our_mask: u8) {
    state.on_reselected(our_mask);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::mock::MockPins;
    use std::cell::Cell as StdCell;

    struct FakeClock {
        now: StdCell<u64>,
    }

    impl Clock for FakeClock {
        fn now_ticks(&self) -> u64 {
            self.now.get()
        }
        fn delay_ticks(&mut self, ticks: u64) {
            self.now.set(self.now.get() + ticks);
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
    fn selected_asserts_bsy_and_marks_active() {
        let mut pins = MockPins::default();
        let state = PhyState::new();
        selected(&mut pins, &state, 0x04);
        assert!(pins.bsy.get());
        assert!(state.is_active());
        assert_eq!(state.phase(), Phase::DataOut);
    }

    #[test]
    fn selection_matches_checks_our_bit() {
        assert!(selection_matches(0x84, 0x04));
        assert!(!selection_matches(0x82, 0x04));
    }

    #[test]
    fn reselector_runs_the_full_happy_path() {
        let mut pins = MockPins::default();
        let mut clock = FakeClock {
            now: StdCell::new(0),
        };
        let t = timings();
        let mut r = Reselector::new();
        r.start();
        r.state = ReselectState::AwaitingBusFree { since_ticks: 0 };

        // Not yet past the bus-free window.
        clock.now.set(4);
        assert!(!r.step(&mut pins, &mut clock, &t, 0x04, 0x01));
        assert!(matches!(r.state(), ReselectState::AwaitingBusFree { .. }));

        // Past the window: arbitration begins.
        clock.now.set(8);
        assert!(!r.step(&mut pins, &mut clock, &t, 0x04, 0x01));
        assert!(matches!(r.state(), ReselectState::Arbitrating { .. }));
        assert!(pins.bsy.get());

        // Not yet past the arbitration wait.
        clock.now.set(10);
        assert!(!r.step(&mut pins, &mut clock, &t, 0x04, 0x01));
        assert!(matches!(r.state(), ReselectState::Arbitrating { .. }));

        // Past the wait, we win (data bus still shows only our bit).
        clock.now.set(32);
        assert!(!r.step(&mut pins, &mut clock, &t, 0x04, 0x01));
        assert!(matches!(r.state(), ReselectState::Reselecting { .. }));
        assert!(pins.sel.get());
        assert!(pins.io.get());

        // Initiator answers.
        pins.bsy.set(true);
        assert!(r.step(&mut pins, &mut clock, &t, 0x04, 0x01));
        assert_eq!(r.state(), ReselectState::Won);
        assert!(!pins.sel.get());
    }

    #[test]
    fn reselector_loses_arbitration_to_higher_priority() {
        let mut pins = MockPins::default();
        let mut clock = FakeClock {
            now: StdCell::new(0),
        };
        let t = timings();
        let mut r = Reselector::new();
        r.state = ReselectState::Arbitrating { started_ticks: 0 };
        clock.now.set(24);
        pins.data.set(0x84); // someone else also won bits
        r.step(&mut pins, &mut clock, &t, 0x04, 0x01);
        assert_eq!(r.state(), ReselectState::TimedOut);
        assert!(!pins.bsy.get());
    }

    #[test]
    fn reselector_times_out_when_initiator_never_answers() {
        let mut pins = MockPins::default();
        let mut clock = FakeClock {
            now: StdCell::new(0),
        };
        let t = timings();
        let mut r = Reselector::new();
        r.state = ReselectState::Reselecting { started_ticks: 0 };
        clock.now.set(300);
        r.step(&mut pins, &mut clock, &t, 0x04, 0x01);
        assert_eq!(r.state(), ReselectState::TimedOut);
        r.retry();
        assert_eq!(r.state(), ReselectState::Idle);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide PHY state (spec.md §3, §5).
//!
//! The fields the selection/arbitration interrupt handlers touch live
//! behind a `critical_section::Mutex`; everything else is plain
//! `Cell`/`RefCell` state that only the main loop's transaction handling
//! ever reaches, matching the ownership split spec.md §5 describes: "a
//! selection cannot legally occur while the target is already active."

use core::cell::Cell;
use critical_section::Mutex;
use ringbuf::*;

use crate::phase::Phase;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Selected(u8),
    Reselected(u8),
    BusFree,
    HardReset,
}
ringbuf!(Trace, 32, Trace::None);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IsrFields {
    pub active: bool,
    pub continued: bool,
    pub active_target_mask: u8,
}

impl Default for IsrFields {
    fn default() -> Self {
        Self {
            active: false,
            continued: false,
            active_target_mask: 0,
        }
    }
}

pub struct PhyState {
    isr: Mutex<Cell<IsrFields>>,
    phase: Cell<Phase>,
    reselect_pending: Cell<bool>,
    reselect_parity: Cell<bool>,
    last_identify: Cell<Option<u8>>,
    last_message_in: Cell<u8>,
}

impl Default for PhyState {
    fn default() -> Self {
        Self::new()
    }
}

impl PhyState {
    pub const fn new() -> Self {
        Self {
            isr: Mutex::new(Cell::new(IsrFields {
                active: false,
                continued: false,
                active_target_mask: 0,
            })),
            phase: Cell::new(Phase::BusFree),
            reselect_pending: Cell::new(false),
            reselect_parity: Cell::new(false),
            last_identify: Cell::new(None),
            last_message_in: Cell::new(0),
        }
    }

    // -- ISR-side mutation: called only from the BSY-falling-edge and
    // reselection-won interrupt paths. --

    /// Called from the selection interrupt when our ID bit was matched.
    /// Enters the legal initial phase after SELECTION: DATA OUT with
    /// MSG/C/D/I/O all released (spec.md §4.2).
    pub fn on_selected(&self, target_mask: u8) {
        critical_section::with(|cs| {
            self.isr.borrow(cs).set(IsrFields {
                active: true,
                continued: false,
                active_target_mask: target_mask,
            });
        });
        self.phase.set(Phase::DataOut);
        ringbuf_entry!(Trace::Selected(target_mask));
    }

    /// Called from the reselection-won interrupt path. Enters MESSAGE IN,
    /// the first phase after a successful reselection (spec.md §4.2).
    pub fn on_reselected(&self, target_mask: u8) {
        critical_section::with(|cs| {
            self.isr.borrow(cs).set(IsrFields {
                active: true,
                continued: true,
                active_target_mask: target_mask,
            });
        });
        self.phase.set(Phase::MessageIn);
        self.reselect_pending.set(false);
        ringbuf_entry!(Trace::Reselected(target_mask));
    }

    /// Called by the RST ISR (and, redundantly, by the main loop on
    /// bus-free) to tear everything down.
    pub fn hard_reset(&self) {
        critical_section::with(|cs| {
            self.isr.borrow(cs).set(IsrFields::default());
        });
        self.phase.set(Phase::BusFree);
        self.reselect_pending.set(false);
        self.reselect_parity.set(false);
        self.last_identify.set(None);
        self.last_message_in.set(0);
        ringbuf_entry!(Trace::HardReset);
    }

    // -- main-loop-side accessors --

    pub fn is_active(&self) -> bool {
        critical_section::with(|cs| self.isr.borrow(cs).get().active)
    }

    pub fn is_continued(&self) -> bool {
        critical_section::with(|cs| self.isr.borrow(cs).get().continued)
    }

    pub fn active_target_mask(&self) -> u8 {
        critical_section::with(|cs| self.isr.borrow(cs).get().active_target_mask)
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.set(phase);
    }

    /// Transition to bus-free: releases the transaction. Per spec.md §3,
    /// this clears `active` and resets per-transaction state.
    pub fn go_bus_free(&self) {
        critical_section::with(|cs| {
            let mut f = self.isr.borrow(cs).get();
            f.active = false;
            f.continued = false;
            self.isr.borrow(cs).set(f);
        });
        self.phase.set(Phase::BusFree);
        self.last_identify.set(None);
        ringbuf_entry!(Trace::BusFree);
    }

    pub fn last_identify(&self) -> Option<u8> {
        self.last_identify.get()
    }

    pub fn set_last_identify(&self, byte: u8) {
        self.last_identify.set(Some(byte));
    }

    pub fn last_message_in(&self) -> u8 {
        self.last_message_in.get()
    }

    pub fn set_last_message_in(&self, byte: u8) {
        self.last_message_in.set(byte);
    }

    pub fn request_reselect(&self, parity: bool) {
        self.reselect_pending.set(true);
        self.reselect_parity.set(parity);
    }

    pub fn reselect_pending(&self) -> bool {
        self.reselect_pending.get()
    }

    pub fn reselect_parity(&self) -> bool {
        self.reselect_parity.get()
    }

    pub fn clear_reselect_request(&self) {
        self.reselect_pending.set(false);
    }
}

// Safety: every field is either behind `critical_section::Mutex` or is
// only ever touched from the single-threaded main loop; interrupts never
// touch the plain `Cell` fields (spec.md §5).
unsafe impl Sync for PhyState {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_sets_active_and_initial_phase() {
        let s = PhyState::new();
        s.on_selected(0x01);
        assert!(s.is_active());
        assert!(!s.is_continued());
        assert_eq!(s.phase(), Phase::DataOut);
    }

    #[test]
    fn bus_free_clears_active() {
        let s = PhyState::new();
        s.on_selected(0x01);
        s.go_bus_free();
        assert!(!s.is_active());
        assert_eq!(s.phase(), Phase::BusFree);
    }

    #[test]
    fn reselection_sets_continued_and_message_in() {
        let s = PhyState::new();
        s.on_reselected(0x04);
        assert!(s.is_active());
        assert!(s.is_continued());
        assert_eq!(s.phase(), Phase::MessageIn);
    }
}

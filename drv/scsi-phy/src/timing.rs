// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timer abstractions shared by phase transitions and the arbitration
//! engine. Durations are expressed in the board's own timer ticks rather
//! than hardcoded cycle counts, following the `lib/multitimer` pattern
//! of parameterizing deadlines over a HAL timer frequency instead of
//! baking in a particular MCU clock.

/// A free-running monotonic tick counter and a busy-wait primitive. A
/// board implements this once over its timer peripheral; every duration
/// elsewhere in this crate is expressed in ticks of this clock.
pub trait Clock {
    fn now_ticks(&self) -> u64;
    /// Busy-waits (or sleeps, if the board has something better) until
    /// `ticks` have elapsed.
    fn delay_ticks(&mut self, ticks: u64);
}

/// Per-board tick thresholds for the timing constants in spec.md §4.1
/// and §4.2. A board computes these once from its timer frequency.
#[derive(Copy, Clone, Debug)]
pub struct ArbitrationTimings {
    /// ≥400ns settle time around phase changes.
    pub phase_settle_ticks: u64,
    /// ≥800ns of observed bus-free before arbitration may begin.
    pub bus_free_ticks: u64,
    /// ≤1µs window after bus-free in which arbitration must start.
    pub bus_free_window_ticks: u64,
    /// ~2.4µs arbitration wait before sampling the data bus.
    pub arbitration_wait_ticks: u64,
    /// ~30µs granularity for polling the initiator's BSY response.
    pub reselect_poll_ticks: u64,
    /// ~5ms minimum delay after DISCONNECT before attempting reselection.
    pub disconnect_delay_ticks: u64,
}

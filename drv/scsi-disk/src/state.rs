// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disk subsystem readiness, spec.md §4.4.

/// Mirrors the original firmware's three-state device lifecycle: not yet
/// initialized (no backing file/card range available yet), initialized
/// and serving commands normally, or wedged after an I/O failure.
///
/// Per spec.md §4.4, only REQUEST SENSE and INQUIRY are answered outside
/// `Ok` — everything else is refused with CHECK CONDITION, carrying a
/// sense key that tells the initiator whether the volume is still coming
/// up (`NotReady`/becoming-ready) or has failed outright
/// (`HardwareError`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiskState {
    NoInit,
    Ok,
    Error,
}

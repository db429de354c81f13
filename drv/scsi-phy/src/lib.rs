// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus PHY: phase encoding, the REQ/ACK byte-transfer interlock, and the
//! arbitration/(re)selection engine (spec.md §4.1, §4.2).
//!
//! This crate only knows about SCSI bus electrical semantics. It has no
//! idea what a CDB is; that starts one layer up, in `drv-scsi-logic`.

#![cfg_attr(not(test), no_std)]

pub mod arbitration;
pub mod parity;
pub mod phase;
pub mod pins;
pub mod state;
pub mod timing;
pub mod transfer;

pub use arbitration::{selected, selection_matches, ReselectState, Reselector};
pub use parity::odd_parity_bit;
pub use phase::Phase;
pub use pins::{BitOrder, Control, Inverting, LatchedOutput, NoLatch, NonInverting, PhyPins, Polarity, Reversed, Straight};
pub use state::PhyState;
pub use timing::{ArbitrationTimings, Clock};
pub use transfer::{ask_bulk, ask_byte, offer_bulk, offer_bulk_checked, offer_byte, phase_change};

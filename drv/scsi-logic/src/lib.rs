// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logical bus operations shared by every device kind: MESSAGE OUT/IN,
//! COMMAND framing and LUN resolution, STATUS, DATA OUT/IN, sense data,
//! and the handful of operations (REQUEST SENSE, SEND DIAGNOSTIC) that
//! look identical regardless of what's behind the target ID (spec.md
//! §4.3, §4.4).
//!
//! `drv-scsi-disk`, `drv-scsi-optical`, and `drv-scsi-link` build on top
//! of this; nothing here knows about block devices, optical media, or
//! Ethernet.

#![cfg_attr(not(test), no_std)]

pub mod command;
pub mod common;
pub mod data;
pub mod message;
pub mod sense;
pub mod status;

pub use command::{
    parse_data_op, read_command, Cdb, CommandOutcome, DataOp, IllegalLunResponses,
    INQUIRY_DATA_ILLEGAL_LUN,
};
pub use common::{request_sense, send_diagnostic};
pub use data::{data_in, data_out, data_out_dummy};
pub use message::{message_in, message_out, ControlMessage, Outcome as MessageOutcome};
pub use sense::{Sense, SenseKey};
pub use status::{status, Status};

/// Readiness check for beginning a new transaction, per spec.md §4.3:
/// the PHY must be active (selected/reselected) and SEL must have
/// settled, or we could still be mid-(re)selection.
pub fn ready<P: drv_scsi_phy::pins::PhyPins>(pins: &P, state: &drv_scsi_phy::state::PhyState) -> bool {
    state.is_active() && !pins.is_asserted(drv_scsi_phy::pins::Control::Sel)
}

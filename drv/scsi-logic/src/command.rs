// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! COMMAND phase handling, spec.md §4.3 / §4.4 (Open Question 1: the
//! full CDB opcode superset a direct-access device accepts lives in
//! `drv-scsi-disk`; this module only frames bytes and resolves the LUN).

use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_byte, phase_change};
use drv_scsi_phy::Phase;
use media::MediaError;

use crate::message::{message_in, message_out};
use crate::status::{status, Status};

/// A framed, not-yet-dispatched CDB: 6 or 10 bytes (groups 0/1/2; this
/// target does not support opcodes 0x60 and above).
#[derive(Copy, Clone, Debug)]
pub struct Cdb {
    pub bytes: [u8; 10],
    pub len: u8,
    pub lun: u8,
}

impl Cdb {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Canned responses for a LUN other than 0, which this target does not
/// otherwise support (spec.md §4.4: "no support for secondary LUNs").
/// INQUIRY and REQUEST SENSE still get an answer (and never go through
/// CHECK CONDITION for *themselves*); anything else is refused.
pub struct IllegalLunResponses<'a> {
    pub inquiry: &'a [u8],
    pub sense: &'a [u8],
}

/// Fixed INQUIRY response for any LUN other than 0 (spec.md §4.3):
/// peripheral-qualifier 0x7F ("not supported"), shared by every device
/// kind and matching the original firmware's `inquiry_data_illegal_lun[]`.
pub const INQUIRY_DATA_ILLEGAL_LUN: [u8; 32] = [
    0x7F, 0x00, 0x02, 0x02, 0x00, 0x00, 0x00, 0x00, b' ', b'i', b'n', b'v', b'a', b'l', b'i', b'd', b' ', b'b', b'a',
    b'd', b' ', b'l', b'u', b'n', b' ', b' ', b' ', b' ', b' ', b' ', b' ', b'0',
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// A CDB was framed for LUN 0 and is ready for device dispatch.
    Ready,
    /// The transaction was fully handled here (bad LUN, bad opcode, or
    /// a malformed control field) and the bus may already be gone.
    Done,
}

/// Parses the LBA and transfer length out of a 6- or 10-byte READ/WRITE
/// CDB, mirroring the original's `logic_parse_data_op`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DataOp {
    pub lba: u32,
    pub length: u16,
    pub invalid: bool,
}

pub fn parse_data_op(cdb: &Cdb) -> DataOp {
    let c = cdb.bytes;
    match c[0] {
        0x28 | 0x2A | 0x2B => {
            // READ(10) / WRITE(10) / SEEK(10): SEEK has no transfer length
            // of its own, but shares the 10-byte LBA layout, so the
            // generic decode below is safe to reuse for it.
            DataOp {
                lba: u32::from_be_bytes([c[2], c[3], c[4], c[5]]),
                length: u16::from_be_bytes([c[7], c[8]]),
                invalid: false,
            }
        }
        0x08 | 0x0A | 0x0B => {
            // READ(6) / WRITE(6) / SEEK(6)
            let lba = ((c[1] & 0x1F) as u32) << 16 | (c[2] as u32) << 8 | c[3] as u32;
            let length = if c[4] == 0 { 256 } else { c[4] as u16 };
            DataOp {
                lba,
                length,
                invalid: false,
            }
        }
        _ => DataOp {
            invalid: true,
            ..Default::default()
        },
    }
}

/// Enters COMMAND, reads the opcode and remaining CDB bytes, resolves
/// the LUN (preferring an already-latched IDENTIFY LUN over the CDB's
/// own top bits), and either hands back a ready-to-dispatch [`Cdb`] or
/// fully disposes of the transaction itself.
pub fn read_command<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    illegal_lun: IllegalLunResponses,
) -> (CommandOutcome, Cdb) {
    let mut cdb = Cdb {
        bytes: [0u8; 10],
        len: 0,
        lun: 0xFF,
    };

    if !state.is_active() {
        return (CommandOutcome::Done, cdb);
    }

    phase_change(pins, state, clock, timings, Phase::Command);
    cdb.bytes[0] = ask_byte(pins);

    let cmd_count: u8 = if cdb.bytes[0] < 0x20 {
        6
    } else if cdb.bytes[0] < 0x60 {
        10
    } else {
        1
    };
    for b in cdb.bytes.iter_mut().take(cmd_count as usize).skip(1) {
        *b = ask_byte(pins);
    }
    cdb.len = cmd_count;

    let lun = match state.last_identify() {
        Some(identify) => identify & 0x03,
        None if cdb.bytes[0] < 0x60 => cdb.bytes[1] >> 5,
        None => 0,
    };
    cdb.lun = lun;

    if lun != 0 {
        match cdb.bytes[0] {
            0x12 => {
                // INQUIRY
                let alloc = (cdb.bytes[4] as usize).min(illegal_lun.inquiry.len());
                let _ = data_in_bytes(pins, state, clock, timings, &illegal_lun.inquiry[..alloc]);
                status(pins, state, clock, timings, Status::Good);
            }
            0x03 => {
                // REQUEST SENSE
                let alloc = (cdb.bytes[4] as usize).min(illegal_lun.sense.len());
                let _ = data_in_bytes(pins, state, clock, timings, &illegal_lun.sense[..alloc]);
                status(pins, state, clock, timings, Status::Good);
            }
            _ => {
                status(pins, state, clock, timings, Status::CheckCondition);
            }
        }
        message_in(pins, state, clock, timings, 0x00);
        return (CommandOutcome::Done, cdb);
    }

    if cdb.bytes[0] >= 0x60 {
        return (CommandOutcome::Done, cdb);
    }

    // Control field: link/flag bits are not supported.
    let control_bad = (cmd_count == 6 && cdb.bytes[5] & 0x03 != 0)
        || (cmd_count == 10 && cdb.bytes[9] & 0x03 != 0);
    if control_bad {
        return (CommandOutcome::Done, cdb);
    }

    while pins.is_asserted(Control::Atn) {
        if message_out(pins, state, clock, timings) != crate::message::Outcome::Continue {
            return (CommandOutcome::Done, cdb);
        }
    }

    (CommandOutcome::Ready, cdb)
}

fn data_in_bytes<P: PhyPins, C: Clock>(
    pins: &mut P,
    state: &PhyState,
    clock: &mut C,
    timings: &ArbitrationTimings,
    data: &[u8],
) -> Result<(), MediaError> {
    if !state.is_active() {
        return Ok(());
    }
    phase_change(pins, state, clock, timings, Phase::DataIn);
    for &b in data {
        offer_byte(pins, b, false);
    }
    Ok(())
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
    fn six_byte_read_is_framed() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        pins.feed
            .borrow_mut()
            .extend([0x08u8, 0, 0, 5, 2, 0]);
        let state = PhyState::new();
        state.on_selected(0x01);
        let illegal = IllegalLunResponses {
            inquiry: &[0u8; 36],
            sense: &[0u8; 18],
        };
        let (outcome, cdb) = read_command(&mut pins, &state, &mut FakeClock, &timings(), illegal);
        assert_eq!(outcome, CommandOutcome::Ready);
        assert_eq!(cdb.opcode(), 0x08);
        assert_eq!(cdb.len, 6);
        assert_eq!(cdb.as_slice(), &[0x08, 0, 0, 5, 2, 0]);
    }

    #[test]
    fn parse_data_op_six_byte_zero_length_means_256() {
        let cdb = Cdb {
            bytes: [0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            len: 6,
            lun: 0,
        };
        let op = parse_data_op(&cdb);
        assert_eq!(op.length, 256);
        assert!(!op.invalid);
    }

    #[test]
    fn parse_data_op_ten_byte() {
        let cdb = Cdb {
            bytes: [0x28, 0, 0, 0, 0, 10, 0, 0, 4, 0],
            len: 10,
            lun: 0,
        };
        let op = parse_data_op(&cdb);
        assert_eq!(op.lba, 10);
        assert_eq!(op.length, 4);
    }

    #[test]
    fn parse_data_op_seek_six_shares_read_six_layout() {
        let cdb = Cdb {
            bytes: [0x0B, 0x01, 0x00, 0x10, 0, 0, 0, 0, 0, 0],
            len: 6,
            lun: 0,
        };
        let op = parse_data_op(&cdb);
        assert_eq!(op.lba, 0x01_0010);
        assert!(!op.invalid);
    }

    #[test]
    fn bad_lun_inquiry_returns_done() {
        let mut pins = MockPins::default();
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        state.set_last_identify(0x81); // IDENTIFY with LUN 1
        pins.data.set(0x12); // INQUIRY opcode, rest of CDB comes back as whatever's on the bus
        let illegal = IllegalLunResponses {
            inquiry: &[0xAAu8; 36],
            sense: &[0u8; 18],
        };
        let (outcome, cdb) = read_command(&mut pins, &state, &mut FakeClock, &timings(), illegal);
        assert_eq!(outcome, CommandOutcome::Done);
        assert_eq!(cdb.lun, 1);
    }
}

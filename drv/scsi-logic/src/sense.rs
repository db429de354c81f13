// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 18-byte extended sense data, spec.md §4.3 / §4.4.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SenseKey {
    NoSense = 0x00,
    NotReady = 0x02,
    MediumError = 0x03,
    HardwareError = 0x04,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
}

/// ASC/ASCQ pairs packed as ASC in the high byte, ASCQ in the low byte.
pub mod asc {
    pub const NO_INFORMATION: u16 = 0x0000;
    pub const INVALID_CDB_OP: u16 = 0x2000;
    pub const INVALID_CDB_FIELD: u16 = 0x2400;
    pub const INVALID_CDB_PARAM: u16 = 0x2600;
    pub const LUN_BECOMING_READY: u16 = 0x0401;
    pub const LBA_OUT_OF_RANGE: u16 = 0x2100;
}

/// Per-device sense state: the 18-byte extended sense response plus
/// whether it is still pending delivery to the initiator. A REQUEST
/// SENSE clears the pending flag; any other command (except REQUEST
/// SENSE itself) clears it implicitly by starting a fresh command.
#[derive(Copy, Clone, Debug)]
pub struct Sense {
    valid: bool,
    data: [u8; 18],
}

impl Default for Sense {
    fn default() -> Self {
        Self::new()
    }
}

impl Sense {
    pub const fn new() -> Self {
        Self {
            valid: false,
            data: [0u8; 18],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn bytes(&self) -> &[u8; 18] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.valid = false;
    }

    /// Sets sense key and ASC/ASCQ, in the standard extended-sense
    /// layout: byte 0 is 0x80 (valid, current errors), byte 2 the sense
    /// key, bytes 12-13 the ASC/ASCQ.
    pub fn set(&mut self, key: SenseKey, asc_ascq: u16) {
        self.data = [0u8; 18];
        self.data[0] = 0x80;
        self.data[2] = key as u8;
        self.data[12] = (asc_ascq >> 8) as u8;
        self.data[13] = asc_ascq as u8;
        self.valid = true;
    }

    /// As [`Sense::set`], additionally filling the sense-key-specific
    /// bytes (15 = SKSV/flags, 16-17 = a field pointer).
    pub fn set_with_pointer(&mut self, key: SenseKey, asc_ascq: u16, sksv: u8, pointer: u16) {
        self.set(key, asc_ascq);
        self.data[15] = sksv;
        self.data[16] = (pointer >> 8) as u8;
        self.data[17] = pointer as u8;
    }

    pub fn illegal_op(&mut self) {
        self.set(SenseKey::IllegalRequest, asc::INVALID_CDB_OP);
    }

    /// `position` is the zero-based byte offset into the CDB that held
    /// the bad field. Bit 0x80 (valid), 0x40 (C/D = CDB) are set in the
    /// SKSV byte per the standard field-pointer sense format.
    pub fn illegal_arg(&mut self, position: u8) {
        self.set_with_pointer(SenseKey::IllegalRequest, asc::INVALID_CDB_FIELD, 0xC0, position as u16);
    }
}

/// Canned, all-zero-but-for-key "no sense recorded" response handed
/// back to REQUEST SENSE when nothing is pending.
pub const NO_SENSE_RECORDED: [u8; 18] = [0u8; 18];

/// Fixed REQUEST SENSE response for any LUN other than 0 (spec.md
/// §4.3): ILLEGAL REQUEST / LOGICAL UNIT NOT SUPPORTED, matching the
/// original firmware's `sense_data_illegal_lun[]`. This is not derived
/// from the device's live sense state.
pub const SENSE_DATA_ILLEGAL_LUN: [u8; 18] = [
    0xC0, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x25, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_op_sets_key_and_asc() {
        let mut s = Sense::new();
        s.illegal_op();
        assert!(s.is_valid());
        assert_eq!(s.bytes()[2], SenseKey::IllegalRequest as u8);
        assert_eq!(u16::from_be_bytes([s.bytes()[12], s.bytes()[13]]), asc::INVALID_CDB_OP);
    }

    #[test]
    fn illegal_arg_sets_pointer() {
        let mut s = Sense::new();
        s.illegal_arg(5);
        assert_eq!(s.bytes()[15], 0xC0);
        assert_eq!(u16::from_be_bytes([s.bytes()[16], s.bytes()[17]]), 5);
    }

    #[test]
    fn clear_resets_valid_flag() {
        let mut s = Sense::new();
        s.illegal_op();
        s.clear();
        assert!(!s.is_valid());
    }
}

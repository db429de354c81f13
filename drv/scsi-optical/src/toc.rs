// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canned READ HEADER / READ TOC payloads, spec.md §4.5. Single-track,
//! single-session disc layouts only; the table contents are carried
//! over byte-for-byte from `original_source/cdrom.c` (itself adapted
//! from the SCSI2SD project), with the lead-out LBA patched in at
//! request time.

/// READ HEADER (0x44) fixed response: mode-1 user data, L-EC in the
/// 288-byte auxiliary field, track start at LBA 0.
pub const HEADER_SIMPLE: [u8; 8] = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Format 0 (short TOC): one track plus lead-out. Bytes 16..20 are the
/// lead-out address and get overwritten per-request by [`fill_leadout`].
pub const TOC_SIMPLE: [u8; 20] = [
    0x00, 0x12, // toc length
    0x01, 0x01, // first/last track
    0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, // track 1 descriptor, start LBA 0
    0x00, 0x14, 0xAA, 0x00, 0x00, 0x00, 0x00, 0x00, // lead-out descriptor
];

/// Format 1 (multi-session): one complete session starting at LBA 0.
pub const TOC_SESSION: [u8; 12] = [
    0x00, 0x0A, // toc length
    0x01, 0x01, // first/last session
    0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, // first track of last session, LBA 0
];

/// Format 2/3 (raw TOC): A0/A1/A2 reference points, track 1, b0/c0.
/// Six 11-byte descriptors; [`TOC_FULL_LEN_HEADER`] is the 4-byte toc
/// length/session header that precedes this on the wire.
pub const TOC_FULL: [u8; 66] = [
    // A0
    0x01, 0x14, 0x00, 0xA0, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
    // A1
    0x01, 0x14, 0x00, 0xA1, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
    // A2 (lead-out, BCD-encoded 79:59:74 placeholder, patched for format 2)
    0x01, 0x14, 0x00, 0xA2, 0x00, 0x00, 0x00, 0x00, 0x79, 0x59, 0x74,
    // track 1
    0x01, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // b0
    0x01, 0x54, 0x00, 0xB1, 0x79, 0x59, 0x74, 0x00, 0x79, 0x59, 0x74,
    // c0
    0x01, 0x54, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// 2-byte length header the original prefixes `TOC_FULL` with, carried
/// separately here since it precedes the table above in the wire
/// response but isn't part of the per-descriptor layout.
pub const TOC_FULL_LEN_HEADER: [u8; 4] = [0x00, 0x44, 0x01, 0x01];

/// Converts an LBA to minutes/seconds/frames at 75 frames/sec, writing
/// `out[0]` as reserved-zero and `out[1..4]` as M/S/F.
pub fn lba_to_msf(lba: u32, out: &mut [u8; 4]) {
    out[0] = 0;
    out[3] = (lba % 75) as u8;
    let rem = lba / 75;
    out[2] = (rem % 60) as u8;
    out[1] = (rem / 60) as u8;
}

fn from_bcd(val: u8) -> u8 {
    (val >> 4) * 10 + (val & 0xF)
}

/// Overwrites the lead-out LBA/MSF field (bytes 16..20) of a format-0
/// response with the disc's actual last LBA.
pub fn fill_leadout(resp: &mut [u8], last_lba: u32, msf: bool) {
    if msf {
        let mut field = [0u8; 4];
        lba_to_msf(last_lba, &mut field);
        resp[16..20].copy_from_slice(&field);
    } else {
        resp[16..20].copy_from_slice(&last_lba.to_be_bytes());
    }
}

/// Converts every descriptor's positional fields (the 7 bytes following
/// each 4-byte descriptor header) from BCD to binary, for format 3.
pub fn bcd_to_binary_in_place(resp: &mut [u8]) {
    let mut desc = 0;
    while desc + 11 <= resp.len() {
        for i in 0..7 {
            resp[desc + i] = from_bcd(resp[desc + 4 + i]);
        }
        desc += 11;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msf_conversion_matches_75_frames_per_second() {
        let mut out = [0u8; 4];
        lba_to_msf(150, &mut out);
        assert_eq!(out, [0, 0, 2, 0]); // 150 / 75 = 2s exactly
    }

    #[test]
    fn bcd_conversion_of_simple_values() {
        assert_eq!(from_bcd(0x79), 79);
        assert_eq!(from_bcd(0x00), 0);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canned INQUIRY and RECEIVE DIAGNOSTIC RESULTS payloads, carried over
//! byte-for-byte from `original_source/link.c`'s `inquiry_data_n`,
//! `inquiry_data_d` and `diagnostic_results` tables.

/// Nuvolink-compatible INQUIRY response (Protocol A), 36 bytes.
pub const INQUIRY_DATA_NUVOLINK: [u8; 36] = [
    0x09, 0x00, 0x02, 0x02, 0x00, 0x00, 0x00, 0x00, b'N', b'u', b'v', b'o', b't', b'e', b'c',
    b'h', b'N', b'u', b'v', b'o', b'S', b'C', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, b'1', b'.', b'1', b'r',
];

/// Offset into [`INQUIRY_DATA_NUVOLINK`] where the "ROM" MAC begins, if
/// a caller wants to patch a configured address into a copy of it.
pub const NUVOLINK_MAC_ROM_OFFSET: usize = 36;

/// DaynaPort SCSI/Link-compatible INQUIRY response (Protocol B), 255
/// bytes; almost entirely zero padding after the standard header.
pub const INQUIRY_DATA_DAYNAPORT: [u8; 255] = {
    let mut data = [0u8; 255];
    let header: &[u8] = &[
        0x03, 0x00, 0x01, 0x00, 0x1E, 0x00, 0x00, 0x00, b'D', b'a', b'y', b'n', b'a', b' ', b' ',
        b' ', b'S', b'C', b'S', b'I', b'/', b'L', b'i', b'n', b'k', b' ', b' ', b' ', b' ', b' ',
        b' ', b' ', b'1', b'.', b'4', b'a',
    ];
    let mut i = 0;
    while i < header.len() {
        data[i] = header[i];
        i += 1;
    }
    data[0x56] = 0x80;
    data[0x57] = 0x80;
    data[0x58] = 0xBA;
    data[0x5A] = 0xC0;
    data[0x93] = 0x81;
    data
};

pub const DIAGNOSTIC_RESULTS_LEN: usize = 32;

/// Canned RECEIVE DIAGNOSTIC RESULTS response shared by both protocols.
pub const DIAGNOSTIC_RESULTS: [u8; DIAGNOSTIC_RESULTS_LEN] = [
    0x43, 0x21, 0x53, 0x02, 0x40, 0x00, 0x00, 0x00, 0x08, 0x89, 0x12, 0x04, 0x43, 0x02, 0x40,
    0x00, 0x00, 0x00, 0x08, 0x89, 0x12, 0x04, 0x43, 0x02, 0x40, 0x00, 0x00, 0x00, 0x08, 0x89,
    0x12, 0x04,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nuvolink_header_names_the_vendor() {
        assert_eq!(&INQUIRY_DATA_NUVOLINK[8..16], b"Nuvotech");
    }

    #[test]
    fn daynaport_header_names_the_vendor() {
        assert_eq!(&INQUIRY_DATA_DAYNAPORT[8..16], b"Dayna   ");
        assert_eq!(data_len_check(), 255);
    }

    fn data_len_check() -> usize {
        INQUIRY_DATA_DAYNAPORT.len()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The canned INQUIRY response, spec.md §4.4.

/// Peripheral device type 0x00 (direct-access), RMB clear (not removable),
/// ANSI version 2, response data format 2, additional length 0x1F,
/// followed by 8-byte vendor / 16-byte product / 4-byte revision fields.
/// The vendor/product strings match the original firmware exactly so
/// period drivers that sniff INQUIRY text keep recognizing this target.
pub const INQUIRY_DATA: [u8; 36] = [
    0x00, 0x00, 0x02, 0x02, 0x1F, 0x00, 0x00, 0x00, b' ', b's', b'c', b'u', b'z', b'n', b'e', b't', b' ', b's', b'c',
    b'u', b'z', b'n', b'e', b't', b' ', b' ', b' ', b' ', b' ', b' ', b' ', b' ', b'0', b'.', b'1', b'a',
];

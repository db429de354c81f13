// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds MODE SENSE(6)/(10) response payloads shared by the disk and
//! optical device handlers.
//!
//! This crate only knows about bytes in, bytes out: it has no notion of
//! the SCSI bus, sense data, or CDB framing. The device handlers are
//! responsible for mapping a failure here onto CHECK CONDITION / ILLEGAL
//! REQUEST and for picking the byte index the sense data points at.

#![no_std]

/// Maximum size of a MODE SENSE response this crate will ever produce:
/// the 10-byte header plus an 8-byte block descriptor plus all five
/// pages (10 + 14 + 22 + 22 + 10 + the page 0x1C stub).
pub const MAX_RESPONSE_LEN: usize = 96;

pub type Response = heapless::Vec<u8, MAX_RESPONSE_LEN>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Medium {
    Disk,
    Optical,
}

impl Medium {
    fn medium_type(self) -> u8 {
        match self {
            Medium::Disk => 0x00,
            Medium::Optical => 0x01,
        }
    }

    fn device_specific(self) -> u8 {
        match self {
            Medium::Disk => 0x00,
            // write-protected, per spec.md 4.6
            Medium::Optical => 0x80,
        }
    }

    fn density_code(self) -> u8 {
        match self {
            Medium::Disk => 0x00,
            Medium::Optical => 0x01,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// No page in the request matched a page this crate knows how to
    /// build. The caller should report ILLEGAL REQUEST pointing at CDB
    /// byte 2.
    UnsupportedPageCode(u8),
}

/// Parameters extracted from the CDB by the caller.
#[derive(Copy, Clone, Debug)]
pub struct Request {
    pub medium: Medium,
    /// Device capacity in native blocks (512 for disk, 2048 for optical).
    pub capacity_blocks: u32,
    pub block_len: u32,
    /// CDB[2] bits 7:6.
    pub page_control: u8,
    /// CDB[2] bits 5:0, or 0x3F for "all pages".
    pub page_code: u8,
    /// DBD bit from the CDB: suppress the block descriptor.
    pub disable_block_descriptor: bool,
    /// 10-byte MODE SENSE uses a 2-byte mode data length and a longer
    /// header; 6-byte uses a 1-byte length.
    pub ten_byte: bool,
}

const PAGE_CODES: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x08, 0x1C];

fn page_applies(code: u8, medium: Medium) -> bool {
    match code {
        0x03 | 0x04 => medium == Medium::Disk,
        0x01 | 0x02 | 0x08 | 0x1C => true,
        _ => false,
    }
}

/// Derives the cylinder count used by mode page 0x04, per spec.md 4.6:
/// round the capacity down to the nearest 2 MiB boundary (mask off the
/// low 12 bits), then divide by 4096.
pub fn cylinders(capacity_blocks: u32) -> u32 {
    let rounded = capacity_blocks & !0xFFF;
    rounded >> 12
}

fn push_page(
    out: &mut Response,
    code: u8,
    medium: Medium,
    capacity_blocks: u32,
    changeable: bool,
) {
    match code {
        0x01 => {
            let _ = out.push(0x01);
            let _ = out.push(10);
            out.resize_default(out.len() + 10).ok();
        }
        0x02 => {
            let _ = out.push(0x02);
            let _ = out.push(14);
            out.resize_default(out.len() + 14).ok();
        }
        0x03 => {
            let _ = out.push(0x03);
            let _ = out.push(22);
            let start = out.len();
            out.resize_default(start + 22).ok();
            if !changeable {
                let body = &mut out[start..start + 22];
                // sectors/track = 32
                body[8] = 0;
                body[9] = 32;
                // bytes/sector = 512
                body[10] = 0x02;
                body[11] = 0x00;
                // interleave = 1
                body[12] = 0;
                body[13] = 1;
                // "hard sectors only"
                body[18] = 0x40;
            }
        }
        0x04 => {
            let _ = out.push(0x04);
            let _ = out.push(22);
            let start = out.len();
            out.resize_default(start + 22).ok();
            if !changeable {
                let body = &mut out[start..start + 22];
                let cyl = cylinders(capacity_blocks);
                body[0] = (cyl >> 16) as u8;
                body[1] = (cyl >> 8) as u8;
                body[2] = cyl as u8;
                body[3] = 64; // heads
                // device step rate = 1 (bytes 10-11)
                body[10] = 0x00;
                body[11] = 0x01;
                // medium rotation rate = 10000 RPM (bytes 18-19)
                body[18] = (10_000u16 >> 8) as u8;
                body[19] = 10_000u16 as u8;
            }
        }
        0x08 => {
            let _ = out.push(0x08);
            let _ = out.push(10);
            let start = out.len();
            out.resize_default(start + 10).ok();
            if !changeable {
                out[start] = 0x01; // RCD set: read cache disabled
            }
        }
        0x1C => {
            let _ = out.push(0x1C);
            let _ = out.push(6);
            out.resize_default(out.len() + 6).ok();
        }
        _ => unreachable!("page_applies gated this"),
    }
}

/// Builds a MODE SENSE response. Returns the fully assembled payload,
/// including the length header (already filled in).
pub fn build_mode_sense(req: Request) -> Result<Response, Error> {
    let mut out = Response::new();

    let header_len = if req.ten_byte { 8 } else { 4 };
    for _ in 0..header_len {
        let _ = out.push(0);
    }
    let block_descriptor_len: u8 = if req.disable_block_descriptor { 0 } else { 8 };
    if req.ten_byte {
        out[2] = req.medium.medium_type();
        out[3] = req.medium.device_specific();
        out[4] = 0; // long LBA descriptor flag, always 0 here
        out[5] = 0;
        out[6] = 0;
        out[7] = block_descriptor_len;
    } else {
        out[1] = req.medium.medium_type();
        out[2] = req.medium.device_specific();
        out[3] = block_descriptor_len;
    }

    if !req.disable_block_descriptor {
        let _ = out.push(req.medium.density_code());
        // 3 bytes reserved-zero block count
        let _ = out.push(0);
        let _ = out.push(0);
        let _ = out.push(0);
        // 1 reserved byte
        let _ = out.push(0);
        // 3-byte big-endian block length
        let _ = out.push((req.block_len >> 16) as u8);
        let _ = out.push((req.block_len >> 8) as u8);
        let _ = out.push(req.block_len as u8);
    }

    let changeable = req.page_control == 0b01;
    let mut matched = false;
    if req.page_code == 0x3F {
        for &code in PAGE_CODES.iter() {
            if page_applies(code, req.medium) {
                push_page(&mut out, code, req.medium, req.capacity_blocks, changeable);
                matched = true;
            }
        }
    } else if page_applies(req.page_code, req.medium) {
        push_page(&mut out, req.page_code, req.medium, req.capacity_blocks, changeable);
        matched = true;
    }

    if !matched {
        return Err(Error::UnsupportedPageCode(req.page_code));
    }

    let total = out.len();
    if req.ten_byte {
        let mode_data_len = (total - 2) as u16;
        out[0] = (mode_data_len >> 8) as u8;
        out[1] = mode_data_len as u8;
    } else {
        out[0] = (total - 1) as u8;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_byte_all_pages_disk_header_shape() {
        let req = Request {
            medium: Medium::Disk,
            capacity_blocks: 204_800,
            block_len: 512,
            page_control: 0,
            page_code: 0x3F,
            disable_block_descriptor: false,
            ten_byte: false,
        };
        let resp = build_mode_sense(req).unwrap();
        assert_eq!(resp[1], 0); // medium type
        assert_eq!(resp[2], 0); // device-specific
        assert_eq!(resp[3], 8); // block descriptor length
        // block descriptor: density 0, zero count, block length 0x200
        assert_eq!(resp[4], 0);
        assert_eq!(&resp[5..8], &[0, 0, 0]);
        assert_eq!(&resp[9..12], &[0x00, 0x02, 0x00]);
    }

    #[test]
    fn cylinder_derivation_matches_scenario_s4() {
        // 204800 & 0xFFFFF000 = 200704; 200704 >> 12 = 49
        assert_eq!(cylinders(204_800), 49);
    }

    #[test]
    fn unsupported_page_errors() {
        let req = Request {
            medium: Medium::Optical,
            capacity_blocks: 1000,
            block_len: 2048,
            page_control: 0,
            page_code: 0x3E,
            disable_block_descriptor: true,
            ten_byte: false,
        };
        assert_eq!(
            build_mode_sense(req),
            Err(Error::UnsupportedPageCode(0x3E))
        );
    }

    #[test]
    fn format_page_places_sectors_per_track_and_flag_correctly() {
        let req = Request {
            medium: Medium::Disk,
            capacity_blocks: 204_800,
            block_len: 512,
            page_control: 0,
            page_code: 0x03,
            disable_block_descriptor: true,
            ten_byte: false,
        };
        let resp = build_mode_sense(req).unwrap();
        // header(4) + page code/length(2) = body starts at index 6
        let body = &resp[6..6 + 22];
        assert_eq!(body[8], 0); // sectors/track high byte
        assert_eq!(body[9], 32); // sectors/track low byte
        assert_eq!(&body[10..12], &[0x02, 0x00]); // bytes/sector = 512
        assert_eq!(&body[12..14], &[0x00, 0x01]); // interleave = 1
        assert_eq!(body[18], 0x40); // hard sectors only
        assert_eq!(body[20], 0x00); // reserved, not the flag byte
    }

    #[test]
    fn optical_pages_exclude_geometry() {
        let req = Request {
            medium: Medium::Optical,
            capacity_blocks: 1000,
            block_len: 2048,
            page_control: 0,
            page_code: 0x3F,
            disable_block_descriptor: true,
            ten_byte: false,
        };
        let resp = build_mode_sense(req).unwrap();
        // pages present: 01,02,08,1C -> no page 03/04 bytes should appear
        assert!(!resp.windows(2).any(|w| w == [0x04, 22]));
    }
}

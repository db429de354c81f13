// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only optical device, spec.md §4.5: a CD-ROM-shaped target
//! operating on 2048-byte sectors, always backed by a FAT file (the
//! original firmware never fast-promotes a CD-ROM-mode volume to
//! direct sector access, so unlike `drv-scsi-disk` there is no
//! `Backend`/raw-LBA split here).

#![cfg_attr(not(test), no_std)]

pub mod inquiry;
pub mod toc;

use drv_scsi_logic::sense::asc;
use drv_scsi_logic::{
    data_in, message_in, parse_data_op, read_command, request_sense, send_diagnostic, status,
    Cdb, CommandOutcome, DataOp, IllegalLunResponses, Sense, SenseKey, Status,
    INQUIRY_DATA_ILLEGAL_LUN,
};
use drv_scsi_phy::pins::PhyPins;
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{offer_bulk, phase_change};
use drv_scsi_phy::Phase;
use media::{ByteSource, MediaError, SeekableFile};
use mode_pages::{build_mode_sense, Medium, Request as ModeSenseRequest};
use ringbuf::*;

use crate::inquiry::INQUIRY_DATA;
use crate::toc::{
    fill_leadout, HEADER_SIMPLE, TOC_FULL, TOC_FULL_LEN_HEADER, TOC_SESSION, TOC_SIMPLE,
};

const SECTOR_LEN: u32 = 2048;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Opcode(u8),
    IllegalOp(u8),
    MediumError,
    BadTocFormat(u8),
}
ringbuf!(Trace, 16, Trace::None);

/// Streams 2048-byte sectors off a FAT file, one real-disk sector read
/// at a time, so a multi-sector READ never buffers the whole transfer
/// (same discipline as `drv-scsi-disk::stream`).
struct SectorFileSource<'a, F: SeekableFile> {
    file: &'a mut F,
}

impl<'a, F: SeekableFile> ByteSource for SectorFileSource<'a, F> {
    fn take(&mut self, buf: &mut [u8]) -> Result<(), MediaError> {
        self.file.read_exact(buf)
    }
}

/// A read-only optical target, LUN 0 behind some target ID.
pub struct Optical<F: SeekableFile> {
    file: F,
    sense: Sense,
    /// Capacity in native 2048-byte sectors.
    capacity_sectors: u32,
}

impl<F: SeekableFile> Optical<F> {
    pub fn new(file: F, capacity_sectors: u32) -> Self {
        Self {
            file,
            sense: Sense::new(),
            capacity_sectors,
        }
    }

    fn within_bounds(&self, op: &DataOp) -> bool {
        (op.lba as u64 + op.length as u64) < self.capacity_sectors as u64
    }

    fn good<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        status(pins, phy, clock, timings, Status::Good);
        message_in(pins, phy, clock, timings, 0x00);
    }

    fn fail_illegal_arg<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        position: u8,
    ) {
        self.sense.illegal_arg(position);
        status(pins, phy, clock, timings, Status::CheckCondition);
        message_in(pins, phy, clock, timings, 0x00);
    }

    fn fail_medium_error<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        ringbuf_entry!(Trace::MediumError);
        self.sense.set(SenseKey::MediumError, asc::NO_INFORMATION);
        status(pins, phy, clock, timings, Status::CheckCondition);
        message_in(pins, phy, clock, timings, 0x00);
    }

    /// Services one command once COMMAND framing has already resolved
    /// this target/LUN.
    pub fn service<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        let illegal = IllegalLunResponses {
            inquiry: &INQUIRY_DATA_ILLEGAL_LUN,
            sense: &drv_scsi_logic::sense::SENSE_DATA_ILLEGAL_LUN,
        };
        let (outcome, cdb) = read_command(pins, phy, clock, timings, illegal);
        if outcome != CommandOutcome::Ready {
            return;
        }

        ringbuf_entry!(Trace::Opcode(cdb.opcode()));

        match cdb.opcode() {
            0x00 => self.good(pins, phy, clock, timings),
            0x03 => request_sense(pins, phy, clock, timings, &cdb, &mut self.sense),
            0x08 | 0x28 => self.read(pins, phy, clock, timings, &cdb),
            0x12 => self.inquiry(pins, phy, clock, timings, &cdb),
            0x16 | 0x17 => self.good(pins, phy, clock, timings),
            0x1A | 0x5A => self.mode_sense(pins, phy, clock, timings, &cdb),
            0x1D => send_diagnostic(pins, phy, clock, timings, &cdb),
            0x25 => self.read_capacity(pins, phy, clock, timings, &cdb),
            0x43 => self.read_toc(pins, phy, clock, timings, &cdb),
            0x44 => self.read_header(pins, phy, clock, timings, &cdb),
            op => {
                ringbuf_entry!(Trace::IllegalOp(op));
                self.sense.illegal_op();
                status(pins, phy, clock, timings, Status::CheckCondition);
                message_in(pins, phy, clock, timings, 0x00);
            }
        }
    }

    fn inquiry<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let alloc = (cdb.bytes[4] as usize).min(INQUIRY_DATA.len());
        data_in(pins, phy, clock, timings, &INQUIRY_DATA[..alloc]);
        self.good(pins, phy, clock, timings);
    }

    fn read<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let op = parse_data_op(cdb);
        if !self.within_bounds(&op) {
            self.sense.set(SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        if op.length > 0 {
            if self.file.seek(op.lba as u64 * SECTOR_LEN as u64).is_err() {
                self.fail_medium_error(pins, phy, clock, timings);
                return;
            }
            phase_change(pins, phy, clock, timings, Phase::DataIn);
            let mut source = SectorFileSource { file: &mut self.file };
            if offer_bulk(pins, false, &mut source, op.length as usize * SECTOR_LEN as usize).is_err() {
                self.fail_medium_error(pins, phy, clock, timings);
                return;
            }
        }
        self.good(pins, phy, clock, timings);
    }

    fn read_capacity<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        if cdb.bytes[1] & 1 != 0 {
            self.fail_illegal_arg(pins, phy, clock, timings, 1);
            return;
        }
        let last = self.capacity_sectors.wrapping_sub(1);
        let mut resp = [0u8; 8];
        resp[..4].copy_from_slice(&last.to_be_bytes());
        resp[4..8].copy_from_slice(&SECTOR_LEN.to_be_bytes());
        data_in(pins, phy, clock, timings, &resp);
        self.good(pins, phy, clock, timings);
    }

    fn read_header<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let alloc = (u16::from_be_bytes([cdb.bytes[7], cdb.bytes[8]]) as usize).min(HEADER_SIMPLE.len());
        data_in(pins, phy, clock, timings, &HEADER_SIMPLE[..alloc]);
        self.good(pins, phy, clock, timings);
    }

    fn read_toc<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let msf = cdb.bytes[1] & 0x02 != 0;
        let track = cdb.bytes[6];
        let alloc = u16::from_be_bytes([cdb.bytes[7], cdb.bytes[8]]) as usize;
        let format = cdb.bytes[2] & 0x0F;

        // largest possible response: the 4-byte header plus the 66-byte
        // raw-TOC body.
        let mut resp = [0u8; 4 + TOC_FULL.len()];
        let len = match format {
            0 => {
                if track > 1 {
                    self.fail_illegal_arg(pins, phy, clock, timings, 6);
                    return;
                }
                resp[..TOC_SIMPLE.len()].copy_from_slice(&TOC_SIMPLE);
                fill_leadout(&mut resp[..TOC_SIMPLE.len()], self.capacity_sectors.wrapping_sub(1), msf);
                TOC_SIMPLE.len()
            }
            1 => {
                resp[..TOC_SESSION.len()].copy_from_slice(&TOC_SESSION);
                TOC_SESSION.len()
            }
            2 | 3 => {
                if track > 1 {
                    self.fail_illegal_arg(pins, phy, clock, timings, 6);
                    return;
                }
                resp[..TOC_FULL_LEN_HEADER.len()].copy_from_slice(&TOC_FULL_LEN_HEADER);
                let body_start = TOC_FULL_LEN_HEADER.len();
                resp[body_start..body_start + TOC_FULL.len()].copy_from_slice(&TOC_FULL);
                if format == 3 {
                    crate::toc::bcd_to_binary_in_place(&mut resp[body_start..body_start + TOC_FULL.len()]);
                }
                body_start + TOC_FULL.len()
            }
            _ => {
                ringbuf_entry!(Trace::BadTocFormat(format));
                self.fail_illegal_arg(pins, phy, clock, timings, 2);
                return;
            }
        };

        let n = alloc.min(len);
        data_in(pins, phy, clock, timings, &resp[..n]);
        self.good(pins, phy, clock, timings);
    }

    fn mode_sense<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let ten_byte = cdb.opcode() == 0x5A;
        let page_control = (cdb.bytes[2] >> 6) & 0x03;
        let page_code = cdb.bytes[2] & 0x3F;
        let disable_block_descriptor = cdb.bytes[1] & 0x08 != 0;
        let alloc = if ten_byte {
            u16::from_be_bytes([cdb.bytes[7], cdb.bytes[8]]) as usize
        } else {
            cdb.bytes[4] as usize
        };

        let req = ModeSenseRequest {
            medium: Medium::Optical,
            capacity_blocks: self.capacity_sectors,
            block_len: SECTOR_LEN,
            page_control,
            page_code,
            disable_block_descriptor,
            ten_byte,
        };

        match build_mode_sense(req) {
            Ok(resp) => {
                let n = alloc.min(resp.len());
                data_in(pins, phy, clock, timings, &resp[..n]);
                self.good(pins, phy, clock, timings);
            }
            Err(_) => self.fail_illegal_arg(pins, phy, clock, timings, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_scsi_phy::pins::mock::MockPins;
    use media::test_doubles::RamFile;

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

    fn make_optical() -> Optical<RamFile> {
        let file = RamFile {
            data: std::vec![0u8; 4 * 2048],
            pos: 0,
            contiguous_start: None,
        };
        Optical::new(file, 4)
    }

    fn cdb(bytes: [u8; 10], len: u8) -> Cdb {
        Cdb { bytes, len, lun: 0 }
    }

    fn select(pins: &mut MockPins) -> PhyState {
        pins.auto_ack.set(true);
        let state = PhyState::new();
        state.on_selected(0x01);
        state
    }

    #[test]
    fn read_out_of_range_sets_illegal_request_sense() {
        let mut dev = make_optical();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x28, 0, 0, 0, 0, 3, 0, 0, 2, 0], 10); // lba 3, length 2, capacity 4
        dev.read(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(dev.sense.is_valid());
        assert_eq!(dev.sense.bytes()[2], SenseKey::IllegalRequest as u8);
    }

    #[test]
    fn read_capacity_reports_2048_byte_blocks() {
        let mut dev = make_optical();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0], 10);
        dev.read_capacity(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(!dev.sense.is_valid());
    }

    #[test]
    fn read_toc_format_0_rejects_track_above_one() {
        let mut dev = make_optical();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x43, 0, 0, 0, 0, 0, 2, 0, 20, 0], 10); // track 2
        dev.read_toc(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(dev.sense.is_valid());
        assert_eq!(dev.sense.bytes()[2], SenseKey::IllegalRequest as u8);
    }

    #[test]
    fn read_toc_unknown_format_is_illegal_arg() {
        let mut dev = make_optical();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x43, 0, 9, 0, 0, 0, 0, 0, 20, 0], 10); // format 9
        dev.read_toc(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(dev.sense.is_valid());
    }

    #[test]
    fn mode_sense_uses_optical_medium_and_excludes_geometry_pages() {
        let mut dev = make_optical();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x1A, 0, 0x3F, 0, 96, 0, 0, 0, 0, 0], 6);
        dev.mode_sense(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(!dev.sense.is_valid());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Direct-access disk device, spec.md §4.4: the opcode dispatcher that
//! sits on top of `drv-scsi-logic` and turns CDBs into reads, writes,
//! and mode data against a [`Backend`].

#![cfg_attr(not(test), no_std)]

pub mod backend;
pub mod inquiry;
pub mod state;
pub mod stream;

use drv_scsi_logic::sense::asc;
use drv_scsi_logic::{
    data_in, data_out, data_out_dummy, message_in, parse_data_op, read_command, request_sense,
    send_diagnostic, status, Cdb, CommandOutcome, DataOp, IllegalLunResponses, Sense, SenseKey,
    Status, INQUIRY_DATA_ILLEGAL_LUN,
};
use drv_scsi_phy::pins::PhyPins;
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::{ask_byte, offer_bulk, ask_bulk, phase_change};
use drv_scsi_phy::Phase;
use media::{BlockDevice, SeekableFile};
use mode_pages::{build_mode_sense, Medium, Request as ModeSenseRequest};
use ringbuf::*;

use crate::backend::Backend;
use crate::inquiry::INQUIRY_DATA;
use crate::stream::{SectorSink, SectorSource};

pub use backend::AccessMode;
pub use state::DiskState;

/// Rounded down to the nearest 2 MiB boundary, then the last valid
/// block (spec.md §4.6): mask off the low 12 bits, subtract one.
fn last_readable_block(capacity_blocks: u32) -> u32 {
    (capacity_blocks & !0xFFF).wrapping_sub(1)
}

/// Size and offset of the scratch buffer READ/WRITE BUFFER (mode 0) reads
/// and writes, per spec.md §4.4.
const MEMORY_BUFFER_LEN: usize = 68;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Opcode(u8),
    IllegalOp(u8),
    MediumError,
    NotReady,
}
ringbuf!(Trace, 16, Trace::None);

/// A direct-access disk target, LUN 0 behind some target ID.
pub struct Disk<F: SeekableFile, D: BlockDevice> {
    backend: Backend<F, D>,
    state: DiskState,
    sense: Sense,
    /// Native 512-byte sector count, already known at construction (the
    /// original firmware learns it once at volume open time, see
    /// spec.md §4.4).
    capacity_blocks: u32,
    scratch: [u8; MEMORY_BUFFER_LEN],
}

impl<F: SeekableFile, D: BlockDevice> Disk<F, D> {
    pub fn new(backend: Backend<F, D>, capacity_blocks: u32) -> Self {
        Self {
            backend,
            state: DiskState::Ok,
            sense: Sense::new(),
            capacity_blocks,
            scratch: [0u8; MEMORY_BUFFER_LEN],
        }
    }

    pub fn state(&self) -> DiskState {
        self.state
    }

    pub fn set_state(&mut self, state: DiskState) {
        self.state = state;
    }

    /// Re-checks fast-mode promotion; should be polled from the main
    /// loop between transactions (spec.md §4.4).
    pub fn poll_fast_promotion(&mut self) {
        self.backend.poll_fast_promotion();
    }

    fn within_bounds(&self, op: &DataOp, use_length: bool) -> bool {
        let end = if use_length {
            op.lba as u64 + op.length as u64
        } else {
            op.lba as u64
        };
        end < self.capacity_blocks as u64
    }

    fn fail_medium_error<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        ringbuf_entry!(Trace::MediumError);
        self.state = DiskState::Error;
        self.sense.set(SenseKey::MediumError, asc::NO_INFORMATION);
        status(pins, phy, clock, timings, Status::CheckCondition);
        message_in(pins, phy, clock, timings, 0x00);
    }

    fn fail_out_of_range<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        self.sense.set(SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE);
        status(pins, phy, clock, timings, Status::CheckCondition);
        message_in(pins, phy, clock, timings, 0x00);
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

    /// Services one command once COMMAND framing has already resolved
    /// this target/LUN. Returns once the transaction has run to
    /// completion (STATUS/MESSAGE IN sent) or the bus has gone away.
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

        // Per spec.md §4.4, only REQUEST SENSE and INQUIRY get an answer
        // while the volume isn't fully up.
        if cdb.opcode() != 0x03 && cdb.opcode() != 0x12 {
            match self.state {
                DiskState::Ok => {}
                DiskState::NoInit => {
                    ringbuf_entry!(Trace::NotReady);
                    self.sense.set(SenseKey::NotReady, asc::LUN_BECOMING_READY);
                    status(pins, phy, clock, timings, Status::CheckCondition);
                    message_in(pins, phy, clock, timings, 0x00);
                    return;
                }
                DiskState::Error => {
                    self.sense.set(SenseKey::HardwareError, asc::NO_INFORMATION);
                    status(pins, phy, clock, timings, Status::CheckCondition);
                    message_in(pins, phy, clock, timings, 0x00);
                    return;
                }
            }
        }

        match cdb.opcode() {
            0x00 => self.good(pins, phy, clock, timings),
            0x03 => request_sense(pins, phy, clock, timings, &cdb, &mut self.sense),
            0x04 => self.format_unit(pins, phy, clock, timings, &cdb),
            0x08 | 0x28 => self.read(pins, phy, clock, timings, &cdb),
            0x0A | 0x2A => self.write(pins, phy, clock, timings, &cdb),
            0x0B | 0x2B => self.seek(pins, phy, clock, timings, &cdb),
            0x12 => self.inquiry(pins, phy, clock, timings, &cdb),
            0x15 => self.mode_select(pins, phy, clock, timings, &cdb),
            // RESERVE/RELEASE: stub-accepted no-ops (spec.md §4.4 Open
            // Questions: no reservation tracking exists).
            0x16 | 0x17 => self.good(pins, phy, clock, timings),
            0x1A | 0x5A => self.mode_sense(pins, phy, clock, timings, &cdb),
            0x1D => send_diagnostic(pins, phy, clock, timings, &cdb),
            0x25 => self.read_capacity(pins, phy, clock, timings, &cdb),
            0x2F => self.verify(pins, phy, clock, timings, &cdb),
            0x3B => self.write_buffer(pins, phy, clock, timings, &cdb),
            0x3C => self.read_buffer(pins, phy, clock, timings, &cdb),
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

    fn mode_select<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let length = cdb.bytes[4] as u16;
        if length > 0 {
            data_out_dummy(pins, phy, clock, timings, length);
        }
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
            medium: Medium::Disk,
            capacity_blocks: self.capacity_blocks,
            block_len: 512,
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
            Err(_) => {
                self.sense.illegal_arg(2);
                status(pins, phy, clock, timings, Status::CheckCondition);
                message_in(pins, phy, clock, timings, 0x00);
            }
        }
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
            self.sense.illegal_arg(1);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        let last = last_readable_block(self.capacity_blocks);
        let mut resp = [0u8; 8];
        resp[..4].copy_from_slice(&last.to_be_bytes());
        resp[4..8].copy_from_slice(&512u32.to_be_bytes());
        data_in(pins, phy, clock, timings, &resp);
        self.good(pins, phy, clock, timings);
    }

    fn format_unit<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        match cdb.bytes[1] {
            0x00 => self.good(pins, phy, clock, timings),
            0x10 | 0x18 => {
                let mut parms = [0u8; 4];
                let n = data_out(pins, phy, clock, timings, &mut parms);
                if n != 4 {
                    phase_change(pins, phy, clock, timings, Phase::BusFree);
                    return;
                }
                if parms[2] == 0 && parms[3] == 0 {
                    self.good(pins, phy, clock, timings);
                } else {
                    self.sense.illegal_arg(2);
                    status(pins, phy, clock, timings, Status::CheckCondition);
                    message_in(pins, phy, clock, timings, 0x00);
                }
            }
            _ => {
                self.sense.illegal_arg(1);
                status(pins, phy, clock, timings, Status::CheckCondition);
                message_in(pins, phy, clock, timings, 0x00);
            }
        }
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
        if !self.within_bounds(&op, true) {
            self.fail_out_of_range(pins, phy, clock, timings);
            return;
        }
        if op.length > 0 {
            phase_change(pins, phy, clock, timings, Phase::DataIn);
            let mut source = SectorSource::new(&mut self.backend, op.lba);
            if offer_bulk(pins, false, &mut source, op.length as usize * 512).is_err() {
                self.fail_medium_error(pins, phy, clock, timings);
                return;
            }
        }
        self.good(pins, phy, clock, timings);
    }

    fn write<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let op = parse_data_op(cdb);
        if !self.within_bounds(&op, true) {
            self.fail_out_of_range(pins, phy, clock, timings);
            return;
        }
        if op.length > 0 {
            phase_change(pins, phy, clock, timings, Phase::DataOut);
            let mut sink = SectorSink::new(&mut self.backend, op.lba);
            if ask_bulk(pins, &mut sink, op.length as usize * 512).is_err() {
                self.fail_medium_error(pins, phy, clock, timings);
                return;
            }
        }
        self.good(pins, phy, clock, timings);
    }

    fn seek<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        let op = parse_data_op(cdb);
        if !self.within_bounds(&op, false) {
            self.fail_out_of_range(pins, phy, clock, timings);
            return;
        }
        // Direct-sector access has effectively free seeks; only a
        // FAT-backed volume still on the slow path moves a file
        // pointer, and can fail doing so (spec.md §4.4).
        if self.backend.seek(op.lba).is_err() {
            self.fail_medium_error(pins, phy, clock, timings);
            return;
        }
        self.good(pins, phy, clock, timings);
    }

    fn verify<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        if cdb.bytes[1] & 1 != 0 {
            self.sense.illegal_arg(1);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        if cdb.bytes[1] & 2 != 0 {
            // BYTCHK: accept and discard the comparison data; this
            // target never actually compares it (spec.md §4.4).
            let len = u16::from_be_bytes([cdb.bytes[7], cdb.bytes[8]]);
            data_out_dummy(pins, phy, clock, timings, len.saturating_mul(512));
        }
        self.good(pins, phy, clock, timings);
    }

    fn read_buffer<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        if cdb.bytes[1] & 0x07 != 0 {
            self.sense.illegal_arg(1);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        let mut length = if cdb.bytes[6] > 0 || cdb.bytes[7] > 0 {
            255
        } else {
            cdb.bytes[8] as usize
        };
        if length > MEMORY_BUFFER_LEN {
            length = MEMORY_BUFFER_LEN;
        }
        self.scratch[0] = 0x00;
        self.scratch[1] = 0x00;
        self.scratch[2] = 0x00;
        self.scratch[3] = 0x40;
        data_in(pins, phy, clock, timings, &self.scratch[..length]);
        self.good(pins, phy, clock, timings);
    }

    fn write_buffer<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        cdb: &Cdb,
    ) {
        if cdb.bytes[1] & 0x07 != 0 {
            self.sense.illegal_arg(1);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        let length = cdb.bytes[8] as usize;
        if cdb.bytes[6] > 0 || cdb.bytes[7] > 0 || length > MEMORY_BUFFER_LEN - 4 {
            self.sense.illegal_arg(6);
            status(pins, phy, clock, timings, Status::CheckCondition);
            message_in(pins, phy, clock, timings, 0x00);
            return;
        }
        if length < 4 {
            self.good(pins, phy, clock, timings);
            return;
        }
        phase_change(pins, phy, clock, timings, Phase::DataOut);
        for _ in 0..4 {
            let _ = ask_byte(pins);
        }
        data_out(pins, phy, clock, timings, &mut self.scratch[4..4 + length]);
        self.good(pins, phy, clock, timings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AccessMode;
    use drv_scsi_phy::pins::mock::MockPins;

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

    fn make_disk() -> Disk<media::test_doubles::RamFile, media::test_doubles::RamDisk> {
        let file = media::test_doubles::RamFile {
            data: std::vec![0u8; 8 * 512],
            pos: 0,
            contiguous_start: None,
        };
        let device = media::test_doubles::RamDisk::new(8);
        let backend = Backend::file(file, device, AccessMode::Normal);
        Disk::new(backend, 8)
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
    fn test_unit_ready_reports_good() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        disk.good(&mut pins, &state, &mut FakeClock, &timings());
        assert_eq!(state.last_message_in(), 0x00);
    }

    #[test]
    fn read_out_of_range_sets_illegal_request_sense() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x08, 0, 0, 7, 2, 0, 0, 0, 0, 0], 6); // lba 7, length 2, capacity 8
        disk.read(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(disk.sense.is_valid());
        assert_eq!(disk.sense.bytes()[2], SenseKey::IllegalRequest as u8);
    }

    #[test]
    fn write_then_read_round_trips_through_sector_streaming() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        pins.feed.borrow_mut().extend([0xAAu8; 512]);
        let wc = cdb([0x0A, 0, 0, 0, 0, 1, 0, 0, 0, 0], 6);
        disk.write(&mut pins, &state, &mut FakeClock, &timings(), &wc);
        assert!(!disk.sense.is_valid());

        let mut sector = [0u8; 512];
        disk.backend.read_sectors(0, 1, &mut sector).unwrap();
        assert_eq!(sector, [0xAAu8; 512]);
    }

    #[test]
    fn read_capacity_rounds_down_to_2mib_boundary() {
        // 204800 & !0xFFF = 200704, minus 1 = 200703 = 0x00030FFF
        assert_eq!(last_readable_block(204_800), 200_703);
    }

    #[test]
    fn read_capacity_reladr_is_rejected() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x25, 1, 0, 0, 0, 0, 0, 0, 0, 0], 10); // RelAdr set
        disk.read_capacity(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(disk.sense.is_valid());
        assert_eq!(disk.sense.bytes()[2], SenseKey::IllegalRequest as u8);
    }

    #[test]
    fn mode_sense_unsupported_page_sets_illegal_arg() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x1A, 0, 0x3E, 0, 4, 0, 0, 0, 0, 0], 6);
        disk.mode_sense(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(disk.sense.is_valid());
        assert_eq!(disk.sense.bytes()[2], SenseKey::IllegalRequest as u8);
    }

    #[test]
    fn seek_beyond_capacity_is_rejected() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x0B, 0, 0, 8, 0, 0, 0, 0, 0, 0], 6); // lba 8, capacity 8 -> out of range
        disk.seek(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(disk.sense.is_valid());
    }

    #[test]
    fn write_buffer_short_length_is_a_noop() {
        let mut disk = make_disk();
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        let c = cdb([0x3B, 0, 0, 0, 0, 0, 0, 0, 2, 0], 10); // length 2 < 4
        disk.write_buffer(&mut pins, &state, &mut FakeClock, &timings(), &c);
        assert!(!disk.sense.is_valid());
    }

    #[test]
    fn not_ready_state_rejects_everything_but_sense_and_inquiry() {
        let mut disk = make_disk();
        disk.set_state(DiskState::NoInit);
        let mut pins = MockPins::default();
        let state = select(&mut pins);
        pins.feed.borrow_mut().extend([0x00u8, 0, 0, 0, 0, 0]); // TEST UNIT READY
        disk.service(&mut pins, &state, &mut FakeClock, &timings());
        assert!(disk.sense.is_valid());
        assert_eq!(disk.sense.bytes()[2], SenseKey::NotReady as u8);
    }
}

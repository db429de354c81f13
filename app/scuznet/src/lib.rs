// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level dispatch loop (spec.md §2): poll for selection, route to
//! the selected target's device handler, and between selections poll
//! the link device's receive path and each disk's fast-mode promotion
//! check. Everything board-specific (MCU bring-up, the FAT/card driver,
//! the LED fault indicator) is a trait boundary; this crate only knows
//! how to drive the PHY, logic layer, and device handlers it's handed.

#![cfg_attr(not(test), no_std)]

pub mod fault;

use drv_scsi_disk::Disk;
use drv_scsi_link::chip::NetChip;
use drv_scsi_link::{Link, Protocol as LinkProtocol};
use drv_scsi_optical::Optical;
use drv_scsi_phy::pins::{Control, PhyPins};
use drv_scsi_phy::state::PhyState;
use drv_scsi_phy::timing::{ArbitrationTimings, Clock};
use drv_scsi_phy::transfer::phase_change;
use drv_scsi_phy::{selection_matches, Phase, ReselectState, Reselector};
use media::{BlockDevice, MediaError, SeekableFile};
use ringbuf::*;
use scuznet_config::{Backing, DeviceEntry, DeviceKind, DiskMode, GlobalConfig};

pub use fault::{BlinkCode, FaultIndicator};

/// Bit 7 is permanently reserved for the initiator (spec.md §3); this
/// target implementation never arbitrates against another target, so
/// the initiator it reselects is always the one that last selected us.
const INITIATOR_MASK: u8 = 0x80;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Selected(u8),
    ResetObserved,
    ReselectWon(u8),
}
ringbuf!(Trace, 16, Trace::None);

/// Errors that can keep the device table from being built, surfaced to
/// `app/scuznet::init`'s caller so it can drive
/// [`FaultIndicator::blink`] (spec.md §7).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitError {
    Config(scuznet_config::ConfigError),
    Media(MediaError),
    /// More enabled devices than the dispatch table has room for; can't
    /// happen with a config that passed `scuznet_config::parse` (which
    /// already caps at `MAX_DEVICES`), kept for completeness of the
    /// error type.
    TooManyDevices,
    /// An `[hdd*]` section asked for `kind = optical` with a raw-LBA
    /// backing; the optical device is always file-backed (spec.md
    /// §4.5).
    OpticalNeedsFile,
}

impl From<scuznet_config::ConfigError> for InitError {
    fn from(e: scuznet_config::ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<MediaError> for InitError {
    fn from(e: MediaError) -> Self {
        Self::Media(e)
    }
}

/// The board-supplied means of turning a [`DeviceEntry`] into the
/// concrete file/block/chip handles a device needs. Card and filesystem
/// access are peripheral collaborators out of core scope (spec.md §1);
/// this is the seam between them and the device tables built here.
pub trait MediaOpener {
    type File: SeekableFile;
    type Block: BlockDevice;
    type Chip: NetChip;

    /// Opens (creating if `size_mib` is given and the file doesn't
    /// exist) a file on the FAT volume.
    fn open_file(&mut self, name: &str, size_mib: Option<u32>) -> Result<Self::File, MediaError>;

    /// A handle onto the card's native block interface, used directly by
    /// `disk-raw` devices and by `disk-fat` devices once fast-mode
    /// promotion succeeds.
    fn block_device(&mut self) -> Self::Block;

    /// Brings up the Ethernet MAC/buffer chip for a configured link
    /// device.
    fn net_chip(&mut self) -> Self::Chip;
}

/// One of the three device kinds a target ID can present, generic over
/// the board's concrete file/block/chip types.
pub enum Device<F: SeekableFile, D: BlockDevice, N: NetChip> {
    Disk(Disk<F, D>),
    Optical(Optical<F>),
    Link(Link<N>),
}

impl<F: SeekableFile, D: BlockDevice, N: NetChip> Device<F, D, N> {
    fn service<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        match self {
            Device::Disk(d) => d.service(pins, phy, clock, timings),
            Device::Optical(o) => o.service(pins, phy, clock, timings),
            Device::Link(l) => l.service(pins, phy, clock, timings),
        }
    }

    fn service_reselected<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        if let Device::Link(l) = self {
            l.service_reselected(pins, phy, clock, timings);
        }
    }

    fn check_rx(&mut self, phy: &PhyState) {
        if let Device::Link(l) = self {
            l.check_rx(phy);
        }
    }

    fn poll_fast_promotion(&mut self) {
        if let Device::Disk(d) = self {
            d.poll_fast_promotion();
        }
    }
}

/// One populated target ID.
pub struct Slot<F: SeekableFile, D: BlockDevice, N: NetChip> {
    pub mask: u8,
    pub device: Device<F, D, N>,
}

/// Upper bound on simultaneously configured devices; mirrors
/// `scuznet_config::MAX_DEVICES`.
pub const MAX_DEVICES: usize = scuznet_config::MAX_DEVICES;

/// Builds the dispatch table from a parsed configuration. Disabled
/// entries (an `id` outside the legal 0-6 range) are skipped; the
/// returned mask is the OR of every populated device's ID bit, used by
/// [`Dispatcher::poll_selection`] as a cheap "is this selection for any
/// of ours" pre-check.
pub fn build_devices<M: MediaOpener>(
    config: &GlobalConfig,
    media: &mut M,
) -> Result<(heapless::Vec<Slot<M::File, M::Block, M::Chip>, MAX_DEVICES>, u8), InitError> {
    let mut devices = heapless::Vec::new();
    let mut combined_mask = 0u8;

    for entry in &config.devices {
        if !entry.enabled() {
            continue;
        }
        let mask = entry.mask();
        let device = build_one(entry, media)?;
        devices
            .push(Slot { mask, device })
            .map_err(|_| InitError::TooManyDevices)?;
        combined_mask |= mask;
    }

    Ok((devices, combined_mask))
}

fn build_one<M: MediaOpener>(
    entry: &DeviceEntry,
    media: &mut M,
) -> Result<Device<M::File, M::Block, M::Chip>, InitError> {
    match entry.kind {
        DeviceKind::DiskFat | DeviceKind::DiskRaw => {
            let (backend, capacity_blocks) = open_disk_backend(entry, media)?;
            Ok(Device::Disk(Disk::new(backend, capacity_blocks)))
        }
        DeviceKind::Optical => {
            let name = match &entry.backing {
                Backing::File(name) => name,
                Backing::RawLba(_) => return Err(InitError::OpticalNeedsFile),
            };
            let mut file = media.open_file(name, entry.size_mib)?;
            let capacity_sectors = (file_len(&mut file) / 2048) as u32;
            Ok(Device::Optical(Optical::new(file, capacity_sectors)))
        }
        DeviceKind::LinkNuvolink | DeviceKind::LinkDaynaport => {
            let protocol = if entry.kind == DeviceKind::LinkNuvolink {
                LinkProtocol::Nuvolink
            } else {
                LinkProtocol::Daynaport
            };
            let mac = entry.mac.unwrap_or([0; 6]);
            let chip = media.net_chip();
            Ok(Device::Link(Link::new(protocol, chip, mac)))
        }
    }
}

fn file_len<F: SeekableFile>(file: &mut F) -> u64 {
    file.len_bytes()
}

fn open_disk_backend<M: MediaOpener>(
    entry: &DeviceEntry,
    media: &mut M,
) -> Result<(drv_scsi_disk::backend::Backend<M::File, M::Block>, u32), InitError> {
    use drv_scsi_disk::backend::{AccessMode, Backend};

    match &entry.backing {
        Backing::RawLba(start_lba) => {
            let block = media.block_device();
            let capacity = entry
                .size_mib
                .map(|mib| mib.saturating_mul(2048))
                .unwrap_or_else(|| block.sector_count().saturating_sub(*start_lba));
            Ok((Backend::raw(block, *start_lba), capacity))
        }
        Backing::File(name) => {
            let mut file = media.open_file(name, entry.size_mib)?;
            let capacity = (file_len(&mut file) / 512) as u32;
            let block = media.block_device();
            let mode = match entry.mode {
                DiskMode::Normal | DiskMode::Cdrom => AccessMode::Normal,
                DiskMode::Fast => AccessMode::Fast,
                DiskMode::ForceFast => AccessMode::ForceFast,
            };
            Ok((Backend::file(file, block, mode), capacity))
        }
    }
}

/// The main loop itself: owns the device table, the reselection state
/// machine, and the falling-edge-of-BSY selection detector (spec.md
/// §4.2's selection path assumes an interrupt; a cooperative poll loop
/// reconstructs the same edge by remembering BSY's last-seen state).
pub struct Dispatcher<F: SeekableFile, D: BlockDevice, N: NetChip> {
    devices: heapless::Vec<Slot<F, D, N>, MAX_DEVICES>,
    combined_mask: u8,
    reselector: Reselector,
    reselect_target_mask: u8,
    prev_bsy: bool,
}

impl<F: SeekableFile, D: BlockDevice, N: NetChip> Dispatcher<F, D, N> {
    pub fn new(devices: heapless::Vec<Slot<F, D, N>, MAX_DEVICES>, combined_mask: u8) -> Self {
        Self {
            devices,
            combined_mask,
            reselector: Reselector::new(),
            reselect_target_mask: 0,
            prev_bsy: false,
        }
    }

    /// Runs one iteration of the main loop's poll: handles an
    /// in-progress transaction (fresh or reselected), otherwise polls
    /// for a new selection, and if neither, polls the between-selection
    /// work (link RX, fast-mode promotion, pending reselection).
    pub fn poll<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        if pins.is_asserted(Control::Rst) {
            ringbuf_entry!(Trace::ResetObserved);
            phy.hard_reset();
            self.reselector.start();
            pins.release_all();
            self.prev_bsy = false;
            return;
        }

        if phy.is_active() {
            if phy.is_continued() {
                self.service_active(pins, phy, clock, timings, true);
            } else {
                self.run_transaction(pins, phy, clock, timings);
            }
            return;
        }

        if self.poll_selection(pins, phy) {
            return;
        }

        for slot in self.devices.iter_mut() {
            slot.device.poll_fast_promotion();
        }
        self.poll_reselect(pins, phy, clock, timings);
    }

    fn service_active<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
        reselected: bool,
    ) {
        let mask = phy.active_target_mask();
        let Some(slot) = self.devices.iter_mut().find(|s| s.mask == mask) else {
            phase_change(pins, phy, clock, timings, Phase::BusFree);
            return;
        };
        if reselected {
            slot.device.service_reselected(pins, phy, clock, timings);
        } else {
            slot.device.service(pins, phy, clock, timings);
        }
    }

    /// Drives one freshly-selected transaction: an initial /ATN window
    /// (the initiator's IDENTIFY) followed by the device handler, then
    /// releases the bus if the handler didn't already (spec.md §5: the
    /// main loop owns everything past the selection edge except what
    /// the handler disposes of itself via DISCONNECT/ABORT/REJECT).
    fn run_transaction<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        if pins.is_asserted(Control::Atn) {
            match drv_scsi_logic::message_out(pins, phy, clock, timings) {
                drv_scsi_logic::MessageOutcome::BusDeviceReset => {
                    phy.hard_reset();
                    self.reselector.start();
                    return;
                }
                drv_scsi_logic::MessageOutcome::BusFree
                | drv_scsi_logic::MessageOutcome::Continue => {}
            }
        }

        if phy.is_active() {
            self.service_active(pins, phy, clock, timings, false);
        }

        if phy.is_active() {
            phase_change(pins, phy, clock, timings, Phase::BusFree);
        }
    }

    /// Checks for the falling edge of BSY with SEL asserted (spec.md
    /// §4.2's fast path) and, if it addresses one of our IDs, completes
    /// the selection handshake. Returns `true` if a selection was
    /// serviced this poll.
    fn poll_selection<P: PhyPins>(&mut self, pins: &mut P, phy: &PhyState) -> bool {
        let bsy = pins.is_asserted(Control::Bsy);
        let falling_edge = self.prev_bsy && !bsy;
        self.prev_bsy = bsy;

        if !falling_edge || !pins.is_asserted(Control::Sel) {
            return false;
        }

        let data = pins.read_data() & !INITIATOR_MASK;
        if data & self.combined_mask == 0 {
            return false;
        }

        for slot in self.devices.iter() {
            if selection_matches(data, slot.mask) {
                ringbuf_entry!(Trace::Selected(slot.mask));
                drv_scsi_phy::arbitration::selected(pins, phy, slot.mask);
                return true;
            }
        }
        false
    }

    /// Between-selection work: lets each device check for inbound data
    /// it wants to push (only the Nuvolink link device ever does), then
    /// steps the reselection state machine if one is pending or
    /// underway.
    fn poll_reselect<P: PhyPins, C: Clock>(
        &mut self,
        pins: &mut P,
        phy: &PhyState,
        clock: &mut C,
        timings: &ArbitrationTimings,
    ) {
        for slot in self.devices.iter_mut() {
            let was_pending = phy.reselect_pending();
            slot.device.check_rx(phy);
            if !was_pending && phy.reselect_pending() {
                self.reselect_target_mask = slot.mask;
            }
        }

        self.reselector.retry();
        if phy.reselect_pending() {
            self.reselector.begin(clock.now_ticks());
        }

        if matches!(self.reselector.state(), ReselectState::Idle) {
            return;
        }

        let won = self.reselector.step(
            pins,
            clock,
            timings,
            self.reselect_target_mask,
            INITIATOR_MASK,
        );
        if won {
            ringbuf_entry!(Trace::ReselectWon(self.reselect_target_mask));
            drv_scsi_phy::arbitration::complete_reselection(phy, self.reselect_target_mask);
            self.service_active(pins, phy, clock, timings, true);
            self.reselector.start();
        }
    }
}

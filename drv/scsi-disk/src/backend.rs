// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The dual storage path spec.md §4.4 and §9 describe: a device backed by
//! a FAT file normally goes through [`media::SeekableFile`], but once the
//! file is known to occupy one contiguous run of card sectors ("fast" /
//! "forcefast" modes) reads and writes bypass the filesystem entirely and
//! address the card directly. A raw-LBA-backed device always uses the
//! direct path from construction.

use core::cell::Cell;

use media::{BlockDevice, MediaError, SeekableFile};

/// Mirrors the INI `mode` key (spec.md §6) for a disk device. `Cdrom` has
/// no meaning here; `drv-scsi-optical` is always read-only and doesn't use
/// this type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessMode {
    Normal,
    Fast,
    ForceFast,
}

/// Where a device's 512-byte sectors actually live.
enum Storage<F: SeekableFile> {
    /// FAT file, `mode` governs whether we ever try to promote to direct
    /// sector access.
    File { file: F, mode: AccessMode },
    /// Raw card sectors starting at a fixed absolute LBA, per
    /// `Backing::RawLba` in `lib/scuznet-config`.
    Raw { start_lba: u32 },
}

/// A disk's storage backend: either a FAT file (with optional fast-mode
/// promotion to direct sector access) or a fixed raw-sector range.
pub struct Backend<F: SeekableFile, D: BlockDevice> {
    storage: Storage<F>,
    device: D,
    /// Absolute starting sector once direct access is confirmed available;
    /// `None` for a `File` backend still going through FAT, always `Some`
    /// for a `Raw` backend.
    fast_start: Cell<Option<u32>>,
}

impl<F: SeekableFile, D: BlockDevice> Backend<F, D> {
    pub fn file(file: F, device: D, mode: AccessMode) -> Self {
        Self {
            storage: Storage::File { file, mode },
            device,
            fast_start: Cell::new(None),
        }
    }

    pub fn raw(device: D, start_lba: u32) -> Self {
        Self {
            storage: Storage::Raw { start_lba },
            device,
            fast_start: Cell::new(Some(start_lba)),
        }
    }

    /// Attempts fast-mode promotion if this is a `File` backend in `Fast`
    /// or `ForceFast` mode and hasn't promoted yet. `ForceFast` retries
    /// every call (the original re-checks whenever the contiguity scan
    /// hasn't completed); `Fast` only ever tries once and falls back to
    /// FAT permanently if the file wasn't contiguous at that point.
    pub fn poll_fast_promotion(&mut self) {
        if self.fast_start.get().is_some() {
            return;
        }
        if let Storage::File { file, mode } = &self.storage {
            if *mode == AccessMode::Normal {
                return;
            }
            if let Some(start) = file.contiguous_start_sector() {
                self.fast_start.set(Some(start));
            }
        }
    }

    fn is_direct(&self) -> bool {
        self.fast_start.get().is_some()
    }

    /// Reads `count` consecutive 512-byte sectors starting at `lba` into
    /// `buf` (must be exactly `count as usize * 512` bytes long).
    pub fn read_sectors(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<(), MediaError> {
        debug_assert_eq!(buf.len(), count as usize * 512);
        if let Some(start) = self.fast_start.get() {
            let mut offset = start.wrapping_add(lba);
            for chunk in buf.chunks_mut(512) {
                let mut sector = [0u8; 512];
                self.device.read_sector(offset, &mut sector)?;
                chunk.copy_from_slice(&sector);
                offset = offset.wrapping_add(1);
            }
            return Ok(());
        }
        match &mut self.storage {
            Storage::File { file, .. } => {
                file.seek(lba as u64 * 512)?;
                file.read_exact(buf)
            }
            Storage::Raw { .. } => unreachable!("raw backend always has fast_start set"),
        }
    }

    pub fn write_sectors(&mut self, lba: u32, count: u16, buf: &[u8]) -> Result<(), MediaError> {
        debug_assert_eq!(buf.len(), count as usize * 512);
        if let Some(start) = self.fast_start.get() {
            let mut offset = start.wrapping_add(lba);
            for chunk in buf.chunks(512) {
                let mut sector = [0u8; 512];
                sector.copy_from_slice(chunk);
                self.device.write_sector(offset, &sector)?;
                offset = offset.wrapping_add(1);
            }
            return Ok(());
        }
        match &mut self.storage {
            Storage::File { file, .. } => {
                file.seek(lba as u64 * 512)?;
                file.write_exact(buf)
            }
            Storage::Raw { .. } => unreachable!("raw backend always has fast_start set"),
        }
    }

    /// SEEK: direct access has effectively free seeks (the card's own seek
    /// time is negligible), so only a FAT-backed device still on the slow
    /// path actually moves a file pointer.
    pub fn seek(&mut self, lba: u32) -> Result<(), MediaError> {
        if self.is_direct() {
            return Ok(());
        }
        match &mut self.storage {
            Storage::File { file, .. } => file.seek(lba as u64 * 512),
            Storage::Raw { .. } => unreachable!("raw backend always has fast_start set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media::test_doubles::{RamDisk, RamFile};

    #[test]
    fn file_backend_reads_through_fat_until_promoted() {
        let file = RamFile {
            data: std::vec![0xABu8; 1024],
            pos: 0,
            contiguous_start: None,
        };
        let device = RamDisk::new(4);
        let mut backend = Backend::file(file, device, AccessMode::Fast);
        backend.poll_fast_promotion();
        assert!(!backend.is_direct());
        let mut buf = [0u8; 512];
        backend.read_sectors(0, 1, &mut buf).unwrap();
        assert_eq!(buf, [0xABu8; 512]);
    }

    #[test]
    fn file_backend_promotes_and_switches_to_direct_sectors() {
        let file = RamFile {
            data: std::vec![0u8; 1024],
            pos: 0,
            contiguous_start: Some(2),
        };
        let mut device = RamDisk::new(8);
        device.sectors[5] = [0xCDu8; 512];
        let mut backend = Backend::file(file, device, AccessMode::Fast);
        backend.poll_fast_promotion();
        assert!(backend.is_direct());
        let mut buf = [0u8; 512];
        backend.read_sectors(3, 1, &mut buf).unwrap();
        assert_eq!(buf, [0xCDu8; 512]);
    }

    #[test]
    fn raw_backend_is_direct_from_construction() {
        let mut device = RamDisk::new(8);
        device.sectors[10] = [0x11u8; 512];
        let mut backend: Backend<RamFile, RamDisk> = Backend::raw(device, 8);
        let mut buf = [0u8; 512];
        backend.read_sectors(2, 1, &mut buf).unwrap();
        assert_eq!(buf, [0x11u8; 512]);
    }

    #[test]
    fn seek_is_free_once_direct() {
        let device = RamDisk::new(4);
        let mut backend: Backend<RamFile, RamDisk> = Backend::raw(device, 0);
        assert!(backend.seek(1_000_000).is_ok());
    }
}

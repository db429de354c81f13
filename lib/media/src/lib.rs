// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trait boundary towards the peripheral collaborators spec.md §1 calls
//! out as explicitly non-core: the memory-card block driver, the FAT
//! filesystem, and the streaming glue that pipes bytes between a file
//! and the SCSI bus without bouncing through an intermediate buffer.
//!
//! Nothing in this crate touches real hardware. `drv/scsi-disk` and
//! `drv/scsi-optical` are generic over these traits; a board crate
//! supplies the concrete card/filesystem implementation (out of scope
//! here, per spec.md §1).

#![cfg_attr(not(test), no_std)]

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MediaError {
    /// The card or filesystem reported a read/write failure.
    Io,
    /// The underlying hardware timed out (card driver timers run
    /// 200-1000ms per spec.md §5).
    Timeout,
    /// Request addressed a sector or offset outside the device.
    OutOfRange,
}

/// Native 512-byte sector access to the flash card, used directly by
/// `disk-raw` backed devices and indirectly (via `SeekableFile`) by
/// `disk-fat` ones.
pub trait BlockDevice {
    /// Total number of 512-byte sectors on the card.
    fn sector_count(&self) -> u32;

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; 512]) -> Result<(), MediaError>;
    fn write_sector(&mut self, lba: u32, buf: &[u8; 512]) -> Result<(), MediaError>;
}

/// A file opened on the FAT volume, seekable to a byte offset.
pub trait SeekableFile {
    fn len_bytes(&self) -> u64;
    fn seek(&mut self, offset: u64) -> Result<(), MediaError>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MediaError>;
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), MediaError>;

    /// Walks the cluster chain to determine whether this file occupies a
    /// perfectly contiguous run of card sectors. Returns the absolute
    /// starting sector if so. Used once, at fast-mode promotion time
    /// (spec.md §4.4); implementers may cache the result themselves.
    fn contiguous_start_sector(&self) -> Option<u32>;
}

/// A destination for bytes being streamed off the bus during DATA OUT /
/// MESSAGE OUT. The PHY drives this directly, byte by byte or in bulk,
/// so that neither the FAT file reader nor the Ethernet MAC buffer ever
/// needs an intermediate SRAM bounce buffer (spec.md §9).
pub trait ByteSink {
    fn put(&mut self, data: &[u8]) -> Result<(), MediaError>;
}

/// A source of bytes being streamed onto the bus during DATA IN /
/// MESSAGE IN. Mirrors [`ByteSink`].
pub trait ByteSource {
    /// Fills `buf` completely or returns an error; short reads are not
    /// part of this contract; the caller always knows the exact length
    /// of the transfer ahead of time (from the CDB or the chip's packet
    /// header).
    fn take(&mut self, buf: &mut [u8]) -> Result<(), MediaError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_doubles {
    //! In-memory stand-ins used by the device-handler unit tests. Not
    //! part of the public API; kept here rather than duplicated in every
    //! crate's test module.
    use super::*;
    use std::vec::Vec;

    pub struct RamDisk {
        pub sectors: Vec<[u8; 512]>,
        pub fail_at: Option<u32>,
    }

    impl RamDisk {
        pub fn new(sector_count: u32) -> Self {
            Self {
                sectors: std::vec![[0u8; 512]; sector_count as usize],
                fail_at: None,
            }
        }
    }

    impl BlockDevice for RamDisk {
        fn sector_count(&self) -> u32 {
            self.sectors.len() as u32
        }

        fn read_sector(&mut self, lba: u32, buf: &mut [u8; 512]) -> Result<(), MediaError> {
            if self.fail_at == Some(lba) {
                return Err(MediaError::Io);
            }
            let s = self.sectors.get(lba as usize).ok_or(MediaError::OutOfRange)?;
            buf.copy_from_slice(s);
            Ok(())
        }

        fn write_sector(&mut self, lba: u32, buf: &[u8; 512]) -> Result<(), MediaError> {
            if self.fail_at == Some(lba) {
                return Err(MediaError::Io);
            }
            let s = self
                .sectors
                .get_mut(lba as usize)
                .ok_or(MediaError::OutOfRange)?;
            s.copy_from_slice(buf);
            Ok(())
        }
    }

    pub struct RamFile {
        pub data: Vec<u8>,
        pub pos: u64,
        pub contiguous_start: Option<u32>,
    }

    impl SeekableFile for RamFile {
        fn len_bytes(&self) -> u64 {
            self.data.len() as u64
        }

        fn seek(&mut self, offset: u64) -> Result<(), MediaError> {
            if offset > self.data.len() as u64 {
                return Err(MediaError::OutOfRange);
            }
            self.pos = offset;
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MediaError> {
            let start = self.pos as usize;
            let end = start + buf.len();
            if end > self.data.len() {
                return Err(MediaError::OutOfRange);
            }
            buf.copy_from_slice(&self.data[start..end]);
            self.pos = end as u64;
            Ok(())
        }

        fn write_exact(&mut self, buf: &[u8]) -> Result<(), MediaError> {
            let start = self.pos as usize;
            let end = start + buf.len();
            if end > self.data.len() {
                self.data.resize(end, 0);
            }
            self.data[start..end].copy_from_slice(buf);
            self.pos = end as u64;
            Ok(())
        }

        fn contiguous_start_sector(&self) -> Option<u32> {
            self.contiguous_start
        }
    }
}

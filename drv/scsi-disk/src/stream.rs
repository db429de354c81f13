// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`ByteSource`]/[`ByteSink`] adapters that pull/push whole 512-byte
//! sectors through [`Backend`] a sector at a time, so a multi-sector READ
//! or WRITE never needs to materialize the whole transfer in RAM (spec.md
//! §9: no intermediate SRAM bounce buffer).

use media::{BlockDevice, ByteSink, ByteSource, MediaError, SeekableFile};

use crate::backend::Backend;

pub struct SectorSource<'a, F: SeekableFile, D: BlockDevice> {
    backend: &'a mut Backend<F, D>,
    next_lba: u32,
    buf: [u8; 512],
    buf_valid: usize,
    buf_pos: usize,
}

impl<'a, F: SeekableFile, D: BlockDevice> SectorSource<'a, F, D> {
    pub fn new(backend: &'a mut Backend<F, D>, start_lba: u32) -> Self {
        Self {
            backend,
            next_lba: start_lba,
            buf: [0u8; 512],
            buf_valid: 0,
            buf_pos: 0,
        }
    }
}

impl<'a, F: SeekableFile, D: BlockDevice> ByteSource for SectorSource<'a, F, D> {
    fn take(&mut self, buf: &mut [u8]) -> Result<(), MediaError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.buf_pos == self.buf_valid {
                self.backend.read_sectors(self.next_lba, 1, &mut self.buf)?;
                self.next_lba = self.next_lba.wrapping_add(1);
                self.buf_pos = 0;
                self.buf_valid = self.buf.len();
            }
            let take = (buf.len() - filled).min(self.buf_valid - self.buf_pos);
            buf[filled..filled + take].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + take]);
            self.buf_pos += take;
            filled += take;
        }
        Ok(())
    }
}

pub struct SectorSink<'a, F: SeekableFile, D: BlockDevice> {
    backend: &'a mut Backend<F, D>,
    next_lba: u32,
    buf: [u8; 512],
    buf_filled: usize,
}

impl<'a, F: SeekableFile, D: BlockDevice> SectorSink<'a, F, D> {
    pub fn new(backend: &'a mut Backend<F, D>, start_lba: u32) -> Self {
        Self {
            backend,
            next_lba: start_lba,
            buf: [0u8; 512],
            buf_filled: 0,
        }
    }
}

impl<'a, F: SeekableFile, D: BlockDevice> ByteSink for SectorSink<'a, F, D> {
    fn put(&mut self, data: &[u8]) -> Result<(), MediaError> {
        let mut consumed = 0;
        while consumed < data.len() {
            let take = (data.len() - consumed).min(512 - self.buf_filled);
            self.buf[self.buf_filled..self.buf_filled + take].copy_from_slice(&data[consumed..consumed + take]);
            self.buf_filled += take;
            consumed += take;
            if self.buf_filled == 512 {
                self.backend.write_sectors(self.next_lba, 1, &self.buf)?;
                self.next_lba = self.next_lba.wrapping_add(1);
                self.buf_filled = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AccessMode;
    use media::test_doubles::{RamDisk, RamFile};

    #[test]
    fn source_streams_across_sector_boundary_with_odd_chunk_size() {
        let mut data = std::vec![0u8; 1024];
        data[511] = 0xAA;
        data[512] = 0xBB;
        let file = RamFile {
            data,
            pos: 0,
            contiguous_start: None,
        };
        let mut backend = Backend::file(file, RamDisk::new(4), AccessMode::Normal);
        let mut source = SectorSource::new(&mut backend, 0);
        let mut out = [0u8; 1024];
        // take in 64-byte chunks, same as offer_bulk does
        for chunk in out.chunks_mut(64) {
            source.take(chunk).unwrap();
        }
        assert_eq!(out[511], 0xAA);
        assert_eq!(out[512], 0xBB);
    }

    #[test]
    fn sink_only_writes_once_a_full_sector_is_buffered() {
        let file = RamFile {
            data: std::vec![0u8; 1024],
            pos: 0,
            contiguous_start: None,
        };
        let mut backend = Backend::file(file, RamDisk::new(4), AccessMode::Normal);
        {
            let mut sink = SectorSink::new(&mut backend, 0);
            for chunk in [0xEEu8; 1024].chunks(64) {
                sink.put(chunk).unwrap();
            }
        }
        let mut buf = [0u8; 1024];
        backend.read_sectors(0, 2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xEE));
    }
}

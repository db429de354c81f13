// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware seam towards the Ethernet MAC/buffer chip, spec.md §4.7.
//! `drv-scsi-link` only knows how to frame SCSI around packets; it has
//! no idea that the chip behind [`NetChip`] is an ENC28J60 (that's
//! `drv-enc28j60`'s job) or what bus it's attached to.

use media::{ByteSink, ByteSource, MediaError};

/// The two alternating transmit buffer regions inside the chip, per
/// spec.md §4.7 ("alternate between two TX buffer regions each call").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxBuffer {
    A,
    B,
}

impl TxBuffer {
    pub fn next(self) -> Self {
        match self {
            TxBuffer::A => TxBuffer::B,
            TxBuffer::B => TxBuffer::A,
        }
    }
}

/// The fixed 6-byte receive status header every queued packet starts
/// with: next-packet pointer, byte length, and two status bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct PacketHeader {
    pub next_packet: u16,
    pub length: u16,
    /// True if the chip's receive-status bits mark this frame as
    /// broadcast or multicast (spec.md §4.7's flags-byte 0x21 case).
    pub broadcast_or_multicast: bool,
}

/// Narrow trait boundary onto the Ethernet MAC+buffer chip. A board
/// crate's `drv-enc28j60` (or any other chip) implements this; nothing
/// here assumes SPI, register banks, or any particular silicon.
pub trait NetChip {
    /// Number of packets currently queued in the receive ring
    /// (ENC28J60's EPKTCNT, or equivalent).
    fn pending_packets(&mut self) -> u8;

    /// Cheap, ISR-line-level check for "at least one packet pending",
    /// used by the main loop's poll between selections (spec.md §4.7).
    fn packet_pending_line(&self) -> bool;

    /// Begins reading the packet at the current RX read pointer and
    /// returns its header. The chip is left positioned to stream the
    /// packet body immediately afterward.
    fn start_read(&mut self) -> PacketHeader;

    /// Reads `buf.len()` further bytes of the current packet.
    fn read_bytes(&mut self, buf: &mut [u8]);

    /// Ends the current read operation (releases the chip's internal
    /// read cursor; does not move the RX ring pointer).
    fn end_read(&mut self);

    /// Advances the RX ring's read pointer past a consumed packet and
    /// decrements the chip's packet counter.
    fn advance_past_packet(&mut self, next_packet: u16);

    /// Begins writing into one of the two TX buffer regions.
    fn start_write(&mut self, buffer: TxBuffer);

    /// Writes further bytes into the buffer opened by `start_write`.
    fn write_bytes(&mut self, data: &[u8]);

    /// Ends the current write operation.
    fn end_write(&mut self);

    /// Instructs the chip to transmit `length` bytes (including any
    /// leading status byte already written) from `buffer`.
    fn transmit(&mut self, buffer: TxBuffer, length: u16);

    /// Reprograms the receive filter: `multicast` true accepts
    /// unicast+multicast+broadcast, false accepts unicast+broadcast
    /// only (spec.md §4.7's SET FILTER / SET MULTICAST FILTER).
    fn set_multicast_filter(&mut self, multicast: bool);
}

/// Adapts an already-opened chip read into a [`ByteSource`], so the PHY
/// can stream packet data directly onto the bus with no SRAM bounce
/// buffer (spec.md §9).
pub struct ChipSource<'a, N: NetChip> {
    chip: &'a mut N,
}

impl<'a, N: NetChip> ChipSource<'a, N> {
    pub fn new(chip: &'a mut N) -> Self {
        Self { chip }
    }
}

impl<'a, N: NetChip> ByteSource for ChipSource<'a, N> {
    fn take(&mut self, buf: &mut [u8]) -> Result<(), MediaError> {
        self.chip.read_bytes(buf);
        Ok(())
    }
}

/// Adapts an already-opened chip write into a [`ByteSink`], so an
/// initiator's SEND PACKET streams directly into the chip's TX buffer.
pub struct ChipSink<'a, N: NetChip> {
    chip: &'a mut N,
}

impl<'a, N: NetChip> ChipSink<'a, N> {
    pub fn new(chip: &'a mut N) -> Self {
        Self { chip }
    }
}

impl<'a, N: NetChip> ByteSink for ChipSink<'a, N> {
    fn put(&mut self, data: &[u8]) -> Result<(), MediaError> {
        self.chip.write_bytes(data);
        Ok(())
    }
}

/// In-memory [`NetChip`] double for host-side tests. Exposed outside
/// this crate's own test builds behind `test-support` so `app/scuznet`
/// can exercise its dispatch loop against the same stand-in.
#[cfg(any(test, feature = "test-support"))]
pub mod tests_support {
    use super::{NetChip, PacketHeader, TxBuffer};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct QueuedPacket {
        data: Vec<u8>,
        broadcast_or_multicast: bool,
        cursor: usize,
    }

    /// A trivial RX-ring-of-one-at-a-time, TX-sink-to-nowhere stand-in
    /// for the ENC28J60. Tests queue packets with [`MockChip::queue_packet`]
    /// and inspect transmitted bytes via `last_tx`.
    #[derive(Default)]
    pub struct MockChip {
        rx: VecDeque<QueuedPacket>,
        pub last_tx: Vec<u8>,
        pub last_tx_buffer: Option<TxBuffer>,
        pub filter_multicast: bool,
        write_scratch: Vec<u8>,
    }

    impl MockChip {
        pub fn queue_packet(&mut self, data: &[u8], broadcast_or_multicast: bool) {
            self.rx.push_back(QueuedPacket {
                data: data.to_vec(),
                broadcast_or_multicast,
                cursor: 0,
            });
        }
    }

    impl NetChip for MockChip {
        fn pending_packets(&mut self) -> u8 {
            self.rx.len() as u8
        }

        fn packet_pending_line(&self) -> bool {
            !self.rx.is_empty()
        }

        fn start_read(&mut self) -> PacketHeader {
            let front = self.rx.front().expect("start_read with no packet queued");
            PacketHeader {
                next_packet: 0,
                length: front.data.len() as u16,
                broadcast_or_multicast: front.broadcast_or_multicast,
            }
        }

        fn read_bytes(&mut self, buf: &mut [u8]) {
            let front = self.rx.front_mut().expect("read_bytes with no packet queued");
            let n = buf.len().min(front.data.len() - front.cursor);
            buf[..n].copy_from_slice(&front.data[front.cursor..front.cursor + n]);
            front.cursor += n;
        }

        fn end_read(&mut self) {}

        fn advance_past_packet(&mut self, _next_packet: u16) {
            self.rx.pop_front();
        }

        fn start_write(&mut self, buffer: TxBuffer) {
            self.last_tx_buffer = Some(buffer);
            self.write_scratch.clear();
        }

        fn write_bytes(&mut self, data: &[u8]) {
            self.write_scratch.extend_from_slice(data);
        }

        fn end_write(&mut self) {}

        fn transmit(&mut self, _buffer: TxBuffer, _length: u16) {
            self.last_tx = self.write_scratch.clone();
        }

        fn set_multicast_filter(&mut self, multicast: bool) {
            self.filter_multicast = multicast;
        }
    }
}

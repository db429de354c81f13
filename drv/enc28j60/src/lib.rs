// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the Microchip ENC28J60 Ethernet MAC+buffer chip, spec.md
//! §4.8. Implements `drv-scsi-link`'s [`NetChip`] trait over the raw
//! [`SpiBus`] seam in `bus::SpiBus`; a board crate only has to supply
//! the SPI shift-register and chip-select/reset lines.
//!
//! The chip exposes its register set as a flat address space split
//! across four banks (selected via `ECON1.BSEL`) plus a handful of
//! always-addressable registers (`EIE`/`EIR`/`ESTAT`/`ECON1`/`ECON2`).
//! `current_bank` shadows the chip's actual bank selection so callers
//! can address registers by their bank-tagged constant without caring
//! which bank is currently active (spec.md §4.8a), the same pattern
//! `drv-ksz8463` uses for its own banked register set.

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod registers;

use bus::SpiBus;
use drv_scsi_link::chip::{NetChip, PacketHeader, TxBuffer};
use registers as reg;
use ringbuf::*;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Init,
    BankSwitch(u8),
    Transmit(TxBuffer, u16),
    RxHeader(u16, u16),
    SetFilter(bool),
}
ringbuf!(Trace, 16, Trace::None);

/// Number of microseconds the MIIM interface needs between asserting
/// `MICMD.MIIRD` and reading back `MIRDL`/`MIRDH` (datasheet 3.3.1,
/// spec.md §4.8: "waits ≥10.24 µs"). Expressed as a tick count so a
/// board can provide whatever granularity its timer has; boards using
/// a 1MHz tick pass 11 here directly.
pub trait MicroDelay {
    fn delay_us(&mut self, us: u32);
}

/// Reads the chip's `/INT` line, inverted so that "asserted" reads
/// true (`original_source/enc.c`'s `PORT_INVEN_bm` setup makes the
/// same simplification). This is a bare GPIO read, not an SPI
/// transaction, which is why `NetChip::packet_pending_line` can offer
/// it behind `&self` even though every other chip access needs
/// `&mut self`.
pub trait IrqPin {
    fn is_asserted(&self) -> bool;
}

/// Driver for one ENC28J60 behind `B: SpiBus`, with delays driven by
/// `D: MicroDelay` and the packet-pending line read via `P: IrqPin`.
/// Holds no buffer memory itself — all packet data lives on the chip;
/// this struct is just register-level plumbing plus the bank shadow.
pub struct Enc28j60<B: SpiBus, D: MicroDelay, P: IrqPin> {
    bus: B,
    delay: D,
    irq: P,
    current_bank: u8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhyError {
    Busy,
    Scanning,
}

impl<B: SpiBus, D: MicroDelay, P: IrqPin> Enc28j60<B, D, P> {
    /// Brings up the SPI bus and hard-resets the chip. Does not yet
    /// program RX/TX/filter/MAC registers; call [`Self::setup`] for
    /// that once constructed (mirrors `enc_init()` followed by
    /// `net_setup()` in the original firmware).
    pub fn new(bus: B, delay: D, irq: P) -> Self {
        let mut chip = Self {
            bus,
            delay,
            irq,
            current_bank: 0,
        };
        chip.bus.hard_reset();
        ringbuf_entry!(Trace::Init);
        chip
    }

    fn select_bank(&mut self, bank: u8) {
        let bank = bank & 0x03;
        if self.current_bank != bank {
            let mut cur = self.read_unbanked(reg::ECON1);
            cur = (cur & !(reg::ECON1_BSEL1 | reg::ECON1_BSEL0)) | bank;
            self.write_unbanked(reg::ECON1, cur);
            self.current_bank = bank;
            ringbuf_entry!(Trace::BankSwitch(bank));
        }
    }

    fn maybe_switch_bank(&mut self, register: u8) {
        // EIE/EIR/ESTAT/ECON2/ECON1 (0x1B-0x1F) are unbanked; everything
        // else (including all MAC/MII registers) needs the bank set
        // first (`enc_bank` in `original_source/enc.c`).
        let addr = register & reg::REG_MASK;
        if addr < 0x1B {
            self.select_bank(reg::bank(register));
        }
    }

    fn exchange(&mut self, opcode: u8, arg: u8, data: u8) -> u8 {
        let mut buf = [opcode | arg, data];
        self.bus.select();
        self.bus.transfer(&mut buf);
        self.bus.deselect();
        buf[1]
    }

    /// RCR against a MAC/MII register needs one extra dummy byte
    /// clocked out before the real data appears (datasheet 4.2.1).
    fn exchange_special(&mut self, opcode: u8, arg: u8) -> u8 {
        let mut buf = [opcode | arg, 0u8, 0u8];
        self.bus.select();
        self.bus.transfer(&mut buf);
        self.bus.deselect();
        buf[2]
    }

    fn read_unbanked(&mut self, register: u8) -> u8 {
        let addr = register & reg::REG_MASK;
        if reg::is_mac_or_mii(register) {
            self.exchange_special(reg::OP_RCR, addr)
        } else {
            self.exchange(reg::OP_RCR, addr, 0)
        }
    }

    fn write_unbanked(&mut self, register: u8, value: u8) {
        let addr = register & reg::REG_MASK;
        self.exchange(reg::OP_WCR, addr, value);
    }

    /// Reads an ETH, MAC, or MII register, switching banks first if
    /// needed (spec.md §4.8: "provides read/write/set-bits/clear-bits
    /// for non-PHY registers").
    pub fn read(&mut self, register: u8) -> u8 {
        self.maybe_switch_bank(register);
        self.read_unbanked(register)
    }

    pub fn write(&mut self, register: u8, value: u8) {
        self.maybe_switch_bank(register);
        self.write_unbanked(register, value);
        if register & reg::REG_MASK == reg::ECON1 & reg::REG_MASK && !reg::is_mac_or_mii(register)
        {
            self.current_bank = value & 0x03;
        }
    }

    /// BFS/BFC only work on ETH registers (not MAC/MII), per the
    /// datasheet and `original_source/enc.c`'s silent-failure note.
    pub fn set_bits(&mut self, register: u8, mask: u8) {
        if reg::is_mac_or_mii(register) {
            return;
        }
        self.maybe_switch_bank(register);
        self.exchange(reg::OP_BFS, register & reg::REG_MASK, mask);
    }

    pub fn clear_bits(&mut self, register: u8, mask: u8) {
        if reg::is_mac_or_mii(register) {
            return;
        }
        self.maybe_switch_bank(register);
        self.exchange(reg::OP_BFC, register & reg::REG_MASK, mask);
    }

    /// Reads a PHY (MIIM) register, per datasheet 3.3.1 / spec.md §4.8:
    /// set MIREGADR, set MICMD.MIIRD, wait ≥10.24µs, clear MIIRD, read
    /// MIRDL/MIRDH.
    pub fn phy_read(&mut self, phy_register: u8) -> Result<u16, PhyError> {
        let status = self.read(reg::MISTAT);
        if status & registers::MISTAT_BUSY != 0 {
            return Err(PhyError::Busy);
        }
        self.write(reg::MIREGADR, phy_register);
        self.write(reg::MICMD, reg::MICMD_MIIRD);
        self.delay.delay_us(11);
        self.write(reg::MICMD, 0);
        let lo = self.read(reg::MIRDL) as u16;
        let hi = self.read(reg::MIRDH) as u16;
        Ok(lo | (hi << 8))
    }

    /// Writes a PHY register. Per spec.md §4.8, skips the post-write
    /// settle delay — it is the caller's job to wait before the next
    /// MIIM access.
    pub fn phy_write(&mut self, phy_register: u8, value: u16) -> Result<(), PhyError> {
        let status = self.read(reg::MISTAT);
        if status & registers::MISTAT_BUSY != 0 {
            return Err(PhyError::Busy);
        }
        self.write(reg::MIREGADR, phy_register);
        self.write(reg::MIWRL, value as u8);
        self.write(reg::MIWRH, (value >> 8) as u8);
        Ok(())
    }

    /// Opens a streaming read from the chip's current read pointer
    /// (`ERDPT`), handing back a cursor over the SPI bus directly so
    /// the PHY can feed REQ/ACK without an SRAM bounce buffer (spec.md
    /// §4.8, §9).
    fn start_bulk_read(&mut self) {
        self.bus.select();
        let mut op = [reg::OP_RBM];
        self.bus.transfer(&mut op);
    }

    fn bulk_read_bytes(&mut self, buf: &mut [u8]) {
        self.bus.transfer(buf);
    }

    fn end_bulk_read(&mut self) {
        self.bus.deselect();
    }

    fn start_bulk_write(&mut self) {
        self.bus.select();
        let mut op = [reg::OP_WBM];
        self.bus.transfer(&mut op);
    }

    fn bulk_write_bytes(&mut self, data: &[u8]) {
        let mut scratch = [0u8; 1];
        for &b in data {
            scratch[0] = b;
            self.bus.transfer(&mut scratch);
        }
    }

    fn end_bulk_write(&mut self) {
        self.bus.deselect();
    }

    /// Parses the fixed 6-byte packet header every queued frame starts
    /// with: next-packet pointer (little-endian), byte length, and two
    /// status bytes (`net_process_header` in `original_source/net.c`).
    fn parse_header(raw: &[u8; 6]) -> (u16, u16, u8, u8) {
        let next_packet = u16::from(raw[0]) | (u16::from(raw[1]) << 8);
        let length = u16::from(raw[2]) | (u16::from(raw[3]) << 8);
        (next_packet, length, raw[4], raw[5])
    }

    /// Moves the RX read pointer past a consumed packet, respecting
    /// the "pointer must be odd" errata (`net_move_rxpt` in
    /// `original_source/net.c`): writes `next - 1`, wrapping to the
    /// ring end when `next == 0`.
    fn move_rx_read_pointer(&mut self, next: u16) {
        let erxrdpt = if next == 0 {
            (u16::from(reg::ERXNDH_VALUE) << 8) | 0x00FF
        } else {
            next.wrapping_sub(1)
        };
        self.write(reg::ERXRDPTL, erxrdpt as u8);
        self.write(reg::ERXRDPTH, (erxrdpt >> 8) as u8);
    }

    /// Full chip bring-up: RX ring, filters, MAC/PHY configuration,
    /// interrupt enables. Grounded on `net_setup()` in
    /// `original_source/net.c`; `mac` is the 6-byte address to program.
    pub fn setup(&mut self, mac: &[u8; 6]) {
        // 6.1: RX ring spans 0x0000-0x13FF (errata 5: start at zero).
        self.write(reg::ERXSTL, 0x00);
        self.write(reg::ERXSTH, 0x00);
        self.write(reg::ERXNDL, 0xFF);
        self.write(reg::ERXNDH, reg::ERXNDH_VALUE);
        // errata 14: ERXRDPT must be odd.
        self.write(reg::ERXRDPTL, 0xFF);
        self.write(reg::ERXRDPTH, reg::ERXNDH_VALUE);
        self.write(reg::ERDPTL, 0x00);
        self.write(reg::ERDPTH, 0x00);

        // 6.3: unicast + CRC-valid only, to start.
        self.write(reg::ERXFCON, reg::ERXFCON_UCEN | reg::ERXFCON_CRCEN);

        // 6.4: wait for the oscillator.
        while self.read(reg::ESTAT) & reg::ESTAT_CLKRDY == 0 {}

        // 6.5: half-duplex MAC.
        self.write(reg::MACON1, reg::MACON1_MARXEN);
        self.write(reg::MACON3, reg::MACON3_PADCFG0 | reg::MACON3_TXCRCEN);
        self.write(reg::MACON4, reg::MACON4_DEFER);
        self.write(reg::MABBIPG, 0x12);
        self.write(reg::MAIPGL, 0x12);
        self.write(reg::MAIPGH, 0x0C);
        self.write(reg::MAADR1, mac[0]);
        self.write(reg::MAADR2, mac[1]);
        self.write(reg::MAADR3, mac[2]);
        self.write(reg::MAADR4, mac[3]);
        self.write(reg::MAADR5, mac[4]);
        self.write(reg::MAADR6, mac[5]);

        // 6.6: force half-duplex PHY (errata 16: auto-polarity is
        // unreliable).
        let _ = self.phy_write(reg::PHY_PHCON1, 0);
        self.delay.delay_us(12);
        let _ = self.phy_write(reg::PHY_PHCON2, reg::PHCON2_HDLDIS);
        self.delay.delay_us(12);

        self.write(reg::EIE, reg::EIE_PKTIE | reg::EIE_INTIE);
        self.set_bits(reg::ECON1, reg::ECON1_RXEN);
    }
}

impl<B: SpiBus, D: MicroDelay, P: IrqPin> NetChip for Enc28j60<B, D, P> {
    fn pending_packets(&mut self) -> u8 {
        self.read(reg::EPKTCNT)
    }

    fn packet_pending_line(&self) -> bool {
        self.irq.is_asserted()
    }

    fn start_read(&mut self) -> PacketHeader {
        self.start_bulk_read();
        let mut raw = [0u8; 6];
        self.bulk_read_bytes(&mut raw);
        let (next_packet, length, _statl, stath) = Self::parse_header(&raw);
        ringbuf_entry!(Trace::RxHeader(next_packet, length));
        // RSV bit 7 of the upper status byte marks broadcast/multicast
        // per the ENC28J60 receive status vector layout.
        let broadcast_or_multicast = stath & 0x80 != 0;
        PacketHeader {
            next_packet,
            length,
            broadcast_or_multicast,
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8]) {
        self.bulk_read_bytes(buf);
    }

    fn end_read(&mut self) {
        self.end_bulk_read();
    }

    fn advance_past_packet(&mut self, next_packet: u16) {
        self.move_rx_read_pointer(next_packet);
        self.set_bits(reg::ECON2, reg::ECON2_PKTDEC);
    }

    fn start_write(&mut self, buffer: TxBuffer) {
        let start = match buffer {
            TxBuffer::A => reg::XMIT_BUF_A,
            TxBuffer::B => reg::XMIT_BUF_B,
        };
        self.write(reg::EWRPTL, 0x00);
        self.write(reg::EWRPTH, start);
        self.start_bulk_write();
    }

    fn write_bytes(&mut self, data: &[u8]) {
        self.bulk_write_bytes(data);
    }

    fn end_write(&mut self) {
        self.end_bulk_write();
    }

    fn transmit(&mut self, buffer: TxBuffer, length: u16) {
        ringbuf_entry!(Trace::Transmit(buffer, length));
        // Errata 12: reset the TX logic first to avoid a stalled send.
        self.set_bits(reg::ECON1, reg::ECON1_TXRST);
        self.clear_bits(reg::ECON1, reg::ECON1_TXRST);
        self.clear_bits(reg::EIR, reg::EIR_TXERIF);

        let start = match buffer {
            TxBuffer::A => reg::XMIT_BUF_A,
            TxBuffer::B => reg::XMIT_BUF_B,
        };
        self.write(reg::ETXSTL, 0x00);
        self.write(reg::ETXSTH, start);
        let end = (u16::from(start) << 8) + length - 1;
        self.write(reg::ETXNDL, end as u8);
        self.write(reg::ETXNDH, (end >> 8) as u8);

        self.set_bits(reg::ECON1, reg::ECON1_TXRTS);
    }

    fn set_multicast_filter(&mut self, multicast: bool) {
        ringbuf_entry!(Trace::SetFilter(multicast));
        let flags = if multicast {
            reg::ERXFCON_UCEN | reg::ERXFCON_CRCEN | reg::ERXFCON_MCEN | reg::ERXFCON_BCEN
        } else {
            reg::ERXFCON_UCEN | reg::ERXFCON_CRCEN | reg::ERXFCON_BCEN
        };
        self.write(reg::ERXFCON, flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockSpiBus;

    struct NoDelay;
    impl MicroDelay for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    struct NoIrq;
    impl IrqPin for NoIrq {
        fn is_asserted(&self) -> bool {
            false
        }
    }

    fn chip() -> Enc28j60<MockSpiBus, NoDelay, NoIrq> {
        Enc28j60::new(MockSpiBus::default(), NoDelay, NoIrq)
    }

    #[test]
    fn new_hard_resets_the_bus() {
        let c = chip();
        assert_eq!(c.bus.reset_count, 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut c = chip();
        c.write(reg::ERXSTL, 0xAB);
        assert_eq!(c.read(reg::ERXSTL), 0xAB);
    }

    #[test]
    fn bank_switch_happens_only_when_needed() {
        let mut c = chip();
        // EIE/ECON1 etc. are unbanked and never trigger a switch.
        c.write(reg::EIE, 0x01);
        assert_eq!(c.current_bank, 0);
        // MAADR1 lives in bank 3.
        c.write(reg::MAADR1, 0x11);
        assert_eq!(c.current_bank, 3);
        c.write(reg::MAADR2, 0x22);
        assert_eq!(c.current_bank, 3);
    }

    #[test]
    fn set_and_clear_bits_are_noops_on_mac_registers() {
        let mut c = chip();
        c.write(reg::MACON1, 0x00);
        c.set_bits(reg::MACON1, 0xFF);
        assert_eq!(c.read(reg::MACON1), 0x00);
    }

    #[test]
    fn phy_write_then_read_via_miim_shadow() {
        let mut c = chip();
        c.phy_write(reg::PHY_PHCON2, 0x0100).unwrap();
        // The mock just records register writes; MIWRL/MIWRH hold the
        // low/high bytes actually clocked out.
        assert_eq!(c.read(reg::MIWRH), 0x01);
    }

    #[test]
    fn phy_read_reports_busy() {
        let mut c = chip();
        c.write(reg::MISTAT, registers::MISTAT_BUSY);
        assert_eq!(c.phy_read(reg::PHY_PHCON1), Err(PhyError::Busy));
    }

    #[test]
    fn move_rx_read_pointer_respects_odd_errata() {
        let mut c = chip();
        c.move_rx_read_pointer(0x0100);
        assert_eq!(c.read(reg::ERXRDPTL), 0xFF);
        assert_eq!(c.read(reg::ERXRDPTH), 0x00);
    }

    #[test]
    fn move_rx_read_pointer_wraps_at_zero() {
        let mut c = chip();
        c.move_rx_read_pointer(0);
        assert_eq!(c.read(reg::ERXRDPTL), 0xFF);
        assert_eq!(c.read(reg::ERXRDPTH), reg::ERXNDH_VALUE);
    }

    #[test]
    fn transmit_selects_requested_buffer_and_sets_length() {
        let mut c = chip();
        c.transmit(TxBuffer::B, 64);
        let lo = c.read(reg::ETXNDL) as u16;
        let hi = (c.read(reg::ETXNDH) as u16) << 8;
        let end = hi | lo;
        let expected = (u16::from(reg::XMIT_BUF_B) << 8) + 64 - 1;
        assert_eq!(end, expected);
    }

    #[test]
    fn set_multicast_filter_toggles_mcen() {
        let mut c = chip();
        c.set_multicast_filter(true);
        assert_eq!(c.read(reg::ERXFCON) & reg::ERXFCON_MCEN, reg::ERXFCON_MCEN);
        c.set_multicast_filter(false);
        assert_eq!(c.read(reg::ERXFCON) & reg::ERXFCON_MCEN, 0);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register addresses and bit flags, carried over from
//! `original_source/enc.h`. Bit 7 of a register address distinguishes
//! MAC/MII registers (unbanked read semantics) from ETH registers; bits
//! 6:5 give the bank for banked registers.

pub const OP_RCR: u8 = 0x00;
pub const OP_RBM: u8 = 0x3A;
pub const OP_WCR: u8 = 0x40;
pub const OP_WBM: u8 = 0x7A;
pub const OP_BFS: u8 = 0x80;
pub const OP_BFC: u8 = 0xA0;
pub const OP_SRC: u8 = 0xFF;

pub const EIE: u8 = 0x1B;
pub const EIR: u8 = 0x1C;
pub const ESTAT: u8 = 0x1D;
pub const ECON2: u8 = 0x1E;
pub const ECON1: u8 = 0x1F;
pub const ERDPTL: u8 = 0x00;
pub const ERDPTH: u8 = 0x01;
pub const EWRPTL: u8 = 0x02;
pub const EWRPTH: u8 = 0x03;
pub const ETXSTL: u8 = 0x04;
pub const ETXSTH: u8 = 0x05;
pub const ETXNDL: u8 = 0x06;
pub const ETXNDH: u8 = 0x07;
pub const ERXSTL: u8 = 0x08;
pub const ERXSTH: u8 = 0x09;
pub const ERXNDL: u8 = 0x0A;
pub const ERXNDH: u8 = 0x0B;
pub const ERXRDPTL: u8 = 0x0C;
pub const ERXRDPTH: u8 = 0x0D;
pub const ERXFCON: u8 = 0x38;
pub const EPKTCNT: u8 = 0x39;
pub const MACON1: u8 = 0xC0;
pub const MACON3: u8 = 0xC2;
pub const MACON4: u8 = 0xC3;
pub const MABBIPG: u8 = 0xC4;
pub const MAIPGL: u8 = 0xC6;
pub const MAIPGH: u8 = 0xC7;
pub const MICMD: u8 = 0xD2;
pub const MIREGADR: u8 = 0xD4;
pub const MIWRL: u8 = 0xD6;
pub const MIWRH: u8 = 0xD7;
pub const MIRDL: u8 = 0xD8;
pub const MIRDH: u8 = 0xD9;
pub const MAADR5: u8 = 0xE0;
pub const MAADR6: u8 = 0xE1;
pub const MAADR3: u8 = 0xE2;
pub const MAADR4: u8 = 0xE3;
pub const MAADR1: u8 = 0xE4;
pub const MAADR2: u8 = 0xE5;
pub const MISTAT: u8 = 0xEA;

/// Mask to get just the register address out of one of the constants
/// above (bits 4:0; bits 6:5 are the bank, bit 7 the MAC/MII flag).
pub const REG_MASK: u8 = 0x1F;

pub const ECON1_TXRST: u8 = 1 << 7;
pub const ECON1_RXRST: u8 = 1 << 6;
pub const ECON1_TXRTS: u8 = 1 << 3;
pub const ECON1_RXEN: u8 = 1 << 2;
pub const ECON1_BSEL1: u8 = 1 << 1;
pub const ECON1_BSEL0: u8 = 1 << 0;

pub const ECON2_AUTOINC: u8 = 1 << 7;
pub const ECON2_PKTDEC: u8 = 1 << 6;

pub const ESTAT_CLKRDY: u8 = 1 << 0;

pub const EIR_TXERIF: u8 = 1 << 1;
pub const EIE_PKTIE: u8 = 1 << 6;
pub const EIE_INTIE: u8 = 1 << 7;

pub const ERXFCON_UCEN: u8 = 1 << 7;
pub const ERXFCON_CRCEN: u8 = 1 << 5;
pub const ERXFCON_MCEN: u8 = 1 << 1;
pub const ERXFCON_BCEN: u8 = 1 << 0;

pub const MACON1_MARXEN: u8 = 1 << 0;
pub const MACON3_PADCFG0: u8 = 1 << 5;
pub const MACON3_TXCRCEN: u8 = 1 << 4;
pub const MACON4_DEFER: u8 = 1 << 6;

pub const MICMD_MIIRD: u8 = 1 << 0;
pub const MISTAT_BUSY: u8 = 1 << 0;

/// PHY (MIIM) register addresses, which use a different access
/// procedure from the ETH/MAC registers above (section 3.3 of the
/// datasheet).
pub const PHY_PHCON1: u8 = 0x00;
pub const PHY_PHCON2: u8 = 0x10;

pub const PHCON2_HDLDIS: u16 = 1 << 8;

/// RX buffer occupies 0x0000-0x13FF; everything past that is TX space
/// split into the two alternating regions below.
pub const ERXNDH_VALUE: u8 = 0x13;
pub const XMIT_BUF_A: u8 = 0x14;
pub const XMIT_BUF_B: u8 = 0x1A;

pub fn bank(reg: u8) -> u8 {
    (reg >> 5) & 0x03
}

pub fn is_mac_or_mii(reg: u8) -> bool {
    reg & 0x80 != 0
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware seam for the SPI bus the ENC28J60 sits on, plus chip-select
//! and reset control. `SpiBus` is the only thing a board needs to
//! implement; everything else in this crate is pure register-level
//! logic that runs identically against real silicon or the mock below.

/// A raw, blocking SPI transaction interface. No ENC28J60 semantics
/// live here — just "select, shift some bytes, deselect."
pub trait SpiBus {
    /// Asserts chip select.
    fn select(&mut self);
    /// Deasserts chip select.
    fn deselect(&mut self);
    /// Shifts `out` onto the bus while simultaneously shifting the same
    /// number of bytes back into `out`, full-duplex, MSB first.
    fn transfer(&mut self, out: &mut [u8]);
    /// Drives the chip's hardware reset line low then high again. Only
    /// called once, during `Enc28j60::new`.
    fn hard_reset(&mut self);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// A software stand-in for the chip, good enough to drive
    /// register-level unit tests: it remembers every byte written to a
    /// register address and answers reads with whatever was last
    /// written (or zero).
    #[derive(Default)]
    pub struct MockSpiBus {
        pub selected: bool,
        pub reset_count: u32,
        pub registers: RefCell<std::collections::HashMap<(u8, u8), u8>>,
        /// Bytes to hand back for the next buffer-memory reads (RBM),
        /// consumed front to back.
        pub rx_feed: RefCell<VecDeque<u8>>,
        /// Bytes written via WBM, captured for assertions.
        pub tx_captured: RefCell<Vec<u8>>,
        current_bank: RefCell<u8>,
    }

    impl MockSpiBus {
        pub fn queue_rx(&self, bytes: &[u8]) {
            self.rx_feed.borrow_mut().extend(bytes.iter().copied());
        }

        fn reg_read(&self, addr: u8) -> u8 {
            *self
                .registers
                .borrow()
                .get(&(*self.current_bank.borrow(), addr))
                .unwrap_or(&0)
        }

        fn reg_write(&self, addr: u8, value: u8) {
            self.registers
                .borrow_mut()
                .insert((*self.current_bank.borrow(), addr), value);
        }
    }

    impl SpiBus for MockSpiBus {
        fn select(&mut self) {
            self.selected = true;
        }

        fn deselect(&mut self) {
            self.selected = false;
        }

        fn hard_reset(&mut self) {
            self.reset_count += 1;
            self.registers.borrow_mut().clear();
            *self.current_bank.borrow_mut() = 0;
        }

        fn transfer(&mut self, out: &mut [u8]) {
            if out.is_empty() {
                return;
            }
            let opcode = out[0] & 0xE0;
            let addr = out[0] & crate::registers::REG_MASK;
            match opcode {
                crate::registers::OP_RCR => {
                    // cmd byte, then one (or two for MAC/MII) dummy/read bytes
                    let value = self.reg_read(addr);
                    for b in out.iter_mut().skip(1) {
                        *b = value;
                    }
                }
                crate::registers::OP_WCR => {
                    if out.len() >= 2 {
                        self.reg_write(addr, out[1]);
                    }
                }
                crate::registers::OP_BFS => {
                    if out.len() >= 2 {
                        let cur = self.reg_read(addr);
                        self.reg_write(addr, cur | out[1]);
                    }
                }
                crate::registers::OP_BFC => {
                    if out.len() >= 2 {
                        let cur = self.reg_read(addr);
                        self.reg_write(addr, cur & !out[1]);
                    }
                }
                crate::registers::OP_RBM => {
                    let mut feed = self.rx_feed.borrow_mut();
                    for b in out.iter_mut().skip(1) {
                        *b = feed.pop_front().unwrap_or(0);
                    }
                }
                crate::registers::OP_WBM => {
                    self.tx_captured
                        .borrow_mut()
                        .extend_from_slice(&out[1..]);
                }
                crate::registers::OP_SRC => {
                    self.registers.borrow_mut().clear();
                    *self.current_bank.borrow_mut() = 0;
                }
                _ => {}
            }
        }
    }
}

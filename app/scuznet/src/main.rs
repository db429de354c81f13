// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware entry point. Everything this crate actually implements —
//! the PHY, the logic layer, the device handlers, and the dispatch loop
//! in `lib.rs` — is generic over [`scuznet::Device`]'s board traits
//! (`PhyPins`, `Clock`, `MediaOpener`). Wiring those traits to real
//! silicon (GPIO pin assignments for the 18 SCSI lines, clock-tree
//! bring-up, the memory-card/FAT driver, the ENC28J60's SPI bus) is
//! peripheral, board-specific collaborator work explicitly out of this
//! system's core scope (spec.md §1, "MCU initialization"). No board
//! crate providing those impls is in this repository, so this binary
//! boots, confirms the image is in fact executing, and idles —
//! mirroring `original_source/testing/main.c`'s startup self-check
//! before it hands off to the real dispatch loop.
//!
//! A concrete board crate builds a `GlobalConfig` (via
//! `scuznet_config::parse`), turns it into a device table with
//! `scuznet::build_devices`, and calls `Dispatcher::poll` from its own
//! `main` in a `loop`; on an `InitError` it drives a
//! [`scuznet::FaultIndicator`] with the matching
//! [`scuznet::BlinkCode`] instead of ever reaching that loop (spec.md
//! §7, error class 4).

#![no_std]
#![no_main]

#[cfg(not(any(feature = "halt", feature = "itm", feature = "semihosting")))]
use core::panic::PanicInfo;
use cortex_m_rt::entry;

#[cfg(feature = "itm")]
use panic_itm as _;
#[cfg(feature = "halt")]
use panic_halt as _;
#[cfg(feature = "semihosting")]
use panic_semihosting as _;

#[entry]
fn main() -> ! {
    // No board crate is wired in here (see module doc); idle rather
    // than spin on uninitialized peripherals.
    loop {
        cortex_m::asm::wfi();
    }
}

// Pulled in only when no panic handler crate is selected, so the crate
// still links for `cargo check --no-default-features`.
#[cfg(not(any(feature = "halt", feature = "itm", feature = "semihosting")))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Initialization-error reporting (spec.md §7, error class 4): "no card,
//! no file, bad config" happen before the bus is usable, so they can't be
//! reported as sense data. The self-test/LED driver itself is a
//! peripheral collaborator out of scope (spec.md §1); this module is
//! only the narrow trait boundary an `InitError` is turned into a blink
//! pattern through, grounded in `original_source/testing/led.c`'s
//! `led_flash(long, short, long)` three-group pattern.

/// A long/short/long blink pattern, one group of each length. Matches
/// `led_flash`'s three `uint8_t` counts; zero means "skip this group".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlinkCode {
    pub long: u8,
    pub short: u8,
    pub long2: u8,
}

impl BlinkCode {
    pub const fn new(long: u8, short: u8, long2: u8) -> Self {
        Self { long, short, long2 }
    }
}

/// The board's means of turning a [`BlinkCode`] into actual LED flashes.
/// `led_flash` never returns on real hardware (it loops forever); the
/// trait reflects that by taking `&mut self` only, leaving "loop
/// forever" to the caller (spec.md §7: "the system halts").
pub trait FaultIndicator {
    fn blink(&mut self, code: BlinkCode);
}

impl super::InitError {
    /// The blink pattern for each initialization failure, assigned in
    /// the same spirit as `original_source/test.c`'s per-check codes
    /// (distinct long-count "family" per failure class, short count
    /// free for finer detail where the original used a loop index).
    pub fn blink_code(self) -> BlinkCode {
        match self {
            super::InitError::Config(_) => BlinkCode::new(2, 1, 0),
            super::InitError::Media(_) => BlinkCode::new(3, 1, 0),
            super::InitError::TooManyDevices => BlinkCode::new(4, 1, 0),
            super::InitError::OpticalNeedsFile => BlinkCode::new(4, 2, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InitError;

    #[test]
    fn each_init_error_has_a_distinct_code() {
        let codes = [
            InitError::Config(scuznet_config::ConfigError::BadNumber).blink_code(),
            InitError::Media(media::MediaError::Io).blink_code(),
            InitError::TooManyDevices.blink_code(),
            InitError::OpticalNeedsFile.blink_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}

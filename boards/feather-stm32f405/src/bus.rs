#![deny(unsafe_code)]
#![deny(warnings)]
//! Cartridge bus capture
//!
//! Wiring (through 5V-tolerant level shifters):
//!
//! ```text
//! A1..A8   -> PA0..PA7
//! A9..A16  -> PB0..PB7
//! ROM4     -> PC7   (low = command window, captured as bit 16)
//! /AS      -> PC8   (EXTI8, falling edge = access strobe)
//! ```
//!
//! The low 16 bits of the captured address are the word the host encoded in
//! its read; bit 16 is set when ROM4 was selected.
//!
//! # Limitations
//!
//! This board cannot serve reads to the host yet. Nothing drives D0..D15,
//! so the shared window never reaches the cartridge port. Capture is also
//! an async task woken by EXTI once per strobe, which is far slower than a
//! 68000 bus cycle. Only a host that paces its command accesses is seen.

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Input;
use stm32_metapac::{GPIOA, GPIOB, GPIOC};

const ROM4_PIN: usize = 7;

/// Bus inputs; address and ROM4 are only held so the pins stay configured
pub struct BusPins {
    pub strobe: ExtiInput<'static>,
    pub _address: [Input<'static>; 16],
    pub _rom4: Input<'static>,
}

/// Sample the address lines as one captured access
pub fn capture_address() -> u32 {
    let low = GPIOA.idr().read().0 & 0xFF;
    let high = GPIOB.idr().read().0 & 0xFF;
    let rom4_selected = GPIOC.idr().read().0 & (1 << ROM4_PIN) == 0;

    let mut address = low | (high << 8);
    if rom4_selected {
        address |= rtcemul_core::dispatch::COMMAND_WINDOW_BIT;
    }
    address
}

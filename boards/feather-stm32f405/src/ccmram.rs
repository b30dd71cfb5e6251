//! CCM RAM allocations
//!
//! This module is the **ONLY** place in the board crate where
//! `#[link_section = ".ccmram"]` is used. `link_section` trips the
//! `unsafe_code` lint, so keeping it here lets every other module keep
//! `#![deny(unsafe_code)]`.
//!
//! # CCM RAM Characteristics (STM32F405RG)
//!
//! - **Size**: 64 KB (0x1000_0000 - 0x1000_FFFF)
//! - **Access**: CPU only (no DMA access)
//! - **Performance**: Zero wait states
//!
//! # Current Allocations
//!
//! - **FRAME_SLOT**: staged command frame handed from the bus capture
//!   task to the main loop (~48 bytes)
//! - **PROBE_QUEUE**: Dallas probe signals, same producer/consumer
//!   (~140 bytes)
//!
//! The shared window itself is NOT here: it is 64 KB on its own and lives
//! in main SRAM.
//!
//! # Safety Requirements
//!
//! When adding new CCM RAM allocations:
//! 1. **Verify total usage < 64 KB**
//! 2. **No DMA**: Data must not be used with DMA peripherals
//! 3. **Static lifetime**: Only `static` items (not stack allocations)

#![allow(unsafe_code)]
#![deny(warnings)]

use rtcemul_core::{FrameSlot, ProbeQueue};

/// Interrupt to main-loop command frame handoff
#[link_section = ".ccmram"]
pub static FRAME_SLOT: FrameSlot = FrameSlot::new();

/// Interrupt to main-loop Dallas probe queue
#[link_section = ".ccmram"]
pub static PROBE_QUEUE: ProbeQueue = ProbeQueue::new();

//! Dallas DS1216 "SmartWatch" emulation
//!
//! The DS1216 hides behind a ROM socket and is unlocked by a 64-bit pattern
//! clocked in one bit per access. Each access is reduced to a 4-bit probe
//! signal by the dispatcher: `0x1` writes a zero bit, `0x3` writes a one bit,
//! `0x9` reads a bit. Once the pattern matches, the next 64 read probes
//! stream the clock registers out LSB first.

use rtcemul_hal::ClockState;

use crate::datetime::to_bcd;

/// Unlock pattern, sent LSB first
pub const DALLAS_MAGIC: u64 = 0x5CA3_3AC5_5CA3_3AC5;

/// Probe: read one clock bit
pub const DALLAS_READ: u8 = 0x9;
/// Probe: write a zero bit
pub const DALLAS_WRITE_ZERO: u8 = 0x1;
/// Probe: write a one bit
pub const DALLAS_WRITE_ONE: u8 = 0x3;

/// Slots in the match sequence; 0 and 1 are reserved
pub const MAGIC_SEQUENCE_LEN: usize = 66;

/// Encoded clock bits streamed after a match
pub const CLOCK_SEQUENCE_LEN: usize = 64;

const FIRST_MAGIC_SLOT: usize = 2;

/// Outcome of one probe
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DallasEvent {
    /// Probe did not start a match
    Idle,
    /// Probe matched the next slot
    Progress,
    /// Partial match broken; matching restarted
    Mismatch,
    /// Whole pattern matched; clock streaming begins
    Matched,
    /// One clock bit delivered
    Bit(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Matching { slot: usize },
    Streaming { bit: usize },
}

pub struct DallasEmulator {
    magic_sequence: [u8; MAGIC_SEQUENCE_LEN],
    clock_sequence: [u8; CLOCK_SEQUENCE_LEN],
    mode: Mode,
    retry_count: u32,
    last_magic_match: Option<u64>,
}

impl DallasEmulator {
    pub fn new() -> Self {
        let mut magic_sequence = [0u8; MAGIC_SEQUENCE_LEN];
        for (bit, slot) in magic_sequence[FIRST_MAGIC_SLOT..].iter_mut().enumerate() {
            *slot = if (DALLAS_MAGIC >> bit) & 1 == 1 {
                DALLAS_WRITE_ONE
            } else {
                DALLAS_WRITE_ZERO
            };
        }

        Self {
            magic_sequence,
            clock_sequence: [0; CLOCK_SEQUENCE_LEN],
            mode: Mode::Matching {
                slot: FIRST_MAGIC_SLOT,
            },
            retry_count: 0,
            last_magic_match: None,
        }
    }

    pub fn magic_sequence(&self) -> &[u8; MAGIC_SEQUENCE_LEN] {
        &self.magic_sequence
    }

    /// Encoded clock bits, one byte (0 or 1) per bit
    pub fn clock_sequence(&self) -> &[u8; CLOCK_SEQUENCE_LEN] {
        &self.clock_sequence
    }

    /// Partial matches that were broken off
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_magic_match(&self) -> Option<u64> {
        self.last_magic_match
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Encode the clock registers in DS1216 order
    ///
    /// Hundredths, seconds, minutes, hours, day of week (1-7), date, month,
    /// year; each register BCD, LSB first.
    pub fn load_clock(&mut self, time: &ClockState) {
        let registers = [
            0,
            to_bcd(time.sec),
            to_bcd(time.min),
            to_bcd(time.hour),
            to_bcd(time.day_of_week + 1),
            to_bcd(time.day),
            to_bcd(time.month),
            to_bcd((time.year % 100) as u8),
        ];

        for (i, register) in registers.iter().enumerate() {
            for bit in 0..8 {
                self.clock_sequence[i * 8 + bit] = (register >> bit) & 1;
            }
        }
    }

    /// Feed one probe signal
    pub fn probe(&mut self, signal: u8) -> DallasEvent {
        match self.mode {
            Mode::Streaming { bit } if signal == DALLAS_READ => {
                let value = self.clock_sequence[bit];
                self.mode = if bit + 1 < CLOCK_SEQUENCE_LEN {
                    Mode::Streaming { bit: bit + 1 }
                } else {
                    Mode::Matching {
                        slot: FIRST_MAGIC_SLOT,
                    }
                };
                DallasEvent::Bit(value)
            }
            Mode::Streaming { bit } => {
                trace!("Dallas stream aborted at bit {}", bit);
                self.mode = Mode::Matching {
                    slot: FIRST_MAGIC_SLOT,
                };
                self.match_from_start(signal)
            }
            Mode::Matching { slot } if signal == self.magic_sequence[slot] => {
                if slot + 1 == MAGIC_SEQUENCE_LEN {
                    self.last_magic_match = Some(DALLAS_MAGIC);
                    self.mode = Mode::Streaming { bit: 0 };
                    DallasEvent::Matched
                } else {
                    self.mode = Mode::Matching { slot: slot + 1 };
                    DallasEvent::Progress
                }
            }
            Mode::Matching { slot } if slot > FIRST_MAGIC_SLOT => {
                self.retry_count = self.retry_count.wrapping_add(1);
                let _ = self.match_from_start(signal);
                DallasEvent::Mismatch
            }
            Mode::Matching { .. } => DallasEvent::Idle,
        }
    }

    fn match_from_start(&mut self, signal: u8) -> DallasEvent {
        if signal == self.magic_sequence[FIRST_MAGIC_SLOT] {
            self.mode = Mode::Matching {
                slot: FIRST_MAGIC_SLOT + 1,
            };
            DallasEvent::Progress
        } else {
            self.mode = Mode::Matching {
                slot: FIRST_MAGIC_SLOT,
            };
            DallasEvent::Idle
        }
    }
}

impl Default for DallasEmulator {
    fn default() -> Self {
        Self::new()
    }
}

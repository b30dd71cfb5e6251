//! Command frame codec for the cartridge bus
//!
//! The host cannot write to the cartridge port, so it transmits by *reading*:
//! every access inside the command window encodes one 16-bit word in its
//! address lines. A frame on the bus is
//!
//! ```text
//! 0xABCD | command_id | payload_size (bytes) | payload words ... | checksum
//! ```
//!
//! where the checksum is the wrapping 16-bit sum of `command_id`,
//! `payload_size` and every payload word. The first payload longword is
//! always the host's random token.
//!
//! `FrameParser` consumes one word per call, does constant work per word and
//! never allocates, so it can run in interrupt context.

use heapless::Vec;

use crate::error::ProtocolError;

/// Frame start marker
pub const PROTOCOL_HEADER: u16 = 0xABCD;

/// Payload bytes kept per frame
pub const MAX_PAYLOAD_SIZE: usize = 32;

/// Payload bytes the RTC application interprets as parameters
pub const PARAMETERS_MAX_SIZE: usize = 20;

/// Words needed to encode the largest frame
pub const MAX_FRAME_WORDS: usize = 4 + MAX_PAYLOAD_SIZE / 2;

/// A decoded command frame
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub command_id: u16,
    /// Size declared by the host, which may exceed what was stored
    pub payload_size: u16,
    /// Payload bytes received from the bus
    pub bytes_read: u16,
    pub checksum: u16,
    pub payload: [u8; MAX_PAYLOAD_SIZE],
}

impl CommandFrame {
    pub const EMPTY: Self = Self {
        command_id: 0,
        payload_size: 0,
        bytes_read: 0,
        checksum: 0,
        payload: [0; MAX_PAYLOAD_SIZE],
    };

    /// Stored payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.stored_len()]
    }

    fn stored_len(&self) -> usize {
        (self.payload_size as usize).min(MAX_PAYLOAD_SIZE)
    }

    /// Whether the declared size was clamped on copy
    pub fn is_truncated(&self) -> bool {
        self.payload_size as usize > MAX_PAYLOAD_SIZE
    }

    /// The n-th 32-bit payload value, if fully inside the payload
    ///
    /// Index 0 is the random token; command arguments start at 1.
    pub fn param(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        let bytes = self.payload().get(start..start + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// The host's random token
    pub fn random_token(&self) -> Option<u32> {
        self.param(0)
    }

    /// Command arguments after the token, bounded by `PARAMETERS_MAX_SIZE`
    pub fn arguments(&self) -> impl Iterator<Item = u32> + '_ {
        let limit = self.stored_len().min(PARAMETERS_MAX_SIZE) / 4;
        (1..limit).filter_map(move |i| self.param(i))
    }
}

/// Wrapping 16-bit checksum over the header fields and payload words
pub fn checksum(command_id: u16, payload_size: u16, payload_words: &[u16]) -> u16 {
    payload_words
        .iter()
        .fold(command_id.wrapping_add(payload_size), |acc, w| {
            acc.wrapping_add(*w)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Header,
    CommandId,
    PayloadSize,
    Payload,
    Checksum,
}

/// Streaming frame decoder, one bus word at a time
pub struct FrameParser {
    step: Step,
    frame: CommandFrame,
    sum: u16,
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            step: Step::Header,
            frame: CommandFrame::EMPTY,
            sum: 0,
        }
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.step = Step::Header;
        self.sum = 0;
    }

    /// Consume one word
    ///
    /// Returns `Some` once the checksum word of a frame has been consumed.
    pub fn feed(&mut self, word: u16) -> Option<Result<&CommandFrame, ProtocolError>> {
        match self.step {
            Step::Header => {
                if word == PROTOCOL_HEADER {
                    self.frame = CommandFrame::EMPTY;
                    self.step = Step::CommandId;
                }
                None
            }
            Step::CommandId => {
                self.frame.command_id = word;
                self.sum = word;
                self.step = Step::PayloadSize;
                None
            }
            Step::PayloadSize => {
                self.frame.payload_size = word;
                self.sum = self.sum.wrapping_add(word);
                self.step = if word == 0 {
                    Step::Checksum
                } else {
                    Step::Payload
                };
                None
            }
            Step::Payload => {
                let at = self.frame.bytes_read as usize;
                // Clamp: bytes past the capacity still count toward the checksum
                if at + 1 < MAX_PAYLOAD_SIZE {
                    self.frame.payload[at..at + 2].copy_from_slice(&word.to_le_bytes());
                } else if at < MAX_PAYLOAD_SIZE {
                    self.frame.payload[at] = word as u8;
                }
                self.sum = self.sum.wrapping_add(word);
                self.frame.bytes_read = self.frame.bytes_read.saturating_add(2);
                if self.frame.bytes_read >= self.frame.payload_size {
                    self.step = Step::Checksum;
                }
                None
            }
            Step::Checksum => {
                self.frame.checksum = word;
                self.step = Step::Header;
                if word == self.sum {
                    Some(Ok(&self.frame))
                } else {
                    Some(Err(ProtocolError::ChecksumMismatch {
                        command_id: self.frame.command_id,
                        expected: self.sum,
                        received: word,
                    }))
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one complete frame from a word sequence
pub fn decode(words: &[u16]) -> Result<CommandFrame, ProtocolError> {
    let mut parser = FrameParser::new();
    for word in words {
        if let Some(result) = parser.feed(*word) {
            return result.copied();
        }
    }
    Err(ProtocolError::Incomplete)
}

/// Encode a frame into its bus word sequence
///
/// An odd trailing payload byte is padded with zero.
pub fn encode(command_id: u16, payload: &[u8]) -> Result<Vec<u16, MAX_FRAME_WORDS>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            command_id,
            payload_size: payload.len() as u16,
        });
    }
    let payload_size = payload.len() as u16;
    let overflow = ProtocolError::PayloadTooLarge {
        command_id,
        payload_size,
    };

    let mut payload_words: Vec<u16, { MAX_PAYLOAD_SIZE / 2 }> = Vec::new();
    for chunk in payload.chunks(2) {
        let low = chunk[0] as u16;
        let high = chunk.get(1).copied().unwrap_or(0) as u16;
        payload_words
            .push(low | (high << 8))
            .map_err(|_| overflow)?;
    }

    let mut words = Vec::new();
    words
        .extend_from_slice(&[PROTOCOL_HEADER, command_id, payload_size])
        .map_err(|_| overflow)?;
    words
        .extend_from_slice(&payload_words)
        .map_err(|_| overflow)?;
    words
        .push(checksum(command_id, payload_size, &payload_words))
        .map_err(|_| overflow)?;
    Ok(words)
}

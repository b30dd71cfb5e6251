//! Bus access dispatcher (interrupt context)
//!
//! Runs on every captured cartridge access. Accesses with the command-window
//! bit set are fed to the frame codec; completed frames are staged in a
//! single-slot `FrameSlot` for the main loop. The slot overwrites an
//! unconsumed frame: the host blocks for a reply between commands, so a
//! second frame only arrives early if the host gave up on the first.
//!
//! When Dallas emulation is active, the low nibble of every other access is
//! queued as a probe signal for the main loop.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::error::ProtocolError;
use crate::protocol::{CommandFrame, FrameParser, MAX_PAYLOAD_SIZE};

/// Captured address bit that marks the command window
pub const COMMAND_WINDOW_BIT: u32 = 0x0001_0000;

/// Inverted address bit of the 16-bit data word
pub const ADDRESS_HIGH_BIT: u16 = 0x8000;

/// Depth of the Dallas probe queue
pub const PROBE_QUEUE_DEPTH: usize = 128;

/// Single-frame staging buffer shared between interrupt and main loop
pub struct FrameSlot {
    frame: Mutex<RefCell<Option<CommandFrame>>>,
}

impl FrameSlot {
    pub const fn new() -> Self {
        Self {
            frame: Mutex::new(RefCell::new(None)),
        }
    }

    /// Stage a frame, replacing any unconsumed one
    ///
    /// Returns `true` if an unconsumed frame was overwritten.
    pub fn stage(&self, frame: &CommandFrame) -> bool {
        critical_section::with(|cs| self.frame.borrow(cs).replace(Some(*frame)).is_some())
    }

    /// Take the staged frame and clear the ready flag
    pub fn take(&self) -> Option<CommandFrame> {
        critical_section::with(|cs| self.frame.borrow(cs).take())
    }

    /// Whether a frame is waiting
    pub fn is_ready(&self) -> bool {
        critical_section::with(|cs| self.frame.borrow(cs).borrow().is_some())
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded queue of Dallas probe signals
pub struct ProbeQueue {
    probes: Mutex<RefCell<Deque<u8, PROBE_QUEUE_DEPTH>>>,
}

impl ProbeQueue {
    pub const fn new() -> Self {
        Self {
            probes: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Queue a probe; returns `false` if the queue was full and it was dropped
    pub fn push(&self, signal: u8) -> bool {
        critical_section::with(|cs| self.probes.borrow(cs).borrow_mut().push_back(signal).is_ok())
    }

    /// Oldest queued probe
    pub fn pop(&self) -> Option<u8> {
        critical_section::with(|cs| self.probes.borrow(cs).borrow_mut().pop_front())
    }
}

impl Default for ProbeQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt-side half of the command channel
pub struct Dispatcher<'a> {
    parser: FrameParser,
    slot: &'a FrameSlot,
    probes: Option<&'a ProbeQueue>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(slot: &'a FrameSlot) -> Self {
        Self {
            parser: FrameParser::new(),
            slot,
            probes: None,
        }
    }

    /// Also forward non-command accesses as Dallas probe signals
    pub fn with_probes(mut self, probes: &'a ProbeQueue) -> Self {
        self.probes = Some(probes);
        self
    }

    /// Handle one captured bus access
    pub fn on_bus_access(&mut self, address: u32) {
        if address & COMMAND_WINDOW_BIT == 0 {
            if let Some(probes) = self.probes {
                if !probes.push((address & 0x0F) as u8) {
                    trace!("Dallas probe queue full");
                }
            }
            return;
        }

        let word = (address as u16) ^ ADDRESS_HIGH_BIT;
        match self.parser.feed(word) {
            None => {}
            Some(Ok(frame)) if frame.is_truncated() => {
                let err = ProtocolError::PayloadTooLarge {
                    command_id: frame.command_id,
                    payload_size: frame.payload_size,
                };
                warn!("Dropping frame: {} (max {})", err, MAX_PAYLOAD_SIZE);
            }
            Some(Ok(frame)) => {
                if self.slot.stage(frame) {
                    debug!("Unconsumed frame overwritten");
                }
            }
            Some(Err(err)) => {
                warn!("Checksum error detected: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, PROTOCOL_HEADER};

    fn bus_address(word: u16) -> u32 {
        COMMAND_WINDOW_BIT | (word ^ ADDRESS_HIGH_BIT) as u32
    }

    fn send(dispatcher: &mut Dispatcher<'_>, words: &[u16]) {
        for word in words {
            dispatcher.on_bus_access(bus_address(*word));
        }
    }

    #[test]
    fn test_valid_frame_is_staged() {
        let slot = FrameSlot::new();
        let mut dispatcher = Dispatcher::new(&slot);
        send(&mut dispatcher, &encode(0x0301, &[1, 2, 3, 4]).unwrap());
        assert!(slot.is_ready());
        let frame = slot.take().unwrap();
        assert_eq!(frame.command_id, 0x0301);
        assert_eq!(frame.random_token(), Some(0x0403_0201));
        assert!(!slot.is_ready());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_checksum_error_keeps_previous_frame() {
        let slot = FrameSlot::new();
        let mut dispatcher = Dispatcher::new(&slot);
        send(&mut dispatcher, &encode(0x0303, &[9, 9, 9, 9]).unwrap());

        let mut bad = encode(0x0304, &[1, 1, 1, 1]).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0x5555;
        send(&mut dispatcher, &bad);

        assert_eq!(slot.take().unwrap().command_id, 0x0303);
    }

    #[test]
    fn test_newer_frame_overwrites_unconsumed() {
        let slot = FrameSlot::new();
        let mut dispatcher = Dispatcher::new(&slot);
        send(&mut dispatcher, &encode(0x0303, &[0; 4]).unwrap());
        send(&mut dispatcher, &encode(0x0304, &[0; 4]).unwrap());
        assert_eq!(slot.take().unwrap().command_id, 0x0304);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_accesses_outside_command_window_are_ignored() {
        let slot = FrameSlot::new();
        let mut dispatcher = Dispatcher::new(&slot);
        for word in encode(0x0301, &[0; 4]).unwrap() {
            dispatcher.on_bus_access((word ^ ADDRESS_HIGH_BIT) as u32);
        }
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let slot = FrameSlot::new();
        let mut dispatcher = Dispatcher::new(&slot);
        let size = 36u16;
        let mut sum = 0x0305u16.wrapping_add(size);
        send(&mut dispatcher, &[PROTOCOL_HEADER, 0x0305, size]);
        for _ in 0..size / 2 {
            dispatcher.on_bus_access(bus_address(1));
            sum = sum.wrapping_add(1);
        }
        dispatcher.on_bus_access(bus_address(sum));
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_probes_are_queued_when_enabled() {
        let slot = FrameSlot::new();
        let probes = ProbeQueue::new();
        let mut dispatcher = Dispatcher::new(&slot).with_probes(&probes);
        dispatcher.on_bus_access(0x0000_0003);
        dispatcher.on_bus_access(0x0000_1239);
        assert_eq!(probes.pop(), Some(0x3));
        assert_eq!(probes.pop(), Some(0x9));
        assert_eq!(probes.pop(), None);
    }

    #[test]
    fn test_probe_queue_drops_when_full() {
        let probes = ProbeQueue::new();
        for _ in 0..PROBE_QUEUE_DEPTH {
            assert!(probes.push(1));
        }
        assert!(!probes.push(3));
        assert_eq!(probes.pop(), Some(1));
    }
}

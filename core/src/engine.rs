//! RTC command engine (main loop side)
//!
//! Owns the shared window, the hardware clock and the token RNG. Each call to
//! `poll` consumes at most one staged frame, applies it to the window and
//! acknowledges it: the host's own random token is published in
//! `RANDOM_TOKEN` (the host waits for exactly that value) and a fresh seed
//! for its next token goes to `RANDOM_TOKEN_SEED`. Dallas probe signals
//! queued by the dispatcher are drained on the same pass.

use rand_core::RngCore;
use rtcemul_hal::{ClockState, HardwareRtc};

use crate::config::{RtcConfig, RtcType};
use crate::dallas::{DallasEmulator, DallasEvent};
use crate::datetime::{ikbd_record, msdos_datetime};
use crate::dispatch::{FrameSlot, ProbeQueue};
use crate::layout::{
    SharedMemory, DALLAS_CLOCK, DATETIME_BCD, DATETIME_MSDOS, FLAG_CLEAR, FLAG_SET, NTP_SUCCESS,
    OLD_XBIOS_TRAP, RANDOM_TOKEN, RANDOM_TOKEN_SEED, REENTRY_TRAP, SHARED_VARIABLE_BUFFER_TYPE,
    SHARED_VARIABLE_HARDWARE_TYPE, SHARED_VARIABLE_SVERSION, WINDOW_LEN, Y2K_PATCH,
};
use crate::protocol::CommandFrame;

/// RTC application commands (app-id 0x03)
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadTime,
    SaveVectors,
    ReentryLock,
    ReentryUnlock,
    SetSharedVar,
    Unknown(u16),
}

impl Command {
    pub const READ_TIME: u16 = 0x0301;
    pub const SAVE_VECTORS: u16 = 0x0302;
    pub const REENTRY_LOCK: u16 = 0x0303;
    pub const REENTRY_UNLOCK: u16 = 0x0304;
    pub const SET_SHARED_VAR: u16 = 0x0305;
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        match code {
            Self::READ_TIME => Command::ReadTime,
            Self::SAVE_VECTORS => Command::SaveVectors,
            Self::REENTRY_LOCK => Command::ReentryLock,
            Self::REENTRY_UNLOCK => Command::ReentryUnlock,
            Self::SET_SHARED_VAR => Command::SetSharedVar,
            other => Command::Unknown(other),
        }
    }
}

pub struct RtcEngine<'a, C, R> {
    memory: SharedMemory<'a>,
    rtc: C,
    rng: R,
    slot: &'a FrameSlot,
    probes: Option<&'a ProbeQueue>,
    config: RtcConfig,
    dallas: Option<DallasEmulator>,
    token: u32,
}

impl<'a, C, R> RtcEngine<'a, C, R>
where
    C: HardwareRtc,
    R: RngCore,
{
    pub fn new(
        window: &'a mut [u8; WINDOW_LEN],
        rtc: C,
        rng: R,
        slot: &'a FrameSlot,
        config: RtcConfig,
    ) -> Self {
        Self {
            memory: SharedMemory::new(window),
            rtc,
            rng,
            slot,
            probes: None,
            config,
            dallas: None,
            token: 0,
        }
    }

    /// Drain Dallas probe signals from `probes`
    pub fn with_probes(mut self, probes: &'a ProbeQueue) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn memory(&self) -> &SharedMemory<'a> {
        &self.memory
    }

    /// The hardware clock, e.g. for the NTP synchronizer to commit into
    pub fn rtc_mut(&mut self) -> &mut C {
        &mut self.rtc
    }

    pub fn config(&self) -> &RtcConfig {
        &self.config
    }

    pub fn dallas(&self) -> Option<&DallasEmulator> {
        self.dallas.as_ref()
    }

    /// Before network bring-up: the host sees "not synchronized"
    pub fn preinit(&mut self) {
        self.memory.write_long(NTP_SUCCESS, FLAG_CLEAR);
    }

    /// After a successful NTP acquisition
    pub fn postinit(&mut self) {
        self.memory.write_long(NTP_SUCCESS, FLAG_SET);
        self.memory.write_long(REENTRY_TRAP, FLAG_CLEAR);
        for index in [
            SHARED_VARIABLE_HARDWARE_TYPE,
            SHARED_VARIABLE_SVERSION,
            SHARED_VARIABLE_BUFFER_TYPE,
        ] {
            if let Err(e) = self.memory.set_shared_variable(index, 0) {
                warn!("{}", e);
            }
        }

        info!(
            "RTC type {}, Y2K patch {}",
            self.config.rtc_type,
            self.config.y2k_patch
        );

        if self.config.rtc_type == RtcType::Dallas {
            let mut dallas = DallasEmulator::new();
            match self.rtc.datetime() {
                Ok(now) => dallas.load_clock(&now),
                Err(_) => warn!("Cannot read RTC for Dallas clock"),
            }
            self.memory.write_block(DALLAS_CLOCK, dallas.clock_sequence());
            self.dallas = Some(dallas);
        }

        self.read_time();
        self.refresh_token(None);
    }

    /// One main-loop pass
    ///
    /// Returns the command that was processed, if a frame was staged.
    pub fn poll(&mut self) -> Option<Command> {
        self.drain_probes();

        let frame = self.slot.take()?;
        let command = Command::from(frame.command_id);
        self.execute(command, &frame);
        self.refresh_token(frame.random_token());
        Some(command)
    }

    fn execute(&mut self, command: Command, frame: &CommandFrame) {
        debug!(
            "Command {} ({} bytes, token {})",
            command,
            frame.payload_size,
            frame.random_token()
        );
        for (i, arg) in frame.arguments().enumerate() {
            trace!("  param {}: {:#x}", i + 1, arg);
        }

        match command {
            Command::ReadTime => self.read_time(),
            Command::SaveVectors => match frame.param(1) {
                Some(vector) => {
                    self.memory.write_long(OLD_XBIOS_TRAP, vector);
                    debug!("Saved XBIOS trap {:#x}", vector);
                }
                None => warn!("SAVE_VECTORS without a vector, skipped"),
            },
            Command::ReentryLock => self.memory.write_long(REENTRY_TRAP, FLAG_SET),
            Command::ReentryUnlock => self.memory.write_long(REENTRY_TRAP, FLAG_CLEAR),
            Command::SetSharedVar => match (frame.param(1), frame.param(2)) {
                (Some(index), Some(value)) => {
                    if let Err(e) = self.memory.set_shared_variable(index, value) {
                        warn!("SET_SHARED_VAR ignored: {}", e);
                    }
                }
                _ => warn!("SET_SHARED_VAR without index and value, skipped"),
            },
            Command::Unknown(code) => debug!("Unknown command {:#x}", code),
        }
    }

    /// Refresh the datetime fields from the hardware clock
    pub fn read_time(&mut self) {
        let now = match self.rtc.datetime() {
            Ok(now) => now,
            Err(_) => {
                error!("Cannot read internal RTC");
                return;
            }
        };
        self.store_time(&now);

        if let Ok(sversion) = self.memory.shared_variable(SHARED_VARIABLE_SVERSION) {
            debug!("Host GEMDOS version {:#x}", sversion);
        }
    }

    fn store_time(&mut self, now: &ClockState) {
        let y2k_patch = self.config.y2k_patch;
        self.memory.write_block(DATETIME_BCD, &ikbd_record(now, y2k_patch));
        self.memory.write_long(DATETIME_MSDOS, msdos_datetime(now));
        self.memory
            .write_long(Y2K_PATCH, if y2k_patch { FLAG_SET } else { FLAG_CLEAR });
    }

    /// Publish the reply token and a new seed
    ///
    /// The host's token is echoed back. Without one, or when it would not
    /// change the published value, a new token is drawn instead.
    fn refresh_token(&mut self, host_token: Option<u32>) {
        let token = match host_token {
            Some(token) if token != self.token => token,
            _ => {
                let mut token = self.rng.next_u32();
                while token == self.token {
                    token = self.rng.next_u32();
                }
                token
            }
        };
        self.token = token;
        let seed = self.rng.next_u32();

        self.memory.write_long(RANDOM_TOKEN, token);
        self.memory.write_long(RANDOM_TOKEN_SEED, seed);
    }

    fn drain_probes(&mut self) {
        let (Some(dallas), Some(probes)) = (self.dallas.as_mut(), self.probes) else {
            return;
        };

        while let Some(signal) = probes.pop() {
            match dallas.probe(signal) {
                DallasEvent::Matched => {
                    debug!("Dallas magic matched after {} retries", dallas.retry_count());
                    if let Ok(now) = self.rtc.datetime() {
                        dallas.load_clock(&now);
                    }
                    self.memory.write_block(DALLAS_CLOCK, dallas.clock_sequence());
                }
                DallasEvent::Bit(bit) => trace!("Dallas bit {}", bit),
                DallasEvent::Idle | DallasEvent::Progress | DallasEvent::Mismatch => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dallas::{DALLAS_READ, MAGIC_SEQUENCE_LEN};
    use crate::datetime::{add_bcd, to_bcd};
    use crate::dispatch::{Dispatcher, ADDRESS_HIGH_BIT, COMMAND_WINDOW_BIT};
    use crate::layout::SHARED_VARIABLE_SLOTS;
    use crate::protocol::encode;

    const NOW: ClockState = ClockState {
        year: 2005,
        month: 6,
        day: 15,
        hour: 10,
        min: 20,
        sec: 30,
        day_of_week: 3,
    };

    struct FixedRtc(ClockState);

    impl HardwareRtc for FixedRtc {
        type Error = ();

        fn set_datetime(&mut self, time: &ClockState) -> Result<(), ()> {
            self.0 = *time;
            Ok(())
        }

        fn datetime(&mut self) -> Result<ClockState, ()> {
            Ok(self.0)
        }
    }

    /// Replays a fixed sequence of words, wrapping around
    struct ScriptRng {
        values: &'static [u32],
        next: usize,
    }

    impl ScriptRng {
        fn new(values: &'static [u32]) -> Self {
            Self { values, next: 0 }
        }
    }

    impl RngCore for ScriptRng {
        fn next_u32(&mut self) -> u32 {
            let value = self.values[self.next % self.values.len()];
            self.next += 1;
            value
        }

        fn next_u64(&mut self) -> u64 {
            rand_core::impls::next_u64_via_u32(self)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            rand_core::impls::fill_bytes_via_next(self, dest)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    const COUNTING: &[u32] = &[
        0x1111_1111,
        0x2222_2222,
        0x3333_3333,
        0x4444_4444,
        0x5555_5555,
        0x6666_6666,
        0x7777_7777,
    ];

    fn send(slot: &FrameSlot, command_id: u16, params: &[u32]) {
        let mut payload: heapless::Vec<u8, 32> = heapless::Vec::new();
        for p in params {
            payload.extend_from_slice(&p.to_le_bytes()).unwrap();
        }
        let mut dispatcher = Dispatcher::new(slot);
        for word in encode(command_id, &payload).unwrap() {
            dispatcher.on_bus_access(COMMAND_WINDOW_BIT | (word ^ ADDRESS_HIGH_BIT) as u32);
        }
    }

    fn config(y2k_patch: bool) -> RtcConfig {
        RtcConfig {
            y2k_patch,
            ..RtcConfig::default()
        }
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::from(0x0301), Command::ReadTime);
        assert_eq!(Command::from(0x0302), Command::SaveVectors);
        assert_eq!(Command::from(0x0303), Command::ReentryLock);
        assert_eq!(Command::from(0x0304), Command::ReentryUnlock);
        assert_eq!(Command::from(0x0305), Command::SetSharedVar);
        assert_eq!(Command::from(0x0399), Command::Unknown(0x0399));
    }

    #[test]
    fn test_preinit_and_postinit() {
        let mut window = [0xA5u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        engine.preinit();
        assert_eq!(engine.memory().read_long(NTP_SUCCESS), FLAG_CLEAR);

        engine.postinit();
        let mem = engine.memory();
        assert_eq!(mem.read_long(NTP_SUCCESS), FLAG_SET);
        assert_eq!(mem.read_long(REENTRY_TRAP), FLAG_CLEAR);
        for index in 0..3 {
            assert_eq!(mem.shared_variable(index), Ok(0));
        }
        assert_eq!(mem.read_long(RANDOM_TOKEN), 0x1111_1111);
        assert_eq!(mem.read_long(RANDOM_TOKEN_SEED), 0x2222_2222);
        assert_eq!(mem.block(DATETIME_BCD)[1], 0x1B);
        assert!(engine.dallas().is_none());
    }

    #[test]
    fn test_read_time_y2k_enabled() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(true));
        send(&slot, Command::READ_TIME, &[0xCAFE_F00D]);
        assert_eq!(engine.poll(), Some(Command::ReadTime));

        let mem = engine.memory();
        let record = mem.block(DATETIME_BCD);
        assert_eq!(record[0], add_bcd(to_bcd(5), to_bcd(50)));
        assert_eq!(&record[1..], &[0x1B, 0x15, 0x06, 0x20, 0x10, 0x00, 0x30]);
        assert_eq!(mem.read_long(Y2K_PATCH), FLAG_SET);
        assert_eq!(mem.read_long(DATETIME_MSDOS), msdos_datetime(&NOW));
    }

    #[test]
    fn test_read_time_y2k_disabled() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));
        send(&slot, Command::READ_TIME, &[1]);
        engine.poll();

        let mem = engine.memory();
        assert_eq!(mem.block(DATETIME_BCD)[0], 0x05);
        assert_eq!(mem.read_long(Y2K_PATCH), FLAG_CLEAR);
    }

    #[test]
    fn test_read_time_is_idempotent_apart_from_token() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(true));

        send(&slot, Command::READ_TIME, &[1]);
        engine.poll();
        let first_bcd = engine.memory().block(DATETIME_BCD);
        let first_msdos = engine.memory().read_long(DATETIME_MSDOS);
        let first_token = engine.memory().read_long(RANDOM_TOKEN);

        send(&slot, Command::READ_TIME, &[2]);
        engine.poll();
        assert_eq!(engine.memory().block(DATETIME_BCD), first_bcd);
        assert_eq!(engine.memory().read_long(DATETIME_MSDOS), first_msdos);
        assert_ne!(engine.memory().read_long(RANDOM_TOKEN), first_token);
    }

    #[test]
    fn test_save_lock_unlock_sequence() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        send(&slot, Command::SAVE_VECTORS, &[1, 0x00FC_1234]);
        assert_eq!(engine.poll(), Some(Command::SaveVectors));
        assert_eq!(engine.memory().read_long(OLD_XBIOS_TRAP), 0x00FC_1234);

        send(&slot, Command::REENTRY_LOCK, &[2]);
        engine.poll();
        assert_eq!(engine.memory().read_long(REENTRY_TRAP), FLAG_SET);

        send(&slot, Command::REENTRY_UNLOCK, &[3]);
        engine.poll();
        assert_eq!(engine.memory().read_long(REENTRY_TRAP), FLAG_CLEAR);

        // Second SAVE_VECTORS overwrites
        send(&slot, Command::SAVE_VECTORS, &[4, 0x00E0_0000]);
        engine.poll();
        assert_eq!(engine.memory().read_long(OLD_XBIOS_TRAP), 0x00E0_0000);
    }

    #[test]
    fn test_set_shared_var() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        send(&slot, Command::SET_SHARED_VAR, &[1, SHARED_VARIABLE_SVERSION, 0x0040]);
        engine.poll();
        assert_eq!(
            engine.memory().shared_variable(SHARED_VARIABLE_SVERSION),
            Ok(0x0040)
        );

        // Out of range index leaves the table and neighbouring fields alone
        let before = engine.memory().block(DALLAS_CLOCK);
        send(&slot, Command::SET_SHARED_VAR, &[2, SHARED_VARIABLE_SLOTS as u32, 0xFFFF]);
        assert_eq!(engine.poll(), Some(Command::SetSharedVar));
        assert_eq!(engine.memory().block(DALLAS_CLOCK), before);
        assert_eq!(engine.memory().read_word(0xF03C), 0);
    }

    #[test]
    fn test_missing_parameters_still_refresh_token() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        send(&slot, Command::SAVE_VECTORS, &[0x0BAD_CAFE]);
        assert_eq!(engine.poll(), Some(Command::SaveVectors));
        assert_eq!(engine.memory().read_long(OLD_XBIOS_TRAP), 0);
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0x0BAD_CAFE);
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN_SEED), 0x1111_1111);
    }

    #[test]
    fn test_token_refreshed_after_unknown_command() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        send(&slot, 0x03FF, &[0x0000_0001]);
        assert_eq!(engine.poll(), Some(Command::Unknown(0x03FF)));
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0x0000_0001);
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN_SEED), 0x1111_1111);
    }

    #[test]
    fn test_host_token_is_echoed_with_new_seed() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));
        engine.postinit();
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0x1111_1111);

        send(&slot, Command::REENTRY_LOCK, &[0xCAFE_F00D]);
        assert_eq!(engine.poll(), Some(Command::ReentryLock));
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0xCAFE_F00D);
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN_SEED), 0x3333_3333);
    }

    #[test]
    fn test_repeated_host_token_falls_back_to_rng() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));

        send(&slot, Command::READ_TIME, &[0xCAFE_F00D]);
        engine.poll();
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0xCAFE_F00D);

        send(&slot, Command::READ_TIME, &[0xCAFE_F00D]);
        engine.poll();
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0x2222_2222);
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN_SEED), 0x3333_3333);
    }

    #[test]
    fn test_token_redrawn_until_different() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let rng = ScriptRng::new(&[0xAAAA_0001, 0xAAAA_0001, 0xAAAA_0001, 0xBBBB_0002]);
        let mut engine = RtcEngine::new(&mut window, FixedRtc(NOW), rng, &slot, config(false));

        // No token in the payload: drawn from the RNG
        send(&slot, Command::READ_TIME, &[]);
        engine.poll();
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0xAAAA_0001);

        // The next draw repeats the token and is discarded
        send(&slot, Command::READ_TIME, &[]);
        engine.poll();
        assert_eq!(engine.memory().read_long(RANDOM_TOKEN), 0xBBBB_0002);
    }

    #[test]
    fn test_checksum_failure_mutates_nothing() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config(false));
        engine.postinit();
        let snapshot = *engine.memory().as_bytes();

        let mut words = encode(Command::REENTRY_LOCK, &[1, 0, 0, 0]).unwrap();
        let last = words.len() - 1;
        words[last] = words[last].wrapping_add(1);
        let mut dispatcher = Dispatcher::new(&slot);
        for word in words {
            dispatcher.on_bus_access(COMMAND_WINDOW_BIT | (word ^ ADDRESS_HIGH_BIT) as u32);
        }

        assert_eq!(engine.poll(), None);
        assert!(engine.memory().as_bytes() == &snapshot);
    }

    #[test]
    fn test_dallas_match_mirrors_clock() {
        let mut window = [0u8; WINDOW_LEN];
        let slot = FrameSlot::new();
        let probes = ProbeQueue::new();
        let config = RtcConfig {
            rtc_type: RtcType::Dallas,
            ..RtcConfig::default()
        };
        let mut engine =
            RtcEngine::new(&mut window, FixedRtc(NOW), ScriptRng::new(COUNTING), &slot, config)
                .with_probes(&probes);
        engine.postinit();

        let sequence = *engine.dallas().unwrap().magic_sequence();
        for signal in &sequence[2..MAGIC_SEQUENCE_LEN] {
            assert!(probes.push(*signal));
        }
        assert!(probes.push(DALLAS_READ));
        assert_eq!(engine.poll(), None);

        let dallas = engine.dallas().unwrap();
        assert!(dallas.is_streaming());
        assert_eq!(engine.memory().block(DALLAS_CLOCK), *dallas.clock_sequence());
        // Seconds register (BCD 0x30) starts at bit 8
        assert_eq!(&dallas.clock_sequence()[8..16], &[0, 0, 0, 0, 1, 1, 0, 0]);
    }
}

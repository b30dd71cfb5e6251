#![deny(unsafe_code)]
#![deny(warnings)]
//! Internal RTC and monotonic clock adapters
//!
//! - `BoardRtc`: STM32 RTC (LSE, 32.768 kHz) as the `HardwareRtc` the core
//!   commits NTP time into and reads on every READ_TIME
//! - `MonoClock`: TIM2 monotonic as the millisecond clock for NTP deadlines

use defmt::{error, Format};
use embassy_stm32::rtc::{DateTime, DayOfWeek, Rtc};
use rtcemul_hal::{ClockState, HardwareRtc, Monotonic};
use rtic_monotonics::Monotonic as _;

use crate::Mono;

/// RTC operation errors
#[derive(Debug, Clone, Copy, Format)]
pub enum RtcError {
    /// Calendar fields rejected by the peripheral
    InvalidDateTime,
    /// RTC hardware error
    HardwareError,
}

impl core::fmt::Display for RtcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RtcError::InvalidDateTime => write!(f, "Invalid date/time"),
            RtcError::HardwareError => write!(f, "RTC hardware error"),
        }
    }
}

impl core::error::Error for RtcError {}

pub struct BoardRtc {
    rtc: Rtc,
}

impl BoardRtc {
    pub fn new(rtc: Rtc) -> Self {
        Self { rtc }
    }
}

impl HardwareRtc for BoardRtc {
    type Error = RtcError;

    fn set_datetime(&mut self, time: &ClockState) -> Result<(), RtcError> {
        let datetime = DateTime::from(
            time.year,
            time.month,
            time.day,
            to_day_of_week(time.day_of_week),
            time.hour,
            time.min,
            time.sec,
            0, // microsecond
        )
        .map_err(|_| RtcError::InvalidDateTime)?;

        self.rtc.set_datetime(datetime).map_err(|e| {
            error!("RTC write failed: {:?}", defmt::Debug2Format(&e));
            RtcError::HardwareError
        })
    }

    fn datetime(&mut self) -> Result<ClockState, RtcError> {
        let dt = self.rtc.now().map_err(|_| RtcError::HardwareError)?;
        Ok(ClockState {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            min: dt.minute(),
            sec: dt.second(),
            day_of_week: from_day_of_week(dt.day_of_week()),
        })
    }
}

/// Sunday = 0
fn to_day_of_week(day: u8) -> DayOfWeek {
    match day % 7 {
        0 => DayOfWeek::Sunday,
        1 => DayOfWeek::Monday,
        2 => DayOfWeek::Tuesday,
        3 => DayOfWeek::Wednesday,
        4 => DayOfWeek::Thursday,
        5 => DayOfWeek::Friday,
        _ => DayOfWeek::Saturday,
    }
}

fn from_day_of_week(day: DayOfWeek) -> u8 {
    match day {
        DayOfWeek::Sunday => 0,
        DayOfWeek::Monday => 1,
        DayOfWeek::Tuesday => 2,
        DayOfWeek::Wednesday => 3,
        DayOfWeek::Thursday => 4,
        DayOfWeek::Friday => 5,
        DayOfWeek::Saturday => 6,
    }
}

/// TIM2 monotonic in milliseconds
pub struct MonoClock;

impl Monotonic for MonoClock {
    fn now_ms(&self) -> u64 {
        Mono::now().duration_since_epoch().to_millis()
    }
}

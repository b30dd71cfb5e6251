//! Calendar time and hardware RTC trait

/// Broken-down UTC (plus configured offset) calendar time
///
/// `year == 0` is the "never set" sentinel: nothing has been committed by
/// the NTP synchronizer yet.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockState {
    /// Full year (e.g. 2025), 0 when unset
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub min: u8,
    /// Second 0-59
    pub sec: u8,
    /// Day of week, Sunday = 0
    pub day_of_week: u8,
}

impl ClockState {
    /// The unset clock
    pub const UNSET: Self = Self {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        min: 0,
        sec: 0,
        day_of_week: 0,
    };

    /// Whether a time has ever been committed
    pub const fn is_set(&self) -> bool {
        self.year != 0
    }
}

/// Battery-less hardware RTC the board keeps ticking between NTP syncs
pub trait HardwareRtc {
    /// Board-specific error
    type Error: core::fmt::Debug;

    /// Program the hardware clock
    fn set_datetime(&mut self, time: &ClockState) -> Result<(), Self::Error>;

    /// Read the current time from the hardware clock
    fn datetime(&mut self) -> Result<ClockState, Self::Error>;
}

//! Datetime codec: calendar conversion, BCD and MSDOS packing
//!
//! Calendar math uses Howard Hinnant's `civil_from_days` algorithm.
//! Reference: http://howardhinnant.github.io/date_algorithms.html
//!
//! Encodings produced for the host:
//! - **IKBD record** (8 bytes, window order): `{year, 0x1B, day, month, min, hour, 0, sec}`.
//!   After the bus swaps each word the host sees the IKBD time-of-day packet
//!   `1B YY MM DD hh mm ss 00`.
//! - **MSDOS packed** (longword): `date << 16 | time` with
//!   `date = (year - 1980) << 9 | month << 5 | day` and
//!   `time = hour << 11 | min << 5 | sec / 2`.

use rtcemul_hal::ClockState;

/// IKBD time-of-day packet header
pub const IKBD_TIME_HEADER: u8 = 0x1B;

/// Two-digit year compensation added when the Y2K patch is enabled
pub const Y2K_YEAR_OFFSET: u8 = 50;

const SECONDS_PER_DAY: i64 = 86_400;

/// Convert a 0-99 binary value to packed BCD
pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Add two packed BCD bytes, modulo 100
pub fn add_bcd(a: u8, b: u8) -> u8 {
    let mut low = (a & 0x0F) as u16 + (b & 0x0F) as u16;
    let mut high = (a & 0xF0) as u16 + (b & 0xF0) as u16;

    if low > 9 {
        low += 6;
    }
    // Carry out of the low digit
    high += low & 0xF0;
    low &= 0x0F;

    if (high & 0x1F0) > 0x90 {
        high += 0x60;
    }

    ((high & 0xF0) | low) as u8
}

/// Apply the Y2K year compensation to a BCD two-digit year
pub fn apply_y2k_patch(year_bcd: u8) -> u8 {
    add_bcd(year_bcd, to_bcd(Y2K_YEAR_OFFSET))
}

/// Build the 8-byte IKBD record in window byte order
pub fn ikbd_record(time: &ClockState, y2k_patch: bool) -> [u8; 8] {
    let raw_year = to_bcd((time.year % 100) as u8);
    let year = if y2k_patch {
        apply_y2k_patch(raw_year)
    } else {
        raw_year
    };

    [
        year,
        IKBD_TIME_HEADER,
        to_bcd(time.day),
        to_bcd(time.month),
        to_bcd(time.min),
        to_bcd(time.hour),
        0,
        to_bcd(time.sec),
    ]
}

/// Pack the MSDOS date/time longword
pub fn msdos_datetime(time: &ClockState) -> u32 {
    let date = (time.year.saturating_sub(1980) << 9) | ((time.month as u16) << 5) | time.day as u16;
    let time_of_day =
        ((time.hour as u16) << 11) | ((time.min as u16) << 5) | (time.sec as u16 / 2);
    ((date as u32) << 16) | time_of_day as u32
}

/// Decompose seconds since the Unix epoch into calendar time (UTC `gmtime`)
pub fn civil_from_unix(unix_secs: i64) -> ClockState {
    let days = unix_secs.div_euclid(SECONDS_PER_DAY);
    let secs_today = unix_secs.rem_euclid(SECONDS_PER_DAY);

    let (year, month, day) = civil_from_days(days);
    // 1970-01-01 was a Thursday
    let day_of_week = (days + 4).rem_euclid(7) as u8;

    ClockState {
        year: year as u16,
        month,
        day,
        hour: (secs_today / 3600) as u8,
        min: ((secs_today % 3600) / 60) as u8,
        sec: (secs_today % 60) as u8,
        day_of_week,
    }
}

/// Days since 1970-01-01 to (year, month, day)
fn civil_from_days(days_since_epoch: i64) -> (i64, u8, u8) {
    // Shift the epoch to 0000-03-01 so the leap day ends the year
    let z = days_since_epoch + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March = 0
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

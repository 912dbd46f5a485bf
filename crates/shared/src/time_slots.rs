//! Calendar-slot arithmetic over UTC millisecond timestamps.
//!
//! Every function interprets the timestamp in the supplied time zone (the
//! device's local calendar) and returns a UTC millisecond timestamp again.
//! Wall-clock times skipped by a daylight-saving transition resolve to the
//! first valid instant after the gap; repeated wall-clock times resolve to
//! the earlier instant.

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};

/// One second in milliseconds.
pub const SECOND_IN_MILLIS: i64 = 1_000;
/// One minute in milliseconds.
pub const MINUTE_IN_MILLIS: i64 = 60 * SECOND_IN_MILLIS;
/// One hour in milliseconds.
pub const HOUR_IN_MILLIS: i64 = 60 * MINUTE_IN_MILLIS;
/// One day in milliseconds.
pub const DAY_IN_MILLIS: i64 = 24 * HOUR_IN_MILLIS;

/// Rounding direction for [`nearest_even_hour`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round to the nearest whole hour, then up to an even hour.
    Up,
    /// Round down to the most recent even-hour boundary.
    Down,
}

/// Calendar of the device: a fixed UTC offset, or the host's local zone
/// including its daylight-saving transitions.
///
/// Offsets read back from a `DateTime` are treated as fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTimeZone {
    Fixed(FixedOffset),
    Local,
}

impl TimeZone for DeviceTimeZone {
    type Offset = FixedOffset;

    fn from_offset(offset: &FixedOffset) -> Self {
        DeviceTimeZone::Fixed(*offset)
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        match self {
            DeviceTimeZone::Fixed(offset) => offset.offset_from_local_date(local),
            DeviceTimeZone::Local => Local.offset_from_local_date(local),
        }
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        match self {
            DeviceTimeZone::Fixed(offset) => offset.offset_from_local_datetime(local),
            DeviceTimeZone::Local => Local.offset_from_local_datetime(local),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        match self {
            DeviceTimeZone::Fixed(offset) => offset.offset_from_utc_date(utc),
            DeviceTimeZone::Local => Local.offset_from_utc_date(utc),
        }
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            DeviceTimeZone::Fixed(offset) => offset.offset_from_utc_datetime(utc),
            DeviceTimeZone::Local => Local.offset_from_utc_datetime(utc),
        }
    }
}

fn local_time<Tz: TimeZone>(tz: &Tz, timestamp: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(timestamp).map(|utc| utc.with_timezone(tz).naive_local())
}

fn to_timestamp<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<i64> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.timestamp_millis()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp_millis()),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.timestamp_millis()),
    }
}

fn start_of_hour(local: NaiveDateTime) -> Option<NaiveDateTime> {
    local.date().and_hms_opt(local.hour(), 0, 0)
}

fn shift_hours<Tz: TimeZone>(tz: &Tz, timestamp: i64, offset_for: impl Fn(u32) -> i64) -> Option<i64> {
    let local = local_time(tz, timestamp)?;
    let hour_start = start_of_hour(local)?;
    to_timestamp(tz, hour_start + Duration::hours(offset_for(local.hour())))
}

/// Returns the next even-hour boundary strictly after the hour containing
/// `timestamp` (00:00, 02:00, ..., 22:00). An aligned even hour advances by
/// two hours.
pub fn next_even_hour<Tz: TimeZone>(tz: &Tz, timestamp: i64) -> i64 {
    shift_hours(tz, timestamp, |hour| if hour % 2 == 0 { 2 } else { 1 }).unwrap_or(timestamp)
}

/// Returns the most recent even-hour boundary at or before `timestamp`.
pub fn last_even_hour<Tz: TimeZone>(tz: &Tz, timestamp: i64) -> i64 {
    shift_hours(tz, timestamp, |hour| if hour % 2 == 0 { 0 } else { -1 }).unwrap_or(timestamp)
}

/// Returns local midnight of the day after `timestamp`.
pub fn next_day_boundary<Tz: TimeZone>(tz: &Tz, timestamp: i64) -> i64 {
    local_time(tz, timestamp)
        .and_then(|local| local.date().succ_opt())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| to_timestamp(tz, midnight))
        .unwrap_or(timestamp)
}

/// Returns the even-hour boundary nearest to `timestamp` in the given
/// direction.
///
/// `Up` first rounds to the nearest whole hour (half past rounds up) and then
/// moves an odd hour forward, so the result may precede `timestamp` by up to
/// 30 minutes. `Down` is [`last_even_hour`].
pub fn nearest_even_hour<Tz: TimeZone>(tz: &Tz, timestamp: i64, rounding: Rounding) -> i64 {
    match rounding {
        Rounding::Down => last_even_hour(tz, timestamp),
        Rounding::Up => local_time(tz, timestamp)
            .and_then(|local| {
                let mut rounded = start_of_hour(local)?;
                if local.minute() >= 30 {
                    rounded += Duration::hours(1);
                }
                if rounded.hour() % 2 != 0 {
                    rounded += Duration::hours(1);
                }
                to_timestamp(tz, rounded)
            })
            .unwrap_or(timestamp),
    }
}

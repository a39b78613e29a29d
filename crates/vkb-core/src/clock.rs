//! Drift-compensated wall clock.
//!
//! The clock is synced from one server timestamp and then advanced with the
//! local [`TickSource`]. Ticks are `u32` milliseconds that wrap after about
//! 49.7 days; elapsed time is the wrapping difference, so a single wrap
//! between sync and query is harmless but a gap longer than one full period
//! is not detectable. Resync more often than that.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use chrono::{DateTime, NaiveDateTime, Timelike};

use crate::{
    errors::ClockError,
    ports::{MonotonicTicks, TickSource},
};

pub const TICKS_PER_SECOND: u32 = 1_000;

pub const MIN_OFFSET_SECONDS: i32 = -43_200;
pub const MAX_OFFSET_SECONDS: i32 = 50_400;
pub const MIN_OFFSET_HOURS: i32 = -12;
pub const MAX_OFFSET_HOURS: i32 = 14;

/// 2000-01-01T00:00:00Z. Anything earlier means the clock was never synced.
pub const SANITY_FLOOR_EPOCH: i64 = 946_684_800;

const LOCAL_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockSample {
    /// Server time at sync. Zero until the first successful sync.
    pub reference_epoch_seconds: u64,
    pub capture_tick: u32,
    pub utc_offset_seconds: i32,
}

pub struct DriftClock {
    sample: ClockSample,
    ticks: Arc<dyn TickSource>,
}

impl fmt::Debug for DriftClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriftClock")
            .field("sample", &self.sample)
            .finish()
    }
}

impl Default for DriftClock {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicTicks::new()))
    }
}

impl DriftClock {
    pub fn new(ticks: Arc<dyn TickSource>) -> Self {
        Self {
            sample: ClockSample::default(),
            ticks,
        }
    }

    pub fn sample(&self) -> ClockSample {
        self.sample
    }

    /// Anchor the clock at `reference_epoch_seconds` as of the current tick.
    ///
    /// Zero is how a failed fetch presents itself and is rejected.
    pub fn sync(&mut self, reference_epoch_seconds: u64) -> Result<(), ClockError> {
        if reference_epoch_seconds == 0 {
            return Err(ClockError::FetchFailed(
                "server returned a zero timestamp".to_string(),
            ));
        }
        self.sample.reference_epoch_seconds = reference_epoch_seconds;
        self.sample.capture_tick = self.ticks.now_ms();
        Ok(())
    }

    pub fn set_offset(&mut self, seconds: i64) -> Result<(), ClockError> {
        if !(i64::from(MIN_OFFSET_SECONDS)..=i64::from(MAX_OFFSET_SECONDS)).contains(&seconds) {
            return Err(ClockError::InvalidOffset(seconds));
        }
        self.sample.utc_offset_seconds = seconds as i32;
        Ok(())
    }

    pub fn set_offset_hours(&mut self, hours: i64) -> Result<(), ClockError> {
        if !(i64::from(MIN_OFFSET_HOURS)..=i64::from(MAX_OFFSET_HOURS)).contains(&hours) {
            return Err(ClockError::InvalidOffset(hours.saturating_mul(3_600)));
        }
        self.set_offset(hours * 3_600)
    }

    pub fn offset(&self) -> i32 {
        self.sample.utc_offset_seconds
    }

    pub fn is_synced(&self) -> bool {
        self.sample.reference_epoch_seconds != 0
    }

    /// Whole seconds since the sync, from the wrapping tick delta.
    pub fn elapsed_seconds(&self) -> u32 {
        self.ticks
            .now_ms()
            .wrapping_sub(self.sample.capture_tick)
            / TICKS_PER_SECOND
    }

    /// Local epoch seconds (server time + elapsed + offset), or 0 if unsynced.
    pub fn now(&self) -> i64 {
        if !self.is_synced() {
            return 0;
        }
        i64::try_from(self.sample.reference_epoch_seconds)
            .unwrap_or(i64::MAX)
            .saturating_add(i64::from(self.elapsed_seconds()))
            .saturating_add(i64::from(self.sample.utc_offset_seconds))
    }

    /// Current local time as `dd.mm.YYYY HH:MM:SS`.
    pub fn now_as_local_string(&self) -> Result<String, ClockError> {
        Ok(self.local_datetime()?.format(LOCAL_TIME_FORMAT).to_string())
    }

    /// Seconds since local midnight, or 0 when the time is unsynced or implausible.
    pub fn seconds_since_local_midnight(&self) -> u32 {
        self.try_seconds_since_local_midnight().unwrap_or(0)
    }

    pub fn try_seconds_since_local_midnight(&self) -> Result<u32, ClockError> {
        let dt = self.local_datetime()?;
        Ok(dt.hour() * 3_600 + dt.minute() * 60 + dt.second())
    }

    fn local_datetime(&self) -> Result<NaiveDateTime, ClockError> {
        let now = self.now();
        if now < SANITY_FLOOR_EPOCH {
            return Err(ClockError::NotSynced);
        }
        let dt = DateTime::from_timestamp(now, 0)
            .ok_or(ClockError::ImplausibleTime(now))?
            .naive_utc();
        if dt.hour() > 23 || dt.minute() > 59 || dt.second() > 59 {
            return Err(ClockError::ImplausibleTime(now));
        }
        Ok(dt)
    }
}

/// `UTC+3`, `UTC+5:30`, `UTC-3:30`, `UTC+0`.
pub fn format_utc_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    let hours = abs / 3_600;
    let minutes = (abs % 3_600) / 60;
    if minutes == 0 {
        format!("UTC{sign}{hours}")
    } else {
        format!("UTC{sign}{hours}:{minutes:02}")
    }
}

/// Tick source the host advances by hand.
///
/// Useful where the host already owns a millisecond counter, and in tests.
#[derive(Debug, Default)]
pub struct ManualTicks(AtomicU32);

impl ManualTicks {
    pub fn new(start_ms: u32) -> Self {
        Self(AtomicU32::new(start_ms))
    }

    pub fn set(&self, ms: u32) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow, like a hardware counter.
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TickSource for ManualTicks {
    fn now_ms(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T12:00:00Z
    const NOON_UTC: u64 = 1_699_963_200;

    fn clock_at(start_ms: u32) -> (DriftClock, Arc<ManualTicks>) {
        let ticks = Arc::new(ManualTicks::new(start_ms));
        (DriftClock::new(ticks.clone()), ticks)
    }

    #[test]
    fn unsynced_clock_reports_zero() {
        let (clock, _) = clock_at(0);
        assert!(!clock.is_synced());
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.seconds_since_local_midnight(), 0);
        assert_eq!(clock.now_as_local_string(), Err(ClockError::NotSynced));
        assert_eq!(
            clock.try_seconds_since_local_midnight(),
            Err(ClockError::NotSynced)
        );
    }

    #[test]
    fn zero_reference_is_a_failed_fetch() {
        let (mut clock, _) = clock_at(0);
        assert!(matches!(clock.sync(0), Err(ClockError::FetchFailed(_))));
        assert!(!clock.is_synced());
    }

    #[test]
    fn now_adds_elapsed_ticks() {
        let (mut clock, ticks) = clock_at(12_345);
        clock.sync(1_700_000_000).unwrap();
        ticks.advance(5_000);
        assert_eq!(clock.now(), 1_700_000_005);
        ticks.advance(999);
        assert_eq!(clock.now(), 1_700_000_005);
        ticks.advance(1);
        assert_eq!(clock.now(), 1_700_000_006);
    }

    #[test]
    fn elapsed_survives_counter_wrap() {
        let (mut clock, ticks) = clock_at(u32::MAX - 999);
        clock.sync(1_700_000_000).unwrap();
        ticks.advance(5_001);
        assert_eq!(ticks.now_ms(), 4_001);
        assert_eq!(clock.now(), 1_700_000_005);
    }

    #[test]
    fn offset_shifts_now_exactly() {
        let (mut clock, ticks) = clock_at(0);
        clock.sync(1_700_000_000).unwrap();
        ticks.advance(5_000);
        let utc = clock.now();

        clock.set_offset(10_800).unwrap();
        assert_eq!(clock.offset(), 10_800);
        assert_eq!(clock.now(), utc + 10_800);
    }

    #[test]
    fn out_of_range_offset_is_rejected_without_mutation() {
        let (mut clock, _) = clock_at(0);
        clock.set_offset(10_800).unwrap();
        assert_eq!(
            clock.set_offset(90_000),
            Err(ClockError::InvalidOffset(90_000))
        );
        assert!(clock.set_offset(-43_201).is_err());
        assert_eq!(clock.offset(), 10_800);

        assert!(clock.set_offset(-43_200).is_ok());
        assert!(clock.set_offset(50_400).is_ok());
    }

    #[test]
    fn offset_in_hours() {
        let (mut clock, _) = clock_at(0);
        clock.set_offset_hours(3).unwrap();
        assert_eq!(clock.offset(), 10_800);
        clock.set_offset_hours(14).unwrap();
        assert_eq!(clock.offset(), 50_400);
        assert!(clock.set_offset_hours(15).is_err());
        assert!(clock.set_offset_hours(-13).is_err());
        assert_eq!(clock.offset(), 50_400);
    }

    #[test]
    fn seconds_since_midnight_at_noon() {
        let (mut clock, _) = clock_at(0);
        clock.sync(NOON_UTC).unwrap();
        assert_eq!(clock.seconds_since_local_midnight(), 43_200);

        clock.set_offset(10_800).unwrap();
        assert_eq!(clock.seconds_since_local_midnight(), 54_000);
    }

    #[test]
    fn local_string_formats_with_offset() {
        let (mut clock, ticks) = clock_at(0);
        clock.sync(NOON_UTC).unwrap();
        ticks.advance(61_000);
        assert_eq!(
            clock.now_as_local_string().unwrap(),
            "14.11.2023 12:01:01"
        );

        clock.set_offset(-43_200).unwrap();
        assert_eq!(
            clock.now_as_local_string().unwrap(),
            "14.11.2023 00:01:01"
        );
    }

    #[test]
    fn synced_but_before_2000_is_not_synced() {
        let (mut clock, _) = clock_at(0);
        clock.sync(1_000).unwrap();
        assert!(clock.is_synced());
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.now_as_local_string(), Err(ClockError::NotSynced));
        assert_eq!(clock.seconds_since_local_midnight(), 0);
    }

    #[test]
    fn out_of_range_timestamp_is_implausible() {
        let (mut clock, _) = clock_at(0);
        clock.sync(u64::MAX).unwrap();
        assert!(matches!(
            clock.now_as_local_string(),
            Err(ClockError::ImplausibleTime(_))
        ));
        assert_eq!(clock.seconds_since_local_midnight(), 0);
    }

    #[test]
    fn utc_offset_labels() {
        assert_eq!(format_utc_offset(10_800), "UTC+3");
        assert_eq!(format_utc_offset(19_800), "UTC+5:30");
        assert_eq!(format_utc_offset(-12_600), "UTC-3:30");
        assert_eq!(format_utc_offset(0), "UTC+0");
    }
}

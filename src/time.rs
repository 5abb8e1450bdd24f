//! Instants and closed time windows.
//!
//! All instants are civil date-times with microsecond resolution and no
//! time zone. CP time and AP time share this type but are never compared
//! with each other, only independently against a requested [`Period`].

use std::fmt;

use jiff::{
    SignedDuration, Zoned,
    civil::{self, Date, DateTime},
};
use serde::{Serialize, Serializer};

/// Errors from parsing user-supplied dates and times.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid date '{0}', expected YYYYMMDD")]
    InvalidDate(String),

    #[error("invalid time '{0}', expected HHmm")]
    InvalidTime(String),
}

/// Reference point of the binary header encoding.
const EPOCH: DateTime = civil::date(1970, 1, 1).at(0, 0, 0, 0);

/// An absolute instant with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(DateTime);

impl Time {
    /// The earliest representable instant.
    pub const MIN: Self = Self(DateTime::MIN);

    /// The latest representable instant at microsecond resolution.
    pub const MAX: Self = Self(civil::date(9999, 12, 31).at(23, 59, 59, 999_999_000));

    /// Wraps a civil date-time, truncating it to whole microseconds.
    pub fn new(dt: DateTime) -> Self {
        let t = dt.time();
        let nanos = t.subsec_nanosecond();
        let time = civil::time(t.hour(), t.minute(), t.second(), nanos - nanos % 1_000);
        Self(DateTime::from_parts(dt.date(), time))
    }

    /// The current wall-clock time of this host.
    pub fn now() -> Self {
        Self::new(Zoned::now().datetime())
    }

    /// Instant `micros` microseconds after `1970-01-01 00:00:00`.
    /// `None` when out of range.
    pub fn from_epoch_micros(micros: i64) -> Option<Self> {
        EPOCH
            .checked_add(SignedDuration::from_micros(micros))
            .ok()
            .map(Self::new)
    }

    /// Parses `YYYYMMDD_HHmmss` with an optional `_uuuuuu` suffix.
    ///
    /// The whole string must be consumed.
    pub fn parse_compact(s: &str) -> Option<Self> {
        match Self::parse_prefix(s) {
            Some((time, used)) if used == s.len() => Some(time),
            _ => None,
        }
    }

    /// Parses a compact timestamp at the start of `s`.
    ///
    /// Returns the instant and the number of bytes consumed. The microsecond
    /// suffix is only taken when exactly six digits follow the underscore,
    /// so `core_20240101_080000_cpa` stops after the seconds.
    pub fn parse_prefix(s: &str) -> Option<(Self, usize)> {
        let b = s.as_bytes();
        if b.len() < 15 || b[8] != b'_' {
            return None;
        }
        if !b[..8].iter().chain(&b[9..15]).all(u8::is_ascii_digit) {
            return None;
        }
        let date = parse_date(&s[..8]).ok()?;
        let hour: i8 = s[9..11].parse().ok()?;
        let minute: i8 = s[11..13].parse().ok()?;
        let second: i8 = s[13..15].parse().ok()?;

        let mut used = 15;
        let mut micros = 0;
        let tail = &b[15..];
        if tail.len() >= 7
            && tail[0] == b'_'
            && tail[1..7].iter().all(u8::is_ascii_digit)
            && tail.get(7).is_none_or(|c| !c.is_ascii_digit())
        {
            micros = s[16..22].parse::<i32>().ok()?;
            used = 22;
        }

        let time = civil::Time::new(hour, minute, second, micros * 1_000).ok()?;
        Some((Self(DateTime::from_parts(date, time)), used))
    }

    /// `YYYYMMDD_HHmmss`, without the microsecond part.
    pub fn to_compact_seconds(self) -> String {
        self.0.strftime("%Y%m%d_%H%M%S").to_string()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:06}",
            self.0.strftime("%Y%m%d_%H%M%S"),
            self.0.subsec_nanosecond() / 1_000
        )
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parses a `YYYYMMDD` date.
pub fn parse_date(s: &str) -> Result<Date, TimeError> {
    let invalid = || TimeError::InvalidDate(s.to_string());
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i16 = s[0..4].parse().map_err(|_| invalid())?;
    let month: i8 = s[4..6].parse().map_err(|_| invalid())?;
    let day: i8 = s[6..8].parse().map_err(|_| invalid())?;
    Date::new(year, month, day).map_err(|_| invalid())
}

/// Parses an `HHmm` time of day. Seconds are left at zero.
pub fn parse_time_of_day(s: &str) -> Result<civil::Time, TimeError> {
    let invalid = || TimeError::InvalidTime(s.to_string());
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: i8 = s[0..2].parse().map_err(|_| invalid())?;
    let minute: i8 = s[2..4].parse().map_err(|_| invalid())?;
    civil::Time::new(hour, minute, 0, 0).map_err(|_| invalid())
}

/// A log whose first stored record is later than its last one.
///
/// Carries both observed instants so the caller can report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("start time {first} is greater than stop time {last}")]
pub struct StartGreaterThanStop {
    pub first: Time,
    pub last: Time,
}

/// A closed interval `[start, stop]`.
///
/// Used both for the requested window and for the observed window of
/// records actually found. A period whose start lies after its stop is
/// empty; constructing one is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    start: Time,
    stop: Time,
}

impl Period {
    pub fn new(start: Time, stop: Time) -> Self {
        Self { start, stop }
    }

    /// The widest possible window.
    pub fn maximal() -> Self {
        Self::new(Time::MIN, Time::MAX)
    }

    /// An empty observed window, ready to be grown with [`Period::extend`].
    pub fn empty() -> Self {
        Self::new(Time::MAX, Time::MIN)
    }

    /// Resolves optional `YYYYMMDD` dates and `HHmm` times into a window.
    ///
    /// Unset fields fall back per boundary: a time without a date means
    /// today, a date without a time covers the whole day, and nothing at
    /// all opens the boundary to the representable limit. Empty strings
    /// count as unset.
    pub fn resolve(
        start_date: Option<&str>,
        start_time: Option<&str>,
        stop_date: Option<&str>,
        stop_time: Option<&str>,
    ) -> Result<Self, TimeError> {
        fn set(s: Option<&str>) -> Option<&str> {
            s.filter(|s| !s.is_empty())
        }

        let mut period = Self::maximal();

        match (set(start_date), set(start_time)) {
            (Some(d), Some(t)) => period.start = at(parse_date(d)?, parse_time_of_day(t)?, 0, 0),
            (None, Some(t)) => period.start = at(today(), parse_time_of_day(t)?, 0, 0),
            (Some(d), None) => period.start = Time(parse_date(d)?.at(0, 0, 0, 0)),
            (None, None) => {}
        }

        match (set(stop_date), set(stop_time)) {
            (Some(d), Some(t)) => {
                period.stop = at(parse_date(d)?, parse_time_of_day(t)?, 59, 999_999_000);
            }
            (None, Some(t)) => period.stop = at(today(), parse_time_of_day(t)?, 59, 999_999_000),
            (Some(d), None) => period.stop = Time(parse_date(d)?.at(23, 59, 59, 999_999_000)),
            (None, None) => {}
        }

        Ok(period)
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn stop(&self) -> Time {
        self.stop
    }

    /// Earliest record found. Only meaningful when not empty.
    pub fn first(&self) -> Time {
        self.start
    }

    /// Latest record found. Only meaningful when not empty.
    pub fn last(&self) -> Time {
        self.stop
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.stop
    }

    pub fn contains(&self, t: Time) -> bool {
        self.start <= t && t <= self.stop
    }

    /// Grows this window to include `t`.
    pub fn extend(&mut self, t: Time) {
        self.start = self.start.min(t);
        self.stop = self.stop.max(t);
    }

    /// Grows this window to include all of `other`, if it is not empty.
    pub fn merge(&mut self, other: &Period) {
        if !other.is_empty() {
            self.extend(other.start);
            self.extend(other.stop);
        }
    }

    /// Clips a log's own `[first, last]` record window to this period.
    ///
    /// Fails when the log reports its first record after its last one.
    /// An empty result means the log has nothing inside this period.
    pub fn intersect_record_window(
        &self,
        first: Time,
        last: Time,
    ) -> Result<Period, StartGreaterThanStop> {
        if first > last {
            return Err(StartGreaterThanStop { first, last });
        }
        Ok(Self::new(self.start.max(first), self.stop.min(last)))
    }
}

fn today() -> Date {
    Zoned::now().date()
}

fn at(date: Date, time: civil::Time, second: i8, subsec_nanosecond: i32) -> Time {
    Time(date.at(time.hour(), time.minute(), second, subsec_nanosecond))
}

#[cfg(test)]
impl Time {
    /// Microseconds since `1970-01-01 00:00:00`, as binary headers carry it.
    pub(crate) fn to_epoch_micros(self) -> i64 {
        let micros = self.0.duration_since(EPOCH).as_micros();
        i64::try_from(micros).unwrap()
    }
}

#[cfg(test)]
pub(crate) fn t(s: &str) -> Time {
    Time::parse_compact(s).unwrap()
}

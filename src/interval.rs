//! Interval length and interval label handling.
//!
//! An aggregate point represents a span of time. The span's length comes
//! from an [`IntervalLength`] parsed from strings like `"1h"` or `"30min"`,
//! and the [`IntervalLabel`] states whether the point marks the start or the
//! end of that span.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{AggregateError, Result};
use crate::models::ObservationFrame;

// ---

const SECONDS_PER_DAY: i64 = 86_400;

/// Length of one aggregate interval, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntervalLength(i64);

impl IntervalLength {
    pub fn from_seconds(seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(AggregateError::UnparsableIntervalLength(format!("{seconds}s")));
        }
        Ok(Self(seconds))
    }

    pub fn from_minutes(minutes: i64) -> Result<Self> {
        Self::from_seconds(minutes * 60)
    }

    pub fn seconds(&self) -> i64 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.0)
    }

    /// Whether the length tiles a day exactly.
    pub fn divides_day(&self) -> bool {
        SECONDS_PER_DAY % self.0 == 0
    }
}

impl FromStr for IntervalLength {
    type Err = AggregateError;

    /// Accepts pandas-style offsets: an optional integer followed by one of
    /// `s`, `sec`, `min`, `T`, `m`, `h`, `H`, `hour`, `d`, `D`, `day`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        let count: i64 = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| AggregateError::UnparsableIntervalLength(s.to_string()))?
        };

        let multiplier = match unit.trim() {
            "s" | "S" | "sec" | "secs" => 1,
            "min" | "mins" | "T" | "m" => 60,
            "h" | "H" | "hour" | "hours" => 3_600,
            "d" | "D" | "day" | "days" => SECONDS_PER_DAY,
            _ => return Err(AggregateError::UnparsableIntervalLength(s.to_string())),
        };

        count
            .checked_mul(multiplier)
            .filter(|secs| *secs > 0)
            .map(Self)
            .ok_or_else(|| AggregateError::UnparsableIntervalLength(s.to_string()))
    }
}

impl fmt::Display for IntervalLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs % SECONDS_PER_DAY == 0 {
            write!(f, "{}d", secs / SECONDS_PER_DAY)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else if secs % 60 == 0 {
            write!(f, "{}min", secs / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

// ---

/// Which end of its interval a timestamp labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalLabel {
    Beginning,
    Ending,
    Instant,
}

impl IntervalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalLabel::Beginning => "beginning",
            IntervalLabel::Ending => "ending",
            IntervalLabel::Instant => "instant",
        }
    }

    /// Whether `t` lies inside `[start, end]` after adjusting the endpoints
    /// for this label: `beginning` excludes `end`, `ending` excludes `start`,
    /// `instant` keeps both.
    pub fn bounds_contain<Tz: TimeZone>(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        t: &DateTime<Tz>,
    ) -> bool {
        let t = t.with_timezone(&Utc);
        match self {
            IntervalLabel::Beginning => *start <= t && t < *end,
            IntervalLabel::Ending => *start < t && t <= *end,
            IntervalLabel::Instant => *start <= t && t <= *end,
        }
    }
}

impl FromStr for IntervalLabel {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginning" => Ok(IntervalLabel::Beginning),
            "ending" => Ok(IntervalLabel::Ending),
            "instant" => Ok(IntervalLabel::Instant),
            _ => Err(AggregateError::InvalidIntervalLabel(s.to_string())),
        }
    }
}

impl fmt::Display for IntervalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that a length/label pair can describe aggregate intervals.
///
/// The length must tile a day so grid points land on the same wall-clock
/// boundaries every day, and the label must describe a span.
pub fn check_aggregate_interval(length: IntervalLength, label: IntervalLabel) -> Result<()> {
    // ---
    if !length.divides_day() {
        return Err(AggregateError::InvalidIntervalLength(length.seconds()));
    }
    if label == IntervalLabel::Instant {
        return Err(AggregateError::InstantLabel);
    }
    Ok(())
}

/// Restrict `frame` to the rows between `start` and `end`, with the
/// endpoints in- or excluded according to `label`. Rows come back sorted.
pub fn clip_to_interval_label(
    frame: &ObservationFrame,
    label: IntervalLabel,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<ObservationFrame> {
    // ---
    let sorted = frame.sorted();
    if sorted.is_empty() {
        return Ok(sorted);
    }
    let index = sorted.utc_index()?;
    let keep: Vec<bool> = index
        .iter()
        .map(|t| label.bounds_contain(start, end, t))
        .collect();
    Ok(sorted.filter_rows(&keep))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::SampleTime;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_interval_lengths() {
        // ---
        assert_eq!("1h".parse::<IntervalLength>().unwrap().seconds(), 3_600);
        assert_eq!("30min".parse::<IntervalLength>().unwrap().seconds(), 1_800);
        assert_eq!("15T".parse::<IntervalLength>().unwrap().seconds(), 900);
        assert_eq!("10s".parse::<IntervalLength>().unwrap().seconds(), 10);
        assert_eq!("1D".parse::<IntervalLength>().unwrap().seconds(), 86_400);
        assert_eq!("h".parse::<IntervalLength>().unwrap().seconds(), 3_600);

        assert!("".parse::<IntervalLength>().is_err());
        assert!("0min".parse::<IntervalLength>().is_err());
        assert!("5 fortnights".parse::<IntervalLength>().is_err());
        assert!("-5min".parse::<IntervalLength>().is_err());
    }

    #[test]
    fn test_interval_length_display() {
        // ---
        assert_eq!(IntervalLength::from_minutes(60).unwrap().to_string(), "1h");
        assert_eq!(IntervalLength::from_minutes(20).unwrap().to_string(), "20min");
        assert_eq!(IntervalLength::from_seconds(45).unwrap().to_string(), "45s");
        assert_eq!(IntervalLength::from_seconds(86_400).unwrap().to_string(), "1d");
    }

    #[test]
    fn test_divisor_of_day() {
        // ---
        assert!(IntervalLength::from_minutes(36).unwrap().divides_day());
        assert!(IntervalLength::from_minutes(20).unwrap().divides_day());
        assert!(!IntervalLength::from_minutes(33).unwrap().divides_day());
        assert!(!IntervalLength::from_minutes(52).unwrap().divides_day());
    }

    #[test]
    fn test_check_aggregate_interval() {
        // ---
        let hour = IntervalLength::from_minutes(60).unwrap();
        assert!(check_aggregate_interval(hour, IntervalLabel::Ending).is_ok());
        assert!(check_aggregate_interval(hour, IntervalLabel::Beginning).is_ok());
        assert_eq!(
            check_aggregate_interval(hour, IntervalLabel::Instant),
            Err(AggregateError::InstantLabel)
        );
        assert_eq!(
            check_aggregate_interval(
                IntervalLength::from_minutes(33).unwrap(),
                IntervalLabel::Ending
            ),
            Err(AggregateError::InvalidIntervalLength(1_980))
        );
    }

    #[test]
    fn test_parse_labels() {
        // ---
        assert_eq!("ending".parse::<IntervalLabel>().unwrap(), IntervalLabel::Ending);
        assert_eq!("Beginning".parse::<IntervalLabel>().unwrap(), IntervalLabel::Beginning);
        assert_eq!("instant".parse::<IntervalLabel>().unwrap(), IntervalLabel::Instant);
        assert!("middle".parse::<IntervalLabel>().is_err());
    }

    #[test]
    fn test_bounds_contain() {
        // ---
        let start = utc("2019-01-01T12:00:00Z");
        let end = utc("2019-01-01T13:00:00Z");

        assert!(IntervalLabel::Beginning.bounds_contain(&start, &end, &start));
        assert!(!IntervalLabel::Beginning.bounds_contain(&start, &end, &end));

        assert!(!IntervalLabel::Ending.bounds_contain(&start, &end, &start));
        assert!(IntervalLabel::Ending.bounds_contain(&start, &end, &end));

        assert!(IntervalLabel::Instant.bounds_contain(&start, &end, &start));
        assert!(IntervalLabel::Instant.bounds_contain(&start, &end, &end));
    }

    #[test]
    fn test_clip_to_interval_label() {
        // ---
        let index = ["12:30", "12:00", "13:00", "11:30"]
            .iter()
            .map(|hm| format!("2019-01-01T{hm}:00Z").parse::<SampleTime>().unwrap())
            .collect();
        let frame = ObservationFrame::from_columns(
            index,
            vec![
                ("value".to_string(), vec![Some(2.0), Some(1.0), Some(3.0), Some(0.0)]),
                ("quality_flag".to_string(), vec![Some(0.0); 4]),
            ],
        )
        .unwrap();

        let start = utc("2019-01-01T12:00:00Z");
        let end = utc("2019-01-01T13:00:00Z");

        let beginning = clip_to_interval_label(&frame, IntervalLabel::Beginning, &start, &end).unwrap();
        assert_eq!(beginning.column("value").unwrap(), &[Some(1.0), Some(2.0)]);

        let ending = clip_to_interval_label(&frame, IntervalLabel::Ending, &start, &end).unwrap();
        assert_eq!(ending.column("value").unwrap(), &[Some(2.0), Some(3.0)]);

        let instant = clip_to_interval_label(&frame, IntervalLabel::Instant, &start, &end).unwrap();
        assert_eq!(instant.len(), 3);
    }

    #[test]
    fn test_clip_rejects_naive_data() {
        // ---
        let index = vec!["2019-01-01T12:00:00".parse::<SampleTime>().unwrap()];
        let frame =
            ObservationFrame::from_columns(index, vec![("value".to_string(), vec![Some(1.0)])])
                .unwrap();
        let start = utc("2019-01-01T11:00:00Z");
        let end = utc("2019-01-01T13:00:00Z");

        assert_eq!(
            clip_to_interval_label(&frame, IntervalLabel::Ending, &start, &end),
            Err(AggregateError::NotLocalized)
        );
    }
}

//! Aggregate grid construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{AggregateError, Result};
use crate::interval::{check_aggregate_interval, IntervalLabel, IntervalLength};
use crate::models::ObservationFrame;

// ---

/// Build the regular output grid covering every input frame.
///
/// The envelope of all timestamps is snapped outward onto interval
/// boundaries: up for `ending` labels, down for `beginning` labels. The
/// boundaries are wall-clock multiples of `interval_length` in `timezone`,
/// so hourly grids sit on the top of the local hour and daily grids on
/// local midnight, also across DST shifts.
pub fn build_index(
    frames: &BTreeMap<String, ObservationFrame>,
    interval_length: IntervalLength,
    interval_label: IntervalLabel,
    timezone: Tz,
) -> Result<Vec<DateTime<Tz>>> {
    // ---
    check_aggregate_interval(interval_length, interval_label)?;

    let mut envelope: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    for frame in frames.values() {
        if let Some((first, last)) = frame.envelope()? {
            envelope = Some(match envelope {
                Some((start, end)) => (start.min(first), end.max(last)),
                None => (first, last),
            });
        }
    }
    let Some((first, last)) = envelope else {
        return Ok(Vec::new());
    };

    let start = if interval_label == IntervalLabel::Ending {
        ceil_boundary(first, interval_length, &timezone)?
    } else {
        floor_boundary(first, interval_length, &timezone)?
    };
    let end = if interval_label == IntervalLabel::Ending {
        ceil_boundary(last, interval_length, &timezone)?
    } else {
        floor_boundary(last, interval_length, &timezone)?
    };

    let mut index = Vec::new();
    let mut t = start;
    while t <= end {
        index.push(t.with_timezone(&timezone));
        t = next_boundary(t, interval_length, &timezone)?;
    }

    debug!(
        "Built {} point {} {} grid from {} to {}",
        index.len(),
        interval_length,
        interval_label,
        start,
        end
    );
    Ok(index)
}

// ---
//
// Grid boundaries are the instants whose local wall-clock time in the
// target timezone is a whole multiple of the interval length since local
// midnight. Around DST shifts consecutive boundaries are not a fixed number
// of UTC seconds apart, so every search below tries each UTC offset in
// effect near `t` and keeps only candidates where that offset really holds.

fn utc_offset(timezone: &Tz, secs: i64) -> Option<i64> {
    let t = DateTime::from_timestamp(secs, 0)?;
    Some(i64::from(
        timezone
            .offset_from_utc_datetime(&t.naive_utc())
            .fix()
            .local_minus_utc(),
    ))
}

fn nearby_offsets(secs: i64, length: IntervalLength, timezone: &Tz) -> Vec<i64> {
    let mut offsets: Vec<i64> = (-2..=2)
        .filter_map(|k| secs.checked_add(k * length.seconds()))
        .filter_map(|s| utc_offset(timezone, s))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

fn from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(AggregateError::TimestampOutOfRange)
}

/// Whether `t` sits exactly on a grid boundary of `timezone`.
pub(crate) fn is_boundary(t: DateTime<Utc>, length: IntervalLength, timezone: &Tz) -> bool {
    // ---
    let secs = t.timestamp();
    t.timestamp_subsec_nanos() == 0
        && utc_offset(timezone, secs).is_some_and(|o| (secs + o).rem_euclid(length.seconds()) == 0)
}

/// The earliest grid boundary strictly after `t`.
pub(crate) fn next_boundary(t: DateTime<Utc>, length: IntervalLength, timezone: &Tz) -> Result<DateTime<Utc>> {
    // ---
    let len = length.seconds();
    let secs = t.timestamp();
    let mut best: Option<i64> = None;
    let mut fallback: Option<i64> = None;

    for offset in nearby_offsets(secs, length, timezone) {
        let local = secs + offset;
        let base = local - local.rem_euclid(len) + len;
        if fallback.is_none() && utc_offset(timezone, secs) == Some(offset) {
            fallback = Some(base - offset);
        }
        let found = (0..3)
            .map(|k| base + k * len - offset)
            .find(|&cand| utc_offset(timezone, cand) == Some(offset));
        if let Some(cand) = found {
            best = Some(best.map_or(cand, |b| b.min(cand)));
        }
    }

    from_secs(best.or(fallback).ok_or(AggregateError::TimestampOutOfRange)?)
}

/// The latest grid boundary at or before `t`.
pub(crate) fn floor_boundary(t: DateTime<Utc>, length: IntervalLength, timezone: &Tz) -> Result<DateTime<Utc>> {
    // ---
    let len = length.seconds();
    let secs = t.timestamp();
    let mut best: Option<i64> = None;
    let mut fallback: Option<i64> = None;

    for offset in nearby_offsets(secs, length, timezone) {
        let local = secs + offset;
        let base = local - local.rem_euclid(len);
        if fallback.is_none() && utc_offset(timezone, secs) == Some(offset) {
            fallback = Some(base - offset);
        }
        let found = (0..3)
            .map(|k| base - k * len - offset)
            .find(|&cand| utc_offset(timezone, cand) == Some(offset));
        if let Some(cand) = found {
            best = Some(best.map_or(cand, |b| b.max(cand)));
        }
    }

    from_secs(best.or(fallback).ok_or(AggregateError::TimestampOutOfRange)?)
}

/// The latest grid boundary strictly before `t`.
pub(crate) fn prev_boundary(t: DateTime<Utc>, length: IntervalLength, timezone: &Tz) -> Result<DateTime<Utc>> {
    let before = t
        .checked_sub_signed(Duration::nanoseconds(1))
        .ok_or(AggregateError::TimestampOutOfRange)?;
    floor_boundary(before, length, timezone)
}

fn ceil_boundary(t: DateTime<Utc>, length: IntervalLength, timezone: &Tz) -> Result<DateTime<Utc>> {
    if is_boundary(t, length, timezone) {
        Ok(t)
    } else {
        next_boundary(t, length, timezone)
    }
}

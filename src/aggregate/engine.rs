//! Aggregate computation.
//!
//! Each contributing observation is bucketed onto the output grid, masked
//! by its validity, and the surviving bucket values are reduced across
//! observations. Quality flags of everything that reported inside a bucket
//! are OR-ed together.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::function::AggregateFunction;
use super::index::{build_index, is_boundary, next_boundary, prev_boundary};
use super::validity::resolve_validity;
use crate::error::{AggregateError, Result};
use crate::interval::{check_aggregate_interval, IntervalLabel, IntervalLength};
use crate::models::{AggregateObservation, AggregateResult, ObservationFrame, ObservationSeries};

// ---

/// What to do when a valid observation has no value at a grid timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingData {
    /// Aggregate the observations that do have values.
    #[default]
    Skip,
    /// Mark the aggregate value missing.
    Propagate,
}

impl FromStr for MissingData {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "propagate" => Ok(Self::Propagate),
            _ => Err(AggregateError::UnknownMissingDataPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Propagate => f.write_str("propagate"),
        }
    }
}

/// How one observation's samples inside a bucket become its bucket value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BucketReduction {
    /// Mean of the non-missing samples.
    #[default]
    Mean,
    /// The latest non-missing sample.
    Last,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub missing_data: MissingData,
    pub bucket_reduction: BucketReduction,
    /// Use this grid instead of deriving one from the data.
    pub index: Option<Vec<DateTime<Tz>>>,
}

/// Compute an aggregate with default options.
pub fn compute_aggregate(
    frames: &BTreeMap<String, ObservationFrame>,
    interval_length: IntervalLength,
    interval_label: IntervalLabel,
    timezone: Tz,
    function: AggregateFunction,
    records: &[AggregateObservation],
) -> Result<AggregateResult> {
    compute_aggregate_with(
        frames,
        interval_length,
        interval_label,
        timezone,
        function,
        records,
        &AggregateOptions::default(),
    )
}

/// Compute an aggregate of `frames` over the lifecycle `records`.
///
/// Errors, in the order they are checked: a bad interval length or label,
/// an empty `frames`, naive timestamps, lifecycle violations from
/// [`resolve_validity`], records that are valid on the grid but have no
/// frame, and contributor frames without `value`/`quality_flag` columns.
pub fn compute_aggregate_with(
    frames: &BTreeMap<String, ObservationFrame>,
    interval_length: IntervalLength,
    interval_label: IntervalLabel,
    timezone: Tz,
    function: AggregateFunction,
    records: &[AggregateObservation],
    options: &AggregateOptions,
) -> Result<AggregateResult> {
    // ---
    check_aggregate_interval(interval_length, interval_label)?;
    if frames.is_empty() {
        return Err(AggregateError::EmptyData);
    }

    let index = match &options.index {
        Some(index) => {
            check_explicit_index(index, interval_length, &timezone)?;
            index.clone()
        }
        None => build_index(frames, interval_length, interval_label, timezone)?,
    };

    let ids: BTreeSet<&str> = records.iter().map(|r| r.observation_id.as_str()).collect();
    let mut masks: BTreeMap<&str, Vec<bool>> = BTreeMap::new();
    for id in ids {
        masks.insert(id, resolve_validity(&index, id, records)?);
    }

    let missing: Vec<String> = masks
        .iter()
        .filter(|(id, mask)| mask.iter().any(|v| *v) && !frames.contains_key(**id))
        .map(|(id, _)| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AggregateError::MissingObservation(missing));
    }

    let grid: Vec<DateTime<Utc>> = index.iter().map(|t| t.with_timezone(&Utc)).collect();
    let edges = bucket_edges(&grid, interval_length, interval_label, &timezone)?;
    let mut slots = vec![Slot::default(); grid.len()];
    let mut any_missing = false;

    for (id, frame) in frames {
        let Some(mask) = masks.get(id.as_str()).filter(|m| m.iter().any(|v| *v)) else {
            debug!("Observation {} does not contribute to the aggregate", id);
            continue;
        };
        let series = frame.observation_series(id)?;
        let buckets = bucket_series(&series, &edges, interval_label);

        for ((slot, bucket), valid) in slots.iter_mut().zip(&buckets).zip(mask) {
            if !*valid {
                continue;
            }
            if bucket.samples > 0 {
                slot.quality_flag |= bucket.quality_flag;
            }
            match bucket.value(options.bucket_reduction) {
                Some(value) => slot.values.push(value),
                None => {
                    slot.missing = true;
                    any_missing = true;
                }
            }
        }
    }

    if any_missing {
        warn!("Values missing for one or more observations");
    }

    let value: Vec<Option<f64>> = slots
        .iter()
        .map(|slot| match options.missing_data {
            MissingData::Propagate if slot.missing => None,
            _ => function.apply(&slot.values),
        })
        .collect();
    let quality_flag = slots.iter().map(|slot| slot.quality_flag).collect();

    info!(
        "Computed {} {} aggregate of {} observations over {} timestamps",
        interval_length,
        function,
        masks.len(),
        index.len()
    );

    Ok(AggregateResult {
        interval_length,
        interval_label,
        index,
        value,
        quality_flag,
    })
}

// ---

/// Values gathered from all contributors at one grid timestamp.
///
/// `quality_flag` also keeps flags of samples whose value is missing.
#[derive(Debug, Clone, Default)]
struct Slot {
    values: Vec<f64>,
    quality_flag: u32,
    missing: bool,
}

/// One observation's samples that fall in one grid interval. Flags of
/// samples without a value still count toward `quality_flag`.
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    samples: usize,
    count: usize,
    sum: f64,
    last: Option<(DateTime<Utc>, f64)>,
    quality_flag: u32,
}

impl Bucket {
    fn add(&mut self, t: DateTime<Utc>, value: Option<f64>, flag: u32) {
        self.samples += 1;
        self.quality_flag |= flag;
        if let Some(v) = value {
            self.count += 1;
            self.sum += v;
            if self.last.map_or(true, |(latest, _)| t >= latest) {
                self.last = Some((t, v));
            }
        }
    }

    fn value(&self, reduction: BucketReduction) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match reduction {
            BucketReduction::Mean => Some(self.sum / self.count as f64),
            BucketReduction::Last => self.last.map(|(_, v)| v),
        }
    }
}

/// Reject a caller-supplied grid that is not a run of consecutive
/// `interval_length` boundaries in `timezone`.
fn check_explicit_index(index: &[DateTime<Tz>], interval_length: IntervalLength, timezone: &Tz) -> Result<()> {
    // ---
    let grid: Vec<DateTime<Utc>> = index.iter().map(|t| t.with_timezone(&Utc)).collect();
    if let Some(t) = grid.iter().find(|t| !is_boundary(**t, interval_length, timezone)) {
        return Err(AggregateError::InvalidIndex(format!(
            "{} is not on a {} boundary in {}",
            t.with_timezone(timezone).to_rfc3339(),
            interval_length,
            timezone.name()
        )));
    }
    for pair in grid.windows(2) {
        let expected = next_boundary(pair[0], interval_length, timezone)?;
        if pair[1] != expected {
            return Err(AggregateError::InvalidIndex(format!(
                "{} follows {}, expected {}",
                pair[1].with_timezone(timezone).to_rfc3339(),
                pair[0].with_timezone(timezone).to_rfc3339(),
                expected.with_timezone(timezone).to_rfc3339()
            )));
        }
    }
    Ok(())
}

/// Interval edges around the grid: `grid.len() + 1` ascending instants.
///
/// With `ending` labels the extra edge is the boundary before the first
/// grid point; with `beginning` labels it is the boundary after the last.
fn bucket_edges(
    grid: &[DateTime<Utc>],
    length: IntervalLength,
    label: IntervalLabel,
    timezone: &Tz,
) -> Result<Vec<DateTime<Utc>>> {
    // ---
    let (Some(first), Some(last)) = (grid.first(), grid.last()) else {
        return Ok(Vec::new());
    };
    let mut edges = Vec::with_capacity(grid.len() + 1);
    if label == IntervalLabel::Ending {
        edges.push(prev_boundary(*first, length, timezone)?);
        edges.extend_from_slice(grid);
    } else {
        edges.extend_from_slice(grid);
        edges.push(next_boundary(*last, length, timezone)?);
    }
    Ok(edges)
}

/// Assign each sample to the grid interval containing it.
///
/// Interval `i` spans `edges[i]..edges[i + 1]`: open at the start and
/// closed at the end for `ending` labels, the other way round for
/// `beginning`. Samples outside every interval are dropped.
fn bucket_series(series: &ObservationSeries, edges: &[DateTime<Utc>], label: IntervalLabel) -> Vec<Bucket> {
    // ---
    let mut buckets = vec![Bucket::default(); edges.len().saturating_sub(1)];
    for ((t, value), flag) in series
        .times
        .iter()
        .zip(&series.value)
        .zip(&series.quality_flag)
    {
        let upper = match label {
            IntervalLabel::Beginning => edges.partition_point(|e| e <= t),
            _ => edges.partition_point(|e| e < t),
        };
        if let Some(bucket) = upper.checked_sub(1).and_then(|i| buckets.get_mut(i)) {
            bucket.add(*t, *value, *flag);
        }
    }
    buckets
}

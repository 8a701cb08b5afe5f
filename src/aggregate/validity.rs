//! Per-observation validity masks.
//!
//! An observation participates in an aggregate only inside its effective
//! windows. Observations can join, leave, rejoin, and eventually be deleted,
//! so one id may have several [`AggregateObservation`] records.

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::{AggregateError, Result};
use crate::models::AggregateObservation;

// ---

/// Compute which grid timestamps `observation_id` is valid for.
///
/// The mask is the union of the effective windows of every matching record,
/// cut off at the observation's deletion time. A deleted observation must
/// have been removed from the aggregate before it was deleted, and none of
/// its removed windows may reach into `index`, since its data is gone.
pub fn resolve_validity<Tz: TimeZone>(
    index: &[DateTime<Tz>],
    observation_id: &str,
    records: &[AggregateObservation],
) -> Result<Vec<bool>> {
    // ---
    let matched: Vec<&AggregateObservation> = records
        .iter()
        .filter(|r| r.observation_id == observation_id)
        .collect();
    if matched.is_empty() {
        return Err(AggregateError::UnknownObservation(observation_id.to_string()));
    }

    let deleted_at = matched
        .iter()
        .filter_map(|r| r.observation_deleted_at)
        .min();

    if let Some(deleted_at) = deleted_at {
        if !matched.iter().any(|r| r.retired_before_deletion()) {
            return Err(AggregateError::NotRetiredBeforeDeletion {
                observation_id: observation_id.to_string(),
                deleted_at,
            });
        }
    }

    let grid: Vec<DateTime<Utc>> = index.iter().map(|t| t.with_timezone(&Utc)).collect();

    let mut windows = Vec::with_capacity(matched.len());
    for record in matched {
        let Some(record_deleted_at) = record.observation_deleted_at else {
            windows.push(record);
            continue;
        };
        if !record.retired_before_deletion() {
            return Err(AggregateError::NotRetiredBeforeDeletion {
                observation_id: observation_id.to_string(),
                deleted_at: record_deleted_at,
            });
        }
        // retired_before_deletion guarantees effective_until is set
        if let (Some(first), Some(until)) = (grid.first(), record.effective_until) {
            if until >= *first {
                return Err(AggregateError::DeletedDataRequested(observation_id.to_string()));
            }
        }
    }

    let mask: Vec<bool> = grid
        .iter()
        .map(|t| {
            windows.iter().any(|w| w.covers(t)) && deleted_at.map_or(true, |deleted| *t < deleted)
        })
        .collect();

    debug!(
        "Observation {} valid at {} of {} timestamps",
        observation_id,
        mask.iter().filter(|v| **v).count(),
        mask.len()
    );
    Ok(mask)
}

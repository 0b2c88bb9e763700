//! Two-division schedule merge
//!
//! `merge(a, b)` is not commutative: on a weekday+period collision `b`
//! wins, and all week metadata is taken from `a`.

use omni_types::{ScheduleWeek, MERGED_DIVISION_ID};

use crate::error::CoreError;

/// Combine two snapshots of the same week
pub fn merge(a: &ScheduleWeek, b: &ScheduleWeek) -> ScheduleWeek {
    let mut body = a.body.clone();
    for (weekday, periods) in &b.body {
        let day = body.entry(weekday.clone()).or_default();
        for (period, lesson) in periods {
            day.insert(period.clone(), lesson.clone());
        }
    }

    let mut periods = a.periods.clone();
    for slot in &b.periods {
        if !periods.contains(slot) {
            periods.push(slot.clone());
        }
    }

    let division_id = if a.division_id == b.division_id {
        a.division_id
    } else {
        MERGED_DIVISION_ID
    };

    ScheduleWeek {
        body,
        periods,
        weekday_names: a.weekday_names.clone(),
        weekday_short_names: a.weekday_short_names.clone(),
        dates: a.dates.clone(),
        reference_date: a.reference_date.clone(),
        bounds: a.bounds.clone(),
        division_id,
    }
}

/// Check that lesson stamps agree with the snapshot's declared division
///
/// A merged snapshot needs every lesson stamped (non-zero); an unmerged one
/// needs every lesson to carry the snapshot's own id.
pub fn validate_division_stamps(week: &ScheduleWeek) -> Result<(), CoreError> {
    for (weekday, periods) in &week.body {
        for (period, lesson) in periods {
            let consistent = if week.is_merged() {
                lesson.division_id != MERGED_DIVISION_ID
            } else {
                lesson.division_id == week.division_id
            };
            if !consistent {
                return Err(CoreError::MergeInvariantViolation {
                    declared: week.division_id,
                    found: lesson.division_id,
                    weekday: weekday.clone(),
                    period: period.clone(),
                });
            }
        }
    }
    Ok(())
}

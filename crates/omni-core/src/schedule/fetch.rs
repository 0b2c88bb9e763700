//! Concurrent two-division fetch
//!
//! Both divisions are requested at once. If one fails the other's week is
//! used alone and the failure is reported next to it.

use omni_types::{Division, ScheduleWeek};
use tracing::{debug, warn};

use super::merge::{merge, validate_division_stamps};
use crate::api;
use crate::error::{CoreError, DivisionFailure};
use crate::session::DivisionTransport;

/// A week assembled from whichever divisions answered
#[derive(Debug, Clone)]
pub struct MergedFetch {
    pub week: ScheduleWeek,
    /// Divisions that did not contribute
    pub failures: Vec<DivisionFailure>,
}

impl MergedFetch {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Fetch `offset` from both divisions and merge (Academy first, College second)
pub async fn fetch_merged<T>(transport: &T, offset: i32) -> Result<MergedFetch, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let (academy, college) = tokio::join!(
        api::fetch_schedule(transport, Division::Academy, offset),
        api::fetch_schedule(transport, Division::College, offset),
    );

    let mut failures = Vec::new();
    let academy = keep_success(Division::Academy, offset, academy, &mut failures);
    let college = keep_success(Division::College, offset, college, &mut failures);

    let week = match (academy, college) {
        (Some(a), Some(c)) => merge(&a, &c),
        (Some(week), None) | (None, Some(week)) => week,
        (None, None) => return Err(CoreError::NoDivisionAvailable { failures }),
    };

    if let Err(e) = validate_division_stamps(&week) {
        warn!(offset, error = %e, "Inconsistent division stamps in fetched week");
    }

    debug!(
        offset,
        lessons = week.lesson_count(),
        partial = !failures.is_empty(),
        "Fetched week"
    );
    Ok(MergedFetch { week, failures })
}

fn keep_success(
    division: Division,
    offset: i32,
    result: Result<ScheduleWeek, CoreError>,
    failures: &mut Vec<DivisionFailure>,
) -> Option<ScheduleWeek> {
    match result {
        Ok(week) => Some(week),
        Err(e) => {
            warn!(division = %division, offset, error = %e, "Schedule fetch failed");
            failures.push(DivisionFailure::from_core_error(division, &e));
            None
        }
    }
}

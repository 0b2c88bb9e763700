//! Portal read endpoints
//!
//! Each call targets one division. Non-2xx answers become
//! `CoreError::Server`, undecodable bodies `CoreError::Decode`.

use omni_types::{
    Division, Homework, HomeworkListResponse, Lesson, PeriodSlot, PresentStudent,
    PresentsResponse, ProfileResponse, ScheduleWeek, TaskCounters, TeacherInfo, WeekBounds,
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::session::{DivisionTransport, PortalRequest};

pub const SCHEDULE_PATH: &str = "schedule/get-schedule";
pub const PROFILE_PATH: &str = "profile/get-profile";
pub const COUNTERS_PATH: &str = "dashboard/get-counters";
pub const PRESENTS_PATH: &str = "presents/get-presents";
pub const HOMEWORK_LIST_PATH: &str = "homework/get-new-homeworks";

/// `schedule/get-schedule` as sent by the portal
///
/// `body` is period-major here (period key → weekday key → lesson).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleResponse {
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub body: BTreeMap<String, BTreeMap<String, Lesson>>,
    #[serde(default)]
    pub lents: Vec<BTreeMap<String, PeriodSlot>>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub days: BTreeMap<String, String>,
    #[serde(rename = "daysShort", default, deserialize_with = "map_or_empty_list")]
    pub days_short: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub dates: BTreeMap<String, String>,
    #[serde(default)]
    pub curdate: String,
    #[serde(default)]
    pub start_end: WeekBounds,
}

impl ScheduleResponse {
    /// Transpose into the weekday-major model and stamp every lesson
    pub fn into_week(self, division: Division) -> ScheduleWeek {
        let mut body: BTreeMap<String, BTreeMap<String, Lesson>> = BTreeMap::new();
        for (period, days) in self.body {
            for (weekday, lesson) in days {
                body.entry(weekday)
                    .or_default()
                    .insert(period.clone(), lesson);
            }
        }

        ScheduleWeek {
            body,
            periods: self.lents,
            weekday_names: self.days,
            weekday_short_names: self.days_short,
            dates: self.dates,
            reference_date: self.curdate,
            bounds: self.start_end,
            division_id: division.id(),
        }
        .stamped(division)
    }
}

/// PHP backends serialize an empty map as `[]`
fn map_or_empty_list<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map(|v| (i.to_string(), v))
                    .map_err(serde::de::Error::custom)
            })
            .collect(),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

/// Filter for the new-homework listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeworkQuery {
    pub group_id: String,
    pub spec_id: String,
    pub limit: u32,
    pub offset: u32,
    pub transferred: bool,
}

impl Default for HomeworkQuery {
    fn default() -> Self {
        Self {
            group_id: String::new(),
            spec_id: String::new(),
            limit: 10,
            offset: 0,
            transferred: false,
        }
    }
}

impl HomeworkQuery {
    fn body(&self) -> Value {
        json!({
            "id_tgroups": self.group_id,
            "id_spec": self.spec_id,
            "limit": self.limit,
            "offset": self.offset,
            "type": 0,
            "transferred": self.transferred,
            "year": "",
            "month": "",
        })
    }
}

/// Fetch one division's week, transposed and stamped
pub async fn fetch_schedule<T>(
    transport: &T,
    division: Division,
    offset: i32,
) -> Result<ScheduleWeek, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let request = PortalRequest::post_json(SCHEDULE_PATH, json!({ "week": offset }));
    let response = transport
        .execute(division, request)
        .await?
        .error_for_status(division)?;
    let parsed: ScheduleResponse = response.json(division, "schedule")?;
    Ok(parsed.into_week(division))
}

pub async fn fetch_profile<T>(transport: &T, division: Division) -> Result<TeacherInfo, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let request = PortalRequest::post_json(PROFILE_PATH, json!({}));
    let response = transport
        .execute(division, request)
        .await?
        .error_for_status(division)?;
    let parsed: ProfileResponse = response.json(division, "profile")?;
    Ok(parsed.teach_info.unwrap_or_default())
}

pub async fn fetch_counters<T>(transport: &T, division: Division) -> Result<TaskCounters, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let request = PortalRequest::get(COUNTERS_PATH);
    let response = transport
        .execute(division, request)
        .await?
        .error_for_status(division)?;
    response.json(division, "counters")
}

/// Attendance roster of one period of the current day
pub async fn fetch_presents<T>(
    transport: &T,
    division: Division,
    period: u32,
) -> Result<Vec<PresentStudent>, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let request = PortalRequest::post_json(PRESENTS_PATH, json!({ "lenta": period }));
    let response = transport
        .execute(division, request)
        .await?
        .error_for_status(division)?;
    let parsed: PresentsResponse = response.json(division, "presents")?;
    Ok(parsed.students)
}

pub async fn fetch_homework<T>(
    transport: &T,
    division: Division,
    query: &HomeworkQuery,
) -> Result<Vec<Homework>, CoreError>
where
    T: DivisionTransport + ?Sized,
{
    let request = PortalRequest::post_json(HOMEWORK_LIST_PATH, query.body());
    let response = transport
        .execute(division, request)
        .await?
        .error_for_status(division)?;
    let parsed: HomeworkListResponse = response.json(division, "homework list")?;
    Ok(parsed.homework)
}

//! Weekly schedule model
//!
//! `ScheduleWeek.body` is weekday-major: weekday key → period key → lesson.
//! Keys are the portal's own string keys ("1".."7" for weekdays, "1".."N"
//! for periods).

use crate::division::Division;
use crate::serde_helpers::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Division id of a snapshot that combines both divisions
pub const MERGED_DIVISION_ID: u32 = 0;

/// A single lesson slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Period number ("lenta")
    #[serde(rename = "lenta", deserialize_with = "lenient_string")]
    pub period: String,
    /// Weekday key ("1" = Monday)
    #[serde(deserialize_with = "lenient_string")]
    pub weekday: String,
    #[serde(rename = "groups", default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(rename = "num_rooms", default, deserialize_with = "lenient_string")]
    pub room: String,
    #[serde(rename = "name_spec", default, deserialize_with = "lenient_string")]
    pub subject: String,
    #[serde(rename = "l_start", default, deserialize_with = "lenient_string")]
    pub start: String,
    #[serde(rename = "l_end", default, deserialize_with = "lenient_string")]
    pub end: String,
    /// Stamped by the fetch layer; never sent by the server
    #[serde(rename = "divisionId", default)]
    pub division_id: u32,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id_form: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub lessons_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub activity_type_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub entity_id: Option<String>,
    #[serde(rename = "scheduleType", default, deserialize_with = "lenient_opt_string")]
    pub schedule_type: Option<String>,
    #[serde(rename = "eventName", default, deserialize_with = "lenient_opt_string")]
    pub event_name: Option<String>,
    #[serde(rename = "eventSubtypeName", default, deserialize_with = "lenient_opt_string")]
    pub event_subtype_name: Option<String>,
}

impl Lesson {
    /// Origin division, if the lesson has been stamped
    pub fn division(&self) -> Option<Division> {
        Division::from_id(self.division_id)
    }

    /// Numeric period for ordering (non-numeric keys sort last)
    pub fn period_number(&self) -> u32 {
        self.period.trim().parse().unwrap_or(u32::MAX)
    }
}

/// Entry of the period catalogue ("lents")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSlot {
    #[serde(rename = "n_lenta", deserialize_with = "lenient_string")]
    pub period: String,
    #[serde(rename = "n_day", default, deserialize_with = "lenient_string")]
    pub day: String,
    #[serde(rename = "l_start", default, deserialize_with = "lenient_string")]
    pub start: String,
    #[serde(rename = "l_end", default, deserialize_with = "lenient_string")]
    pub end: String,
}

/// Monday/Sunday dates of the week, as reported by the portal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekBounds {
    #[serde(default)]
    pub monday: String,
    #[serde(default)]
    pub sunday: String,
}

/// One week of lessons, from one division or merged from both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWeek {
    /// weekday key → period key → lesson
    pub body: BTreeMap<String, BTreeMap<String, Lesson>>,
    /// Period catalogue ("lents")
    #[serde(default)]
    pub periods: Vec<BTreeMap<String, PeriodSlot>>,
    /// weekday key → full weekday name
    #[serde(default)]
    pub weekday_names: BTreeMap<String, String>,
    /// weekday key → short weekday name
    #[serde(default)]
    pub weekday_short_names: BTreeMap<String, String>,
    /// weekday key → ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub dates: BTreeMap<String, String>,
    /// Server "current date" string, e.g. "Monday, 19 May"
    #[serde(default)]
    pub reference_date: String,
    #[serde(default)]
    pub bounds: WeekBounds,
    /// `MERGED_DIVISION_ID` for merged snapshots, otherwise the origin division id
    #[serde(default)]
    pub division_id: u32,
}

impl ScheduleWeek {
    pub fn is_merged(&self) -> bool {
        self.division_id == MERGED_DIVISION_ID
    }

    /// Declared origin division, `None` when merged
    pub fn division(&self) -> Option<Division> {
        Division::from_id(self.division_id)
    }

    /// All lessons, weekday-major
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.body.values().flat_map(|day| day.values())
    }

    pub fn lesson_count(&self) -> usize {
        self.body.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lesson_count() == 0
    }

    /// Distinct division ids carried by the lessons
    pub fn lesson_division_ids(&self) -> BTreeSet<u32> {
        self.lessons().map(|l| l.division_id).collect()
    }

    /// Lessons of one weekday, ordered by period number
    pub fn lessons_for_weekday(&self, weekday: &str) -> Vec<&Lesson> {
        let mut lessons: Vec<&Lesson> = self
            .body
            .get(weekday)
            .map(|day| day.values().collect())
            .unwrap_or_default();
        lessons.sort_by_key(|l| l.period_number());
        lessons
    }

    /// Weekday keys in numeric order (union of names and body keys)
    pub fn weekday_keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<&String> = self.weekday_names.keys().collect();
        keys.extend(self.body.keys());
        let mut keys: Vec<String> = keys.into_iter().cloned().collect();
        keys.sort_by_key(|k| k.trim().parse::<u32>().unwrap_or(u32::MAX));
        keys
    }

    /// Weekday key whose date equals `date` (YYYY-MM-DD)
    pub fn weekday_for_date(&self, date: &str) -> Option<&str> {
        self.dates
            .iter()
            .find(|(_, d)| d.as_str() == date)
            .map(|(k, _)| k.as_str())
    }

    /// Weekday name part of the reference date ("Monday, 19 May" → "Monday")
    pub fn reference_weekday_name(&self) -> &str {
        self.reference_date
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
    }

    /// Copy with every lesson (and the snapshot itself) stamped with `division`
    pub fn stamped(mut self, division: Division) -> Self {
        for day in self.body.values_mut() {
            for lesson in day.values_mut() {
                lesson.division_id = division.id();
            }
        }
        self.division_id = division.id();
        self
    }
}

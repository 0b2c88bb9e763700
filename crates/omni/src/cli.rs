//! CLI helpers
//!
//! Argument types, lookups and table formatters shared by the subcommands.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::ValueEnum;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use omni_core::adapters::{MarkKind, Presence};
use omni_core::schedule::week_offset_for;
use omni_core::CoreError;
use omni_types::{
    Division, Lesson, PerDivision, PresentStudent, ReviewStudent, ScheduleWeek, TaskCounters,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    NoStudent {
        id: String,
        division: Division,
        scanned: usize,
    },
    Core(CoreError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NoStudent {
                id,
                division,
                scanned,
            } => write!(
                f,
                "No {} student with id '{}' ({} students listed)",
                division, id, scanned
            ),
            CliError::Core(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        CliError::Core(e)
    }
}

// ============================================================================
// Argument Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DivisionArg {
    Academy,
    College,
}

impl From<DivisionArg> for Division {
    fn from(arg: DivisionArg) -> Self {
        match arg {
            DivisionArg::Academy => Division::Academy,
            DivisionArg::College => Division::College,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresenceArg {
    Present,
    Absent,
    Late,
}

impl From<PresenceArg> for Presence {
    fn from(arg: PresenceArg) -> Self {
        match arg {
            PresenceArg::Present => Presence::Present,
            PresenceArg::Absent => Presence::Absent,
            PresenceArg::Late => Presence::Late,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MarkKindArg {
    /// Classwork column
    Classwork,
    /// Control work column
    Control,
}

impl From<MarkKindArg> for MarkKind {
    fn from(arg: MarkKindArg) -> Self {
        match arg {
            MarkKindArg::Classwork => MarkKind::Classwork,
            MarkKindArg::Control => MarkKind::ControlWork,
        }
    }
}

/// Week the `schedule` command shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekTarget {
    pub offset: i32,
    /// Only this day is printed when set
    pub date: Option<NaiveDate>,
}

impl WeekTarget {
    /// Resolve `--week` / `--date` against today (current week when neither is given)
    pub fn resolve(week: Option<i32>, date: Option<&str>, today: NaiveDate) -> Result<Self> {
        if let Some(date) = date {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .context("Invalid date format (expected: YYYY-MM-DD)")?;
            return Ok(Self {
                offset: week_offset_for(date, today),
                date: Some(date),
            });
        }
        Ok(Self {
            offset: week.unwrap_or(0),
            date: None,
        })
    }
}

// ============================================================================
// Lookups
// ============================================================================

pub fn find_present<'a>(
    students: &'a [PresentStudent],
    division: Division,
    id: &str,
) -> Result<&'a PresentStudent, CliError> {
    students
        .iter()
        .find(|s| s.id_stud == id)
        .ok_or_else(|| CliError::NoStudent {
            id: id.to_string(),
            division,
            scanned: students.len(),
        })
}

pub fn find_review_student<'a>(
    students: &'a [ReviewStudent],
    division: Division,
    id: &str,
) -> Result<&'a ReviewStudent, CliError> {
    students
        .iter()
        .find(|s| s.id_stud == id)
        .ok_or_else(|| CliError::NoStudent {
            id: id.to_string(),
            division,
            scanned: students.len(),
        })
}

// ============================================================================
// Formatters
// ============================================================================

fn division_cell(lesson: &Lesson, no_color: bool) -> Cell {
    let Some(division) = lesson.division() else {
        return Cell::new("-");
    };
    let cell = Cell::new(division.label());
    if no_color {
        return cell;
    }
    let (r, g, b) = division.color().rgb();
    cell.fg(Color::Rgb { r, g, b })
}

/// Format a merged week as table (human) or JSON
///
/// With `only_date` set, only the matching weekday is printed.
pub fn format_week(
    week: &ScheduleWeek,
    only_date: Option<NaiveDate>,
    json: bool,
    no_color: bool,
) -> String {
    if json {
        return serde_json::to_string_pretty(week).unwrap_or_else(|_| "{}".to_string());
    }

    let only_weekday = only_date.map(|d| d.format("%Y-%m-%d").to_string());
    let only_weekday = only_weekday
        .as_deref()
        .and_then(|d| week.weekday_for_date(d));

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let headers = ["Day", "#", "Time", "Subject", "Group", "Room", "Division"];
    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }

    let mut rows = 0;
    for weekday in week.weekday_keys() {
        if only_weekday.is_some_and(|only| only != weekday) {
            continue;
        }
        let day = day_label(week, &weekday);
        for lesson in week.lessons_for_weekday(&weekday) {
            table.add_row(Row::from(vec![
                Cell::new(&day),
                Cell::new(&lesson.period),
                Cell::new(format!("{}-{}", lesson.start, lesson.end)),
                Cell::new(truncate(&lesson.subject, 40)),
                Cell::new(&lesson.group),
                Cell::new(&lesson.room),
                division_cell(lesson, no_color),
            ]));
            rows += 1;
        }
    }

    if rows == 0 {
        return "No lessons.".to_string();
    }
    table.to_string()
}

fn day_label(week: &ScheduleWeek, weekday: &str) -> String {
    let name = week
        .weekday_short_names
        .get(weekday)
        .or_else(|| week.weekday_names.get(weekday))
        .cloned()
        .unwrap_or_else(|| weekday.to_string());
    match week.dates.get(weekday) {
        Some(date) => format!("{} {}", name, date),
        None => name,
    }
}

/// Format dashboard counters of both divisions
pub fn format_counters(
    counters: &PerDivision<Result<TaskCounters, CoreError>>,
    json: bool,
) -> String {
    if json {
        let value: serde_json::Map<String, serde_json::Value> = counters
            .iter()
            .map(|(division, result)| {
                let value = match result {
                    Ok(c) => serde_json::to_value(c).unwrap_or(serde_json::Value::Null),
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                (division.label().to_lowercase(), value)
            })
            .collect();
        return serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Division", "Homework", "Reviews", "Not done"]);
    for (division, result) in counters.iter() {
        let row = match result {
            Ok(c) => vec![
                division.label().to_string(),
                c.new_homework().to_string(),
                c.reviews.count.to_string(),
                c.not_done_tasks.to_string(),
            ],
            Err(e) => vec![
                division.label().to_string(),
                "-".to_string(),
                "-".to_string(),
                truncate(&e.to_string(), 40),
            ],
        };
        table.add_row(row);
    }
    table.to_string()
}

/// Truncate to `max` characters (not bytes), with ellipsis
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

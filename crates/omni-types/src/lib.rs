//! omni-types - Shared data types for omniclient
//!
//! This crate contains pure data structures without heavy dependencies.
//! No tokio, no async runtime - just serde-serializable types.
//!
//! Used by:
//! - omni-core (sessions, cache, write-back queue)
//! - omni (command-line front-end)

pub mod division;
pub mod portal;
pub mod queue;
pub mod schedule;
pub mod serde_helpers;

pub use division::{Division, PerDivision, TagColor};
pub use portal::{
    Homework, HomeworkListResponse, PresentStudent, PresentsResponse, ProfileResponse,
    ReviewStudent, ReviewsDue, TaskCounters, TeacherInfo,
};
pub use queue::QueueCounters;
pub use schedule::{Lesson, PeriodSlot, ScheduleWeek, WeekBounds, MERGED_DIVISION_ID};

//! Schedule merge engine, dual fetch and week arithmetic

mod fetch;
mod merge;
pub mod week;

pub use fetch::{fetch_merged, MergedFetch};
pub use merge::{merge, validate_division_stamps};
pub use week::{monday_for_offset, week_offset_for};

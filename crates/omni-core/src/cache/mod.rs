//! Caching layer for omni-core
//!
//! `WeekStore` persists merged weeks; `WeekCache` serves them from memory
//! and keeps them fresh.

pub mod week_cache;
pub mod week_store;

pub use week_cache::{WeekCache, WeekOrigin, WeekPhase, WeekStatus};
pub use week_store::{CachedWeek, MemoryWeekStore, SqliteWeekStore, WeekStore};

//! omni-core - Core library for omniclient
//!
//! Dual-division sessions, merged week cache and write-back queue for the
//! Academy/College teacher portal.

pub mod adapters;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod portal;
pub mod queue;
pub mod schedule;
pub mod session;

pub use adapters::{PortalMutation, WriteBack, WriteReceipt};
pub use cache::{MemoryWeekStore, SqliteWeekStore, WeekCache, WeekStatus, WeekStore};
pub use config::{Credentials, PortalConfig};
pub use error::{CoreError, DegradedState, DivisionFailure, FailureKind};
pub use event::{EventBus, PortalEvent};
pub use portal::Portal;
pub use queue::{Mutation, WriteQueue, WriteTask};
pub use session::{DivisionTransport, LoginOutcome, PortalRequest, PortalResponse, SessionManager};

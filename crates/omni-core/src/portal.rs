//! Portal facade
//!
//! Owns the session manager, the week cache and the write-back queue for
//! one user, wired to a shared event bus.

use omni_types::{Division, Homework, PerDivision, PresentStudent, TaskCounters, TeacherInfo};
use std::sync::Arc;
use tracing::debug;

use crate::adapters::{PortalMutation, WriteBack};
use crate::api::{self, HomeworkQuery};
use crate::auth::auto_login;
use crate::cache::{WeekCache, WeekStore};
use crate::config::{Credentials, PortalConfig};
use crate::error::{CoreError, DivisionFailure};
use crate::event::EventBus;
use crate::queue::WriteQueue;
use crate::session::{LoginOutcome, SessionManager};

pub struct Portal {
    config: PortalConfig,
    credentials: Credentials,
    sessions: Arc<SessionManager>,
    weeks: Arc<WeekCache>,
    write_back: WriteBack,
    events: EventBus,
}

impl Portal {
    pub fn new(
        config: PortalConfig,
        credentials: Credentials,
        store: Arc<dyn WeekStore>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        let sessions = Arc::new(SessionManager::new(&config, events.clone())?);

        let weeks = Arc::new(WeekCache::new(
            credentials.username.clone(),
            store,
            sessions.clone(),
            events.clone(),
            config.window_radius,
        ));

        let queue: WriteQueue<PortalMutation> =
            WriteQueue::new(sessions.clone(), events.clone(), config.write_delay());

        Ok(Self {
            config,
            credentials,
            sessions,
            weeks,
            write_back: WriteBack::new(queue),
            events,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn weeks(&self) -> &Arc<WeekCache> {
        &self.weeks
    }

    pub fn write_back(&self) -> &WriteBack {
        &self.write_back
    }

    /// Log in to both divisions, retrying while the portal is unreachable
    pub async fn login(&self, max_attempts: Option<u32>) -> Result<LoginOutcome, CoreError> {
        auto_login(
            self.sessions.as_ref(),
            &self.credentials,
            self.config.login_retry(),
            max_attempts,
        )
        .await
    }

    pub fn logout(&self) -> Result<(), CoreError> {
        self.sessions.logout()
    }

    /// Teacher profile from the first division that answers
    pub async fn profile(&self) -> Result<(Division, TeacherInfo), CoreError> {
        let mut failures = Vec::new();
        for division in Division::ALL {
            match api::fetch_profile(self.sessions.as_ref(), division).await {
                Ok(info) if info.full_name.is_some() => return Ok((division, info)),
                Ok(_) => debug!(division = %division, "Profile without teacher info"),
                Err(e) => failures.push(DivisionFailure::from_core_error(division, &e)),
            }
        }
        Err(CoreError::NoDivisionAvailable { failures })
    }

    /// Dashboard counters of both divisions, fetched concurrently
    pub async fn counters(&self) -> PerDivision<Result<TaskCounters, CoreError>> {
        let sessions = self.sessions.as_ref();
        let (academy, college) = tokio::join!(
            api::fetch_counters(sessions, Division::Academy),
            api::fetch_counters(sessions, Division::College),
        );
        PerDivision::new(academy, college)
    }

    pub async fn presents(
        &self,
        division: Division,
        period: u32,
    ) -> Result<Vec<PresentStudent>, CoreError> {
        api::fetch_presents(self.sessions.as_ref(), division, period).await
    }

    pub async fn homework(
        &self,
        division: Division,
        query: &HomeworkQuery,
    ) -> Result<Vec<Homework>, CoreError> {
        api::fetch_homework(self.sessions.as_ref(), division, query).await
    }
}

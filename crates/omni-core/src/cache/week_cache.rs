//! Week cache
//!
//! Serves merged weeks by offset from memory, backed by a `WeekStore` and
//! refreshed from both divisions. Per offset the lifecycle is:
//!
//! ```text
//! Absent → Loading → Ready(Local) → Refreshing → Ready(Remote)
//! Absent → Loading → Error            (local miss and remote failure)
//! ```
//!
//! Readers get a copy-on-write snapshot, so `get` never waits on a refresh.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use omni_types::ScheduleWeek;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::week_store::WeekStore;
use crate::error::{CoreError, DivisionFailure};
use crate::event::{EventBus, PortalEvent};
use crate::schedule::{fetch_merged, week};
use crate::session::DivisionTransport;

/// Where the currently served copy came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekPhase {
    Absent,
    /// Reading the store, or fetching with nothing to show yet
    Loading,
    Ready(WeekOrigin),
    /// Local copy shown, remote fetch in flight
    Refreshing,
    /// Local miss and remote failure
    Error(String),
}

impl WeekPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, WeekPhase::Loading | WeekPhase::Refreshing)
    }
}

/// Observable state of one week offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekStatus {
    pub phase: WeekPhase,
    /// Divisions missing from the last remote attempt
    pub failures: Vec<DivisionFailure>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WeekStatus {
    fn absent() -> Self {
        Self {
            phase: WeekPhase::Absent,
            failures: Vec::new(),
            updated_at: None,
        }
    }

    fn loading() -> Self {
        Self {
            phase: WeekPhase::Loading,
            ..Self::absent()
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.phase, WeekPhase::Ready(_)) && !self.failures.is_empty()
    }
}

/// Merged-week cache for one user
pub struct WeekCache {
    username: String,
    store: Arc<dyn WeekStore>,
    transport: Arc<dyn DivisionTransport>,
    weeks: RwLock<Arc<HashMap<i32, ScheduleWeek>>>,
    status: DashMap<i32, WeekStatus>,
    events: EventBus,
    window_radius: i32,
}

impl WeekCache {
    pub fn new(
        username: impl Into<String>,
        store: Arc<dyn WeekStore>,
        transport: Arc<dyn DivisionTransport>,
        events: EventBus,
        window_radius: i32,
    ) -> Self {
        Self {
            username: username.into(),
            store,
            transport,
            weeks: RwLock::new(Arc::new(HashMap::new())),
            status: DashMap::new(),
            events,
            window_radius: window_radius.max(0),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current copy of a week, if any
    pub fn get(&self, offset: i32) -> Option<ScheduleWeek> {
        self.weeks.read().get(&offset).cloned()
    }

    /// Every cached week at this instant
    pub fn snapshot(&self) -> Arc<HashMap<i32, ScheduleWeek>> {
        Arc::clone(&self.weeks.read())
    }

    /// Offsets held in memory, ascending
    pub fn cached_offsets(&self) -> Vec<i32> {
        let mut offsets: Vec<i32> = self.weeks.read().keys().copied().collect();
        offsets.sort_unstable();
        offsets
    }

    pub fn status(&self, offset: i32) -> WeekStatus {
        self.status
            .get(&offset)
            .map(|s| s.value().clone())
            .unwrap_or_else(WeekStatus::absent)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    /// Load `offset` from the store, then refresh it from the portal
    ///
    /// No-op (returns `None`) when the week is already cached or in flight.
    /// The returned handle completes when the remote refresh has been
    /// applied; dropping it does not cancel the refresh.
    pub fn ensure_loaded(self: &Arc<Self>, offset: i32) -> Option<JoinHandle<()>> {
        if !self.claim(offset) {
            debug!(offset, "Week already cached or loading");
            return None;
        }

        match self.store.get(&self.username, offset) {
            Ok(Some(cached)) => {
                let updated_at = cached.updated_at;
                self.publish(offset, cached.into_week());
                self.set_status(offset, WeekPhase::Refreshing, Vec::new(), Some(updated_at));
                self.events.publish(PortalEvent::WeekUpdated(offset));
                debug!(offset, "Served week from store");
            }
            Ok(None) => {}
            Err(e) => warn!(offset, error = %e, "Week store read failed"),
        }

        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            cache.refresh_remote(offset).await;
        }))
    }

    /// Load both neighbours of `center`, then evict outside the window
    pub fn ensure_adjacent_loaded(self: &Arc<Self>, center: i32) -> Vec<JoinHandle<()>> {
        let handles: Vec<JoinHandle<()>> = [center - 1, center + 1]
            .into_iter()
            .filter_map(|offset| self.ensure_loaded(offset))
            .collect();

        if let Err(e) = self.evict_outside(center) {
            warn!(center, error = %e, "Week eviction failed");
        }
        handles
    }

    /// Force a remote fetch of `offset`, even when cached
    pub fn refresh(self: &Arc<Self>, offset: i32) -> Option<JoinHandle<()>> {
        let claimed = match self.status.entry(offset) {
            Entry::Occupied(mut entry) => {
                if entry.get().phase.is_busy() {
                    false
                } else {
                    let has_copy = matches!(entry.get().phase, WeekPhase::Ready(_));
                    entry.get_mut().phase = if has_copy {
                        WeekPhase::Refreshing
                    } else {
                        WeekPhase::Loading
                    };
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(WeekStatus::loading());
                true
            }
        };
        if !claimed {
            return None;
        }

        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            cache.refresh_remote(offset).await;
        }))
    }

    /// Bulk-read `[center - r, center + r]` from the store (no network)
    pub fn preload_window(&self, center: i32) -> usize {
        let mut loaded = 0;
        for offset in week::window(center, self.window_radius) {
            if self.get(offset).is_some() {
                continue;
            }
            match self.store.get(&self.username, offset) {
                Ok(Some(cached)) => {
                    let updated_at = cached.updated_at;
                    self.publish(offset, cached.into_week());
                    if let Entry::Vacant(entry) = self.status.entry(offset) {
                        entry.insert(WeekStatus {
                            phase: WeekPhase::Ready(WeekOrigin::Local),
                            failures: Vec::new(),
                            updated_at: Some(updated_at),
                        });
                    }
                    loaded += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(offset, error = %e, "Week store read failed"),
            }
        }
        debug!(center, loaded, "Preloaded window from store");
        loaded
    }

    /// Drop every week outside `[center - r, center + r]` from store and memory
    pub fn evict_outside(&self, center: i32) -> Result<Vec<i32>, CoreError> {
        let keep: Vec<i32> = week::window(center, self.window_radius).collect();

        let mut evicted = self
            .store
            .delete_except(&self.username, &keep)
            .map_err(CoreError::store)?;

        {
            let mut guard = self.weeks.write();
            if guard.keys().any(|k| !keep.contains(k)) {
                let mut next = HashMap::clone(&guard);
                next.retain(|offset, _| {
                    let kept = keep.contains(offset);
                    if !kept {
                        evicted.push(*offset);
                    }
                    kept
                });
                *guard = Arc::new(next);
            }
        }
        self.status.retain(|offset, _| keep.contains(offset));

        evicted.sort_unstable();
        evicted.dedup();
        if !evicted.is_empty() {
            info!(center, evicted = ?evicted, "Evicted weeks outside window");
            self.events.publish(PortalEvent::WeeksEvicted(evicted.clone()));
        }
        Ok(evicted)
    }

    /// Forget every week of this user, persisted and in memory
    pub fn clear(&self) -> Result<usize, CoreError> {
        let removed = self
            .store
            .clear(&self.username)
            .map_err(CoreError::store)?;
        *self.weeks.write() = Arc::new(HashMap::new());
        self.status.clear();
        Ok(removed)
    }

    /// Absent or Error → Loading, atomically
    fn claim(&self, offset: i32) -> bool {
        match self.status.entry(offset) {
            Entry::Occupied(mut entry) => {
                let idle = matches!(entry.get().phase, WeekPhase::Absent | WeekPhase::Error(_));
                if idle {
                    *entry.get_mut() = WeekStatus::loading();
                }
                idle
            }
            Entry::Vacant(entry) => {
                entry.insert(WeekStatus::loading());
                true
            }
        }
    }

    async fn refresh_remote(&self, offset: i32) {
        let result = fetch_merged(self.transport.as_ref(), offset).await;

        if !self.status.contains_key(&offset) {
            debug!(offset, "Week evicted during refresh, dropping result");
            return;
        }

        match result {
            Ok(fetch) => {
                let changed = self.get(offset).as_ref() != Some(&fetch.week);
                if changed {
                    if let Err(e) = self.store.put(&self.username, offset, &fetch.week) {
                        warn!(offset, error = %e, "Failed to persist week");
                    }
                    self.publish(offset, fetch.week);
                } else {
                    debug!(offset, "Remote week unchanged");
                }

                self.set_status(
                    offset,
                    WeekPhase::Ready(WeekOrigin::Remote),
                    fetch.failures.clone(),
                    Some(Utc::now()),
                );

                if !fetch.failures.is_empty() {
                    self.events.publish(PortalEvent::WeekPartial {
                        offset,
                        failures: fetch.failures,
                    });
                }
                self.events.publish(if changed {
                    PortalEvent::WeekUpdated(offset)
                } else {
                    PortalEvent::WeekUnchanged(offset)
                });
            }
            Err(e) => {
                let failures = failures_of(&e);
                let reason = e.to_string();
                if self.get(offset).is_some() {
                    warn!(offset, error = %e, "Refresh failed, keeping local copy");
                    let updated_at = self.status(offset).updated_at;
                    self.set_status(
                        offset,
                        WeekPhase::Ready(WeekOrigin::Local),
                        failures,
                        updated_at,
                    );
                } else {
                    warn!(offset, error = %e, "Week unavailable");
                    self.set_status(offset, WeekPhase::Error(reason.clone()), failures, None);
                }
                self.events
                    .publish(PortalEvent::WeekFailed { offset, reason });
            }
        }
    }

    fn publish(&self, offset: i32, week: ScheduleWeek) {
        let mut guard = self.weeks.write();
        let mut next = HashMap::clone(&guard);
        next.insert(offset, week);
        *guard = Arc::new(next);
    }

    fn set_status(
        &self,
        offset: i32,
        phase: WeekPhase,
        failures: Vec<DivisionFailure>,
        updated_at: Option<DateTime<Utc>>,
    ) {
        self.status.insert(
            offset,
            WeekStatus {
                phase,
                failures,
                updated_at,
            },
        );
    }
}

fn failures_of(error: &CoreError) -> Vec<DivisionFailure> {
    match error {
        CoreError::NoDivisionAvailable { failures } => failures.clone(),
        other => other
            .division()
            .map(|d| vec![DivisionFailure::from_core_error(d, other)])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryWeekStore;
    use crate::session::{PortalRequest, PortalResponse};
    use async_trait::async_trait;
    use omni_types::Division;

    /// Answers every schedule request with an empty week, or fails
    struct FixedTransport {
        online: bool,
    }

    #[async_trait]
    impl DivisionTransport for FixedTransport {
        async fn execute(
            &self,
            division: Division,
            _request: PortalRequest,
        ) -> Result<PortalResponse, CoreError> {
            if self.online {
                Ok(PortalResponse::new(200, r#"{"body": {}, "curdate": "Monday"}"#))
            } else {
                Err(CoreError::Transport {
                    division,
                    message: "offline".to_string(),
                    source: None,
                })
            }
        }
    }

    fn cache(online: bool) -> Arc<WeekCache> {
        Arc::new(WeekCache::new(
            "alice",
            Arc::new(MemoryWeekStore::new()),
            Arc::new(FixedTransport { online }),
            EventBus::default(),
            2,
        ))
    }

    #[tokio::test]
    async fn test_ensure_loaded_reaches_ready_remote() {
        let cache = cache(true);
        assert_eq!(cache.status(0).phase, WeekPhase::Absent);

        let handle = cache.ensure_loaded(0).unwrap();
        handle.await.unwrap();

        assert_eq!(cache.status(0).phase, WeekPhase::Ready(WeekOrigin::Remote));
        assert!(cache.get(0).unwrap().is_merged());
        assert!(cache.ensure_loaded(0).is_none());
    }

    #[tokio::test]
    async fn test_offline_without_local_copy_is_error() {
        let cache = cache(false);
        cache.ensure_loaded(1).unwrap().await.unwrap();

        let status = cache.status(1);
        assert!(matches!(status.phase, WeekPhase::Error(_)));
        assert_eq!(status.failures.len(), 2);
        assert!(cache.get(1).is_none());

        // Error state may be retried
        assert!(cache.ensure_loaded(1).is_some());
    }

    #[tokio::test]
    async fn test_second_call_while_in_flight_is_noop() {
        let cache = cache(true);
        let first = cache.ensure_loaded(3);
        let second = cache.ensure_loaded(3);
        assert!(first.is_some());
        assert!(second.is_none());
        first.unwrap().await.unwrap();
    }

    #[test]
    fn test_failures_of_single_division_error() {
        let err = CoreError::Server {
            division: Division::College,
            status: 502,
            body: String::new(),
        };
        let failures = failures_of(&err);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].division, Division::College);
    }
}

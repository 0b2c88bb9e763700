//! Week cache behaviour against scripted transports and in-memory stores

mod common;

use anyhow::Result;
use common::{offline, ok_json, schedule_json, ScriptedTransport};
use omni_core::cache::{CachedWeek, MemoryWeekStore, WeekCache, WeekOrigin, WeekPhase, WeekStore};
use omni_core::schedule::fetch_merged;
use omni_core::{
    CoreError, DivisionTransport, EventBus, FailureKind, PortalEvent, PortalRequest, PortalResponse,
};
use omni_types::{Division, ScheduleWeek};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory store that counts writes
#[derive(Default)]
struct CountingStore {
    inner: MemoryWeekStore,
    puts: AtomicUsize,
}

impl CountingStore {
    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl WeekStore for CountingStore {
    fn get(&self, username: &str, offset: i32) -> Result<Option<CachedWeek>> {
        self.inner.get(username, offset)
    }

    fn put(&self, username: &str, offset: i32, week: &ScheduleWeek) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(username, offset, week)
    }

    fn delete_except(&self, username: &str, keep: &[i32]) -> Result<Vec<i32>> {
        self.inner.delete_except(username, keep)
    }

    fn keys(&self, username: &str) -> Result<Vec<i32>> {
        self.inner.keys(username)
    }

    fn clear(&self, username: &str) -> Result<usize> {
        self.inner.clear(username)
    }
}

/// Academy teaches Monday period 1, College teaches Tuesday period 1
fn both_divisions() -> ScriptedTransport {
    ScriptedTransport::new(|division, _req| match division {
        Division::Academy => ok_json(&schedule_json(&[("1", "1", "Databases")])),
        Division::College => ok_json(&schedule_json(&[("2", "1", "Networks")])),
    })
}

fn cache_with(store: Arc<dyn WeekStore>, transport: ScriptedTransport) -> Arc<WeekCache> {
    Arc::new(WeekCache::new(
        "alice",
        store,
        Arc::new(transport),
        EventBus::default(),
        2,
    ))
}

#[tokio::test]
async fn test_merged_week_carries_both_divisions() {
    let cache = cache_with(Arc::new(MemoryWeekStore::new()), both_divisions());

    cache.ensure_loaded(0).unwrap().await.unwrap();

    let week = cache.get(0).unwrap();
    assert!(week.is_merged());
    assert_eq!(week.body["1"]["1"].division(), Some(Division::Academy));
    assert_eq!(week.body["2"]["1"].division(), Some(Division::College));
    assert_eq!(cache.status(0).phase, WeekPhase::Ready(WeekOrigin::Remote));
    assert!(cache.status(0).failures.is_empty());
}

#[tokio::test]
async fn test_adjacent_load_evicts_outside_window() {
    let store = Arc::new(MemoryWeekStore::new());
    for offset in 0..=10 {
        store.put("alice", offset, &ScheduleWeek::default()).unwrap();
    }
    store.put("bob", 0, &ScheduleWeek::default()).unwrap();

    let cache = cache_with(store.clone(), both_divisions());
    let handles = cache.ensure_adjacent_loaded(5);
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.keys("alice").unwrap(), vec![3, 4, 5, 6, 7]);
    assert_eq!(store.keys("bob").unwrap(), vec![0]);
    assert_eq!(cache.cached_offsets(), vec![4, 6]);

    // The rest of the window comes from the store without network
    assert_eq!(cache.preload_window(5), 3);
    assert_eq!(cache.cached_offsets(), vec![3, 4, 5, 6, 7]);
    assert_eq!(cache.status(3).phase, WeekPhase::Ready(WeekOrigin::Local));
}

#[tokio::test]
async fn test_memory_pruned_when_window_moves() {
    let cache = cache_with(Arc::new(MemoryWeekStore::new()), both_divisions());
    let mut events = cache.subscribe();

    for handle in cache.ensure_adjacent_loaded(0) {
        handle.await.unwrap();
    }
    assert_eq!(cache.cached_offsets(), vec![-1, 1]);

    for handle in cache.ensure_adjacent_loaded(3) {
        handle.await.unwrap();
    }
    assert_eq!(cache.cached_offsets(), vec![1, 2, 4]);
    assert_eq!(cache.status(-1).phase, WeekPhase::Absent);

    let mut evicted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PortalEvent::WeeksEvicted(offsets) = event {
            evicted.extend(offsets);
        }
    }
    assert_eq!(evicted, vec![-1]);
}

#[tokio::test]
async fn test_identical_remote_week_is_not_rewritten() {
    let store = Arc::new(CountingStore::default());

    let first = cache_with(store.clone(), both_divisions());
    first.ensure_loaded(0).unwrap().await.unwrap();
    assert_eq!(store.puts(), 1);

    // Forced refresh with the same remote content
    first.refresh(0).unwrap().await.unwrap();
    assert_eq!(store.puts(), 1);

    // Fresh cache: served from the store, remote identical
    let second = cache_with(store.clone(), both_divisions());
    let mut events = second.subscribe();
    second.ensure_loaded(0).unwrap().await.unwrap();
    assert_eq!(store.puts(), 1);

    let mut saw_unchanged = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PortalEvent::WeekUnchanged(0)) {
            saw_unchanged = true;
        }
    }
    assert!(saw_unchanged);
}

#[tokio::test]
async fn test_changed_remote_week_replaces_local() {
    let store = Arc::new(CountingStore::default());
    let mut stale = ScheduleWeek::default();
    stale.reference_date = "stale".to_string();
    store.put("alice", 0, &stale).unwrap();

    let cache = cache_with(store.clone(), both_divisions());
    let handle = cache.ensure_loaded(0).unwrap();

    // Local copy is served before the refresh lands
    assert_eq!(cache.get(0).unwrap().reference_date, "stale");
    assert_eq!(cache.status(0).phase, WeekPhase::Refreshing);

    handle.await.unwrap();
    assert_eq!(cache.get(0).unwrap().reference_date, "Monday, 19 May");
    assert_eq!(store.puts(), 2);
}

#[tokio::test]
async fn test_partial_failure_keeps_other_division() {
    let transport = ScriptedTransport::new(|division, _req| match division {
        Division::Academy => ok_json(&schedule_json(&[("1", "1", "Databases")])),
        Division::College => Ok(PortalResponse::new(500, "Internal Server Error")),
    });
    let cache = cache_with(Arc::new(MemoryWeekStore::new()), transport);
    let mut events = cache.subscribe();

    cache.ensure_loaded(0).unwrap().await.unwrap();

    let week = cache.get(0).unwrap();
    assert_eq!(week.division(), Some(Division::Academy));
    assert_eq!(week.lesson_count(), 1);

    let status = cache.status(0);
    assert!(status.is_partial());
    assert_eq!(status.failures.len(), 1);
    assert_eq!(status.failures[0].division, Division::College);
    assert_eq!(status.failures[0].kind, FailureKind::Server);

    let mut partial = false;
    while let Ok(event) = events.try_recv() {
        if let PortalEvent::WeekPartial { offset: 0, failures } = event {
            partial = failures.len() == 1;
        }
    }
    assert!(partial);
}

#[tokio::test]
async fn test_offline_keeps_local_copy() {
    let store = Arc::new(MemoryWeekStore::new());
    let mut local = ScheduleWeek::default();
    local.reference_date = "cached".to_string();
    store.put("alice", 2, &local).unwrap();

    let cache = cache_with(store, ScriptedTransport::new(|d, _| Err(offline(d))));
    cache.ensure_loaded(2).unwrap().await.unwrap();

    assert_eq!(cache.get(2).unwrap().reference_date, "cached");
    let status = cache.status(2);
    assert_eq!(status.phase, WeekPhase::Ready(WeekOrigin::Local));
    assert_eq!(status.failures.len(), 2);
    assert!(status
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Transport));
}

#[tokio::test]
async fn test_schedule_request_carries_week_offset() {
    let transport = Arc::new(both_divisions());
    let cache = Arc::new(WeekCache::new(
        "alice",
        Arc::new(MemoryWeekStore::new()),
        transport.clone(),
        EventBus::default(),
        2,
    ));

    cache.ensure_loaded(-3).unwrap().await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    for (_, request) in calls {
        assert_eq!(request.path, "schedule/get-schedule");
        assert_eq!(request.body.unwrap()["week"], -3);
    }
}

#[tokio::test]
async fn test_legacy_rows_restamped_on_read() {
    let store = Arc::new(MemoryWeekStore::new());
    let legacy: serde_json::Value = serde_json::json!({
        "body": {"1": {"1": {
            "lenta": "1", "weekday": "1", "groups": "G", "num_rooms": "1",
            "name_spec": "Old", "l_start": "09:00", "l_end": "10:30"
        }}},
        "division_id": 458
    });
    let week: ScheduleWeek = serde_json::from_value(legacy).unwrap();
    store.insert_raw(
        "alice",
        CachedWeek {
            offset: 0,
            week,
            division_id: 458,
            updated_at: chrono::Utc::now(),
        },
    );

    let cache = cache_with(store, ScriptedTransport::new(|d, _| Err(offline(d))));
    cache.preload_window(0);

    let week = cache.get(0).unwrap();
    assert_eq!(week.body["1"]["1"].division(), Some(Division::College));
}

#[tokio::test]
async fn test_clear_forgets_everything() {
    let store = Arc::new(MemoryWeekStore::new());
    let cache = cache_with(store.clone(), both_divisions());
    cache.ensure_loaded(0).unwrap().await.unwrap();

    assert_eq!(cache.clear().unwrap(), 1);
    assert!(cache.get(0).is_none());
    assert!(store.keys("alice").unwrap().is_empty());
    assert_eq!(cache.status(0).phase, WeekPhase::Absent);
}

/// Answers like `both_divisions` after a fixed per-request pause
struct SlowTransport {
    inner: ScriptedTransport,
    pause: std::time::Duration,
}

#[async_trait::async_trait]
impl DivisionTransport for SlowTransport {
    async fn execute(
        &self,
        division: Division,
        request: PortalRequest,
    ) -> Result<PortalResponse, CoreError> {
        tokio::time::sleep(self.pause).await;
        self.inner.execute(division, request).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_divisions_fetched_concurrently() {
    let transport = SlowTransport {
        inner: both_divisions(),
        pause: std::time::Duration::from_secs(10),
    };

    let start = tokio::time::Instant::now();
    let fetch = fetch_merged(&transport, 0).await.unwrap();
    let elapsed = start.elapsed();

    assert!(!fetch.is_partial());
    assert_eq!(fetch.week.lesson_count(), 2);
    assert_eq!(transport.inner.call_count(), 2);
    assert!(
        elapsed < std::time::Duration::from_secs(20),
        "fetches ran one after the other: {:?}",
        elapsed
    );
}

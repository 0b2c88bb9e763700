//! Write-back queue
//!
//! FIFO of portal mutations, drained by at most one worker task. Each task
//! runs against its own division, reports through exactly one of its
//! callbacks, and is followed by a fixed pause. Failed tasks are not
//! retried.

use omni_types::{Division, QueueCounters};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::CoreError;
use crate::event::{EventBus, PortalEvent};
use crate::session::{DivisionTransport, PortalRequest};

/// A payload the queue knows how to send
pub trait Mutation: Send + Sync + 'static {
    fn request(&self) -> PortalRequest;

    /// Short label for logs
    fn describe(&self) -> String {
        self.request().path
    }
}

type SuccessCallback<P> = Box<dyn FnOnce(&P) + Send>;
type FailCallback<P> = Box<dyn FnOnce(&P, &CoreError) + Send>;

/// One queued mutation and its completion callbacks
pub struct WriteTask<P> {
    pub payload: P,
    pub division: Division,
    on_success: SuccessCallback<P>,
    on_fail: FailCallback<P>,
}

impl<P> WriteTask<P> {
    pub fn new(division: Division, payload: P) -> Self {
        Self {
            payload,
            division,
            on_success: Box::new(|_| {}),
            on_fail: Box::new(|_, _| {}),
        }
    }

    pub fn on_success(mut self, f: impl FnOnce(&P) + Send + 'static) -> Self {
        self.on_success = Box::new(f);
        self
    }

    pub fn on_fail(mut self, f: impl FnOnce(&P, &CoreError) + Send + 'static) -> Self {
        self.on_fail = Box::new(f);
        self
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for WriteTask<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTask")
            .field("division", &self.division)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

struct QueueState<P> {
    tasks: VecDeque<WriteTask<P>>,
    in_flight: Option<Division>,
    worker_running: bool,
}

impl<P> QueueState<P> {
    fn counters(&self) -> QueueCounters {
        let mut counters = QueueCounters::default();
        for task in &self.tasks {
            counters.pending[task.division] += 1;
        }
        if let Some(division) = self.in_flight {
            counters.pending[division] += 1;
        }
        counters
    }
}

struct Inner<P> {
    state: Mutex<QueueState<P>>,
    transport: Arc<dyn DivisionTransport>,
    counters: watch::Sender<QueueCounters>,
    events: EventBus,
    delay: Duration,
}

impl<P> Inner<P> {
    /// Must be called with the state lock held so updates stay ordered
    fn publish_counters(&self, state: &QueueState<P>) {
        let next = state.counters();
        let changed = self.counters.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(counters = %next, "Queue counters");
            self.events.publish(PortalEvent::QueueCounters(next));
        }
    }
}

/// Serial write-back queue for one payload type
pub struct WriteQueue<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for WriteQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Mutation> WriteQueue<P> {
    pub fn new(transport: Arc<dyn DivisionTransport>, events: EventBus, delay: Duration) -> Self {
        let (counters, _) = watch::channel(QueueCounters::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    in_flight: None,
                    worker_running: false,
                }),
                transport,
                counters,
                events,
                delay,
            }),
        }
    }

    /// Append a task and start the worker if idle
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, task: WriteTask<P>) {
        let mut state = self.inner.state.lock();
        debug!(division = %task.division, task = %task.payload.describe(), "Enqueued write");
        state.tasks.push_back(task);
        self.inner.publish_counters(&state);

        if !state.worker_running {
            state.worker_running = true;
            let inner = Arc::clone(&self.inner);
            tokio::spawn(run_worker(inner));
        }
    }

    pub fn counters(&self) -> QueueCounters {
        *self.inner.counters.borrow()
    }

    /// Live view of the counters
    pub fn watch_counters(&self) -> watch::Receiver<QueueCounters> {
        self.inner.counters.subscribe()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.tasks.is_empty() && state.in_flight.is_none()
    }

    /// Wait until every queued task has completed
    pub async fn wait_idle(&self) {
        let mut rx = self.watch_counters();
        // The sender lives in `inner`, which `self` keeps alive
        let _ = rx.wait_for(|c| c.is_idle()).await;
    }
}

async fn run_worker<P: Mutation>(inner: Arc<Inner<P>>) {
    loop {
        let task = {
            let mut state = inner.state.lock();
            match state.tasks.pop_front() {
                Some(task) => {
                    state.in_flight = Some(task.division);
                    task
                }
                None => {
                    state.worker_running = false;
                    state.in_flight = None;
                    inner.publish_counters(&state);
                    debug!("Write queue drained");
                    return;
                }
            }
        };

        let WriteTask {
            payload,
            division,
            on_success,
            on_fail,
        } = task;

        let result = match inner.transport.execute(division, payload.request()).await {
            Ok(response) => response.error_for_status(division).map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(division = %division, task = %payload.describe(), "Write delivered");
                guard_callback(division, &payload, || on_success(&payload));
            }
            Err(e) => {
                warn!(division = %division, task = %payload.describe(), error = %e, "Write failed");
                inner.events.publish(PortalEvent::WriteFailed {
                    division,
                    reason: e.to_string(),
                });
                guard_callback(division, &payload, || on_fail(&payload, &e));
            }
        }

        {
            let mut state = inner.state.lock();
            state.in_flight = None;
            inner.publish_counters(&state);
        }

        tokio::time::sleep(inner.delay).await;
    }
}

/// Runs a completion callback; a panic is logged and contained
fn guard_callback<P: Mutation>(division: Division, payload: &P, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(division = %division, task = %payload.describe(), "Write callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PortalResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Note(&'static str);

    impl Mutation for Note {
        fn request(&self) -> PortalRequest {
            PortalRequest::mutation("notes/save", json!({ "note": self.0 }))
        }
    }

    struct StatusTransport {
        status: u16,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DivisionTransport for StatusTransport {
        async fn execute(
            &self,
            _division: Division,
            _request: PortalRequest,
        ) -> Result<PortalResponse, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PortalResponse::new(self.status, ""))
        }
    }

    fn queue(status: u16) -> (WriteQueue<Note>, Arc<StatusTransport>) {
        let transport = Arc::new(StatusTransport {
            status,
            calls: AtomicUsize::new(0),
        });
        let queue = WriteQueue::new(
            transport.clone(),
            EventBus::default(),
            Duration::from_millis(500),
        );
        (queue, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_callback() {
        let (queue, transport) = queue(200);
        let (tx, rx) = tokio::sync::oneshot::channel();

        queue.enqueue(
            WriteTask::new(Division::Academy, Note("a"))
                .on_success(move |p| {
                    let _ = tx.send(p.0);
                })
                .on_fail(|_, _| panic!("unexpected failure")),
        );
        assert_eq!(queue.counters(), QueueCounters::new(1, 0));

        assert_eq!(rx.await.unwrap(), "a");
        queue.wait_idle().await;
        assert!(queue.is_idle());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_calls_on_fail_without_retry() {
        let (queue, transport) = queue(500);
        let (tx, rx) = tokio::sync::oneshot::channel();

        queue.enqueue(
            WriteTask::new(Division::College, Note("c"))
                .on_success(|_| panic!("unexpected success"))
                .on_fail(move |_, e| {
                    let _ = tx.send(matches!(e, CoreError::Server { status: 500, .. }));
                }),
        );

        assert!(rx.await.unwrap());
        queue.wait_idle().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_tasks() {
        let (queue, _) = queue(200);
        let start = tokio::time::Instant::now();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for name in ["one", "two"] {
            let tx = tx.clone();
            queue.enqueue(
                WriteTask::new(Division::Academy, Note(name)).on_success(move |_| {
                    let _ = tx.send(tokio::time::Instant::now());
                }),
            );
        }

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first - start < Duration::from_millis(500));
        assert!(second - first >= Duration::from_millis(500));
    }
}

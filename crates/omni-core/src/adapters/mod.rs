//! Domain actions mapped onto the write-back queue
//!
//! Adapters only build payloads and enqueue them; the queue worker is the
//! only thing that talks to the portal.

pub mod attendance;
pub mod homework;
pub mod review;

pub use attendance::{LessonMark, MarkKind, Presence, TopicUpdate, VisitMark};
pub use homework::HomeworkGrade;
pub use review::ReviewComment;

use omni_types::{Division, Homework, PresentStudent, ReviewStudent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{CoreError, DivisionFailure, FailureKind};
use crate::queue::{Mutation, WriteQueue, WriteTask};
use crate::session::PortalRequest;

/// Every mutation the portal accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalMutation {
    Visit(VisitMark),
    Mark(LessonMark),
    Topic(TopicUpdate),
    Review(ReviewComment),
    Homework(HomeworkGrade),
}

impl Mutation for PortalMutation {
    fn request(&self) -> PortalRequest {
        match self {
            PortalMutation::Visit(m) => m.request(),
            PortalMutation::Mark(m) => m.request(),
            PortalMutation::Topic(m) => m.request(),
            PortalMutation::Review(m) => m.request(),
            PortalMutation::Homework(m) => m.request(),
        }
    }

    fn describe(&self) -> String {
        match self {
            PortalMutation::Visit(m) => format!("visit {} student {}", m.schedule_id, m.student_id),
            PortalMutation::Mark(m) => format!("mark {} visit {}", m.mark, m.visit_id),
            PortalMutation::Topic(m) => format!("topic {}", m.schedule_id),
            PortalMutation::Review(m) => format!("review student {}", m.student_id),
            PortalMutation::Homework(m) => format!("homework {}", m.homework.id),
        }
    }
}

/// Keys for batched sub-items, unique within the process
///
/// Seeded from wall-clock milliseconds so keys from successive runs do not
/// collide either.
#[derive(Debug)]
pub struct BatchKeyGenerator {
    next: AtomicU64,
}

impl BatchKeyGenerator {
    pub fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    pub fn next_key(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for BatchKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome delivered by a task's callback
pub type WriteOutcome = Result<(), DivisionFailure>;

/// Resolves when the queued write has been attempted
#[derive(Debug)]
pub struct WriteReceipt {
    division: Division,
    rx: oneshot::Receiver<WriteOutcome>,
}

impl WriteReceipt {
    pub fn division(&self) -> Division {
        self.division
    }

    pub async fn wait(self) -> WriteOutcome {
        let division = self.division;
        self.rx.await.unwrap_or_else(|_| {
            Err(DivisionFailure::new(
                division,
                FailureKind::Other,
                "write dropped before completion",
            ))
        })
    }
}

/// Entry point for attendance, marks, reviews and homework grading
#[derive(Clone)]
pub struct WriteBack {
    queue: WriteQueue<PortalMutation>,
    keys: Arc<BatchKeyGenerator>,
}

impl WriteBack {
    pub fn new(queue: WriteQueue<PortalMutation>) -> Self {
        Self {
            queue,
            keys: Arc::new(BatchKeyGenerator::new()),
        }
    }

    pub fn queue(&self) -> &WriteQueue<PortalMutation> {
        &self.queue
    }

    pub fn record_visit(
        &self,
        division: Division,
        student: &PresentStudent,
        presence: Presence,
    ) -> WriteReceipt {
        let visit = VisitMark::new(self.keys.next_key(), student, presence);
        self.submit(division, PortalMutation::Visit(visit))
    }

    pub fn record_mark(
        &self,
        division: Division,
        student: &PresentStudent,
        kind: MarkKind,
        mark: u8,
    ) -> Result<WriteReceipt, CoreError> {
        let mark = LessonMark::new(self.keys.next_key(), division, student, kind, mark)?;
        Ok(self.submit(division, PortalMutation::Mark(mark)))
    }

    pub fn record_topic(&self, division: Division, topic: TopicUpdate) -> WriteReceipt {
        self.submit(division, PortalMutation::Topic(topic))
    }

    pub fn send_review(
        &self,
        division: Division,
        student: &ReviewStudent,
        comment: impl Into<String>,
    ) -> Result<WriteReceipt, CoreError> {
        let review = ReviewComment::new(student, comment)?;
        Ok(self.submit(division, PortalMutation::Review(review)))
    }

    pub fn grade_homework(
        &self,
        division: Division,
        homework: Homework,
        mark: Option<u8>,
        comment: Option<String>,
    ) -> Result<WriteReceipt, CoreError> {
        let grade = HomeworkGrade::new(self.keys.next_key(), division, homework, mark, comment)?;
        Ok(self.submit(division, PortalMutation::Homework(grade)))
    }

    fn submit(&self, division: Division, mutation: PortalMutation) -> WriteReceipt {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
        let fail_tx = Arc::clone(&tx);

        let task = WriteTask::new(division, mutation)
            .on_success(move |_| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(()));
                }
            })
            .on_fail(move |_, e| {
                if let Some(tx) = fail_tx.lock().take() {
                    let _ = tx.send(Err(DivisionFailure::from_core_error(division, e)));
                }
            });
        self.queue.enqueue(task);

        WriteReceipt { division, rx }
    }
}

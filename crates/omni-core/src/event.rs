//! Event bus for omniclient using tokio::broadcast
//!
//! Front-ends subscribe to learn when a week changed, when a refresh
//! failed, and how many write-back tasks are still pending.

use omni_types::{Division, QueueCounters};
use tokio::sync::broadcast;

use crate::error::DivisionFailure;

/// Events emitted by the data layer
#[derive(Debug, Clone)]
pub enum PortalEvent {
    /// Login finished (per-division outcome is in the `LoginOutcome`)
    LoggedIn { academy: bool, college: bool },
    /// Both sessions were reset
    LoggedOut,
    /// A week offset now holds new content
    WeekUpdated(i32),
    /// A refresh completed but content was unchanged
    WeekUnchanged(i32),
    /// A refresh failed entirely; cached content (if any) is kept
    WeekFailed { offset: i32, reason: String },
    /// A refresh succeeded with one division missing
    WeekPartial {
        offset: i32,
        failures: Vec<DivisionFailure>,
    },
    /// Weeks outside the retention window were dropped
    WeeksEvicted(Vec<i32>),
    /// Write-back queue counters changed
    QueueCounters(QueueCounters),
    /// A write-back task was rejected or could not be delivered
    WriteFailed { division: Division, reason: String },
}

/// Undelivered events kept per receiver before it starts lagging
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of `PortalEvent`s to every front-end listener
///
/// Slow receivers lag and lose the oldest events rather than blocking the
/// cache or the write queue.
pub struct EventBus {
    sender: broadcast::Sender<PortalEvent>,
}

impl EventBus {
    /// Bus that keeps up to `capacity` undelivered events per receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Bus sized for `DEFAULT_CAPACITY` events
    pub fn default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    pub fn publish(&self, event: PortalEvent) {
        // Nobody listening is fine for a headless run
        let _ = self.sender.send(event);
    }

    /// Receiver that sees events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::default_capacity();
        let mut rx = bus.subscribe();

        bus.publish(PortalEvent::WeekUpdated(0));
        bus.publish(PortalEvent::QueueCounters(QueueCounters::new(1, 0)));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PortalEvent::WeekUpdated(0)));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, PortalEvent::QueueCounters(c) if c.pending(Division::Academy) == 1));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::default_capacity();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        assert_eq!(clone.subscriber_count(), 1);
        clone.publish(PortalEvent::LoggedOut);
        assert!(matches!(rx.recv().await.unwrap(), PortalEvent::LoggedOut));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default_capacity();
        bus.publish(PortalEvent::WeeksEvicted(vec![-3, 3]));
    }

    #[test]
    fn test_slow_receiver_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for offset in 0..4 {
            bus.publish(PortalEvent::WeekUpdated(offset));
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(2))
        ));
        assert!(matches!(rx.try_recv().unwrap(), PortalEvent::WeekUpdated(2)));
    }
}

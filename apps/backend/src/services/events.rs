//! Trigger events emitted after committed reviews.
//!
//! Delivery (jobs, transport, templating) happens outside the engine; this
//! module only publishes onto a broadcast channel.

use tokio::sync::broadcast;
use uuid::Uuid;

use study_core::ReviewEvent;

use crate::models::StudyEvent;

/// Result of a leveling function that crossed a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub new_level: u32,
    pub total_xp: u64,
}

/// Caller-supplied leveling hook, consulted once per committed review.
pub trait Leveling: Send + Sync {
    fn on_review(&self, owner_id: Uuid, event: &ReviewEvent) -> Option<LevelUp>;
}

impl<F> Leveling for F
where
    F: Fn(Uuid, &ReviewEvent) -> Option<LevelUp> + Send + Sync,
{
    fn on_review(&self, owner_id: Uuid, event: &ReviewEvent) -> Option<LevelUp> {
        self(owner_id, event)
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StudyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudyEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, event: StudyEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(?event, "no event subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        let delivered = bus.publish(StudyEvent::DailyGoalReached {
            owner_id: Uuid::new_v4(),
            local_date: Utc::now().date_naive(),
            studied_today: 20,
            goal: 20,
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let event = StudyEvent::LevelUp {
            owner_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            new_level: 2,
            total_xp: 150,
            occurred_at: Utc::now(),
        };

        assert_eq!(bus.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}

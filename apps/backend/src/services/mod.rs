//! Study engine services: due-queue index, daily counters and streaks, stats
//! rollup, and the review coordinator that ties them to the ground truth.

pub mod coordinator;
pub mod daily;
pub mod due_queue;
pub mod events;
pub mod stats;

pub use coordinator::{ReviewCoordinator, ReviewSubmission};
pub use daily::{DailyCounter, StreakTracker};
pub use due_queue::DueQueue;
pub use events::{EventBus, LevelUp, Leveling};
pub use stats::StatsAggregator;

//! Notification jobs, the background dispatcher and business triggers.
//!
//! Callers build a [`NotificationRequest`] and hand it to
//! [`NotificationDispatcher::enqueue`], which returns a [`JobId`] immediately.
//! Delivery happens on the dispatcher's single drain task with bounded,
//! exponentially backed-off retries. Outcomes are only observable through the
//! delivery log, metrics and dispatcher stats.

mod backoff;
mod dispatcher;
pub mod events;
mod job;

pub use backoff::backoff_delay;
pub use dispatcher::{
    DirectSendError, DispatcherConfig, DispatcherState, DispatcherStats, DispatcherStatsSnapshot,
    NotificationDispatcher,
};
pub use events::JobBoardEvents;
pub use job::{Context, EnqueueError, JobId, NotificationJob, NotificationRequest};

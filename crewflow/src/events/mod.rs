//! Status tracking and change notification.
//!
//! This module provides the per-run [`StatusTracker`] and the
//! [`StatusListener`] trait through which callers observe it.

mod sink;
mod tracker;

pub use sink::{
    CollectingStatusListener, LoggingStatusListener, NoOpStatusListener, StatusListener,
};
pub use tracker::{ScopedTracker, StageRecord, StatusTracker, SubscriptionId, TrackerSnapshot};

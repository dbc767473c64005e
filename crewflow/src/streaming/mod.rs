//! Incremental response handling.
//!
//! Transports push fragments into a [`fragment_channel`]; the orchestrator
//! drains it into a [`StreamAggregator`] and publishes each snapshot.

mod aggregator;
mod channel;

pub use aggregator::StreamAggregator;
pub use channel::{fragment_channel, fragments_from, FragmentSender, FragmentStream};

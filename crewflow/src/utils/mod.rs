//! Small shared helpers.

mod timestamps;

pub use timestamps::{duration_ms, format_iso8601, now_utc, Timestamp};

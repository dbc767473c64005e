//! Accumulates streamed fragments into a growing snapshot.

use tracing::debug;

/// Append-only buffer for one stage's response.
///
/// Every snapshot is a prefix of every later snapshot. Once [`finish`] is
/// called the buffer is frozen and further pushes are ignored.
///
/// [`finish`]: StreamAggregator::finish
#[derive(Debug, Clone, Default)]
pub struct StreamAggregator {
    buffer: String,
    fragments: usize,
    complete: bool,
}

impl StreamAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment.
    ///
    /// Returns false if the aggregator is already complete.
    pub fn push(&mut self, fragment: &str) -> bool {
        if self.complete {
            debug!(
                chars = fragment.len(),
                "Fragment after completion ignored"
            );
            return false;
        }
        self.buffer.push_str(fragment);
        self.fragments += 1;
        true
    }

    /// Returns the text accumulated so far.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        &self.buffer
    }

    /// Returns true once [`StreamAggregator::finish`] has been called.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Freezes the buffer and returns the final text.
    pub fn finish(&mut self) -> &str {
        self.complete = true;
        &self.buffer
    }

    /// Number of fragments accepted.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Consumes the aggregator, returning the text.
    #[must_use]
    pub fn into_output(self) -> String {
        self.buffer
    }
}

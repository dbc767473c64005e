//! Scripted transport for driving the orchestrator in tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use crate::client::{PromptTransport, TransportError};
use crate::streaming::FragmentStream;

/// One scripted reaction to a prompt.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream these fragments, then finish.
    Respond(Vec<String>),
    /// Fail before the stream opens.
    Fail(TransportError),
    /// Stream some fragments, then fail.
    FailMidStream {
        /// Fragments delivered before the failure.
        fragments: Vec<String>,
        /// The failure.
        error: TransportError,
    },
    /// Never answer.
    Hang,
}

impl ScriptStep {
    /// A successful response.
    pub fn respond<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Respond(fragments.into_iter().map(Into::into).collect())
    }

    /// A failure before any fragment.
    #[must_use]
    pub fn fail(error: TransportError) -> Self {
        Self::Fail(error)
    }

    /// A failure after some fragments.
    pub fn fail_mid_stream<I, S>(fragments: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FailMidStream {
            fragments: fragments.into_iter().map(Into::into).collect(),
            error,
        }
    }
}

/// Shared record of the prompts a [`ScriptedTransport`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// All prompts, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns true if no call was made.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Number of calls whose prompt contains `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.0.lock().iter().filter(|p| p.contains(pattern)).count()
    }

    fn record(&self, prompt: &str) {
        self.0.lock().push(prompt.to_string());
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    steps: VecDeque<ScriptStep>,
}

/// A [`PromptTransport`] that answers from a script.
///
/// Each rule matches prompts containing a pattern and hands out its steps in
/// order, one per call. Prompts with no remaining scripted step get the
/// default response.
#[derive(Debug)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    default_response: Vec<String>,
    log: CallLog,
    open_delay: Duration,
    fragment_delay: Duration,
    barrier: Option<Arc<Barrier>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_response: vec!["ok".to_string()],
            log: CallLog::default(),
            open_delay: Duration::ZERO,
            fragment_delay: Duration::ZERO,
            barrier: None,
        }
    }
}

impl ScriptedTransport {
    /// Creates a transport that answers every prompt with `"ok"`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the calls whose prompt contains `pattern`.
    #[must_use]
    pub fn on(self, pattern: impl Into<String>, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        self.rules.lock().push(Rule {
            pattern: pattern.into(),
            steps: steps.into_iter().collect(),
        });
        self
    }

    /// Sets the response for unscripted prompts.
    #[must_use]
    pub fn with_default_response<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_response = fragments.into_iter().map(Into::into).collect();
        self
    }

    /// Delays every call before it answers.
    #[must_use]
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Delays every fragment.
    #[must_use]
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Holds every call until `parties` calls are waiting at once.
    ///
    /// Calls that are never joined by enough siblings wait forever, so use
    /// this only when the number of concurrent calls is known.
    #[must_use]
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    /// A handle on the prompts received, usable after the transport is moved.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn next_step(&self, prompt: &str) -> ScriptStep {
        let mut rules = self.rules.lock();
        rules
            .iter_mut()
            .filter(|rule| prompt.contains(&rule.pattern))
            .find_map(|rule| rule.steps.pop_front())
            .unwrap_or_else(|| ScriptStep::Respond(self.default_response.clone()))
    }

    fn stream(&self, fragments: Vec<String>, error: Option<TransportError>) -> FragmentStream {
        let delay = self.fragment_delay;
        let items = fragments.into_iter().map(Ok).chain(error.map(Err));
        Box::pin(stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        }))
    }
}

#[async_trait]
impl PromptTransport for ScriptedTransport {
    async fn send_prompt(&self, prompt: &str) -> Result<FragmentStream, TransportError> {
        self.log.record(prompt);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        match self.next_step(prompt) {
            ScriptStep::Respond(fragments) => Ok(self.stream(fragments, None)),
            ScriptStep::Fail(error) => Err(error),
            ScriptStep::FailMidStream { fragments, error } => Ok(self.stream(fragments, Some(error))),
            ScriptStep::Hang => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: FragmentStream) -> Vec<Result<String, TransportError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_default_response() {
        let transport = ScriptedTransport::new();
        let items = collect(transport.send_prompt("anything").await.unwrap()).await;
        assert_eq!(items, vec![Ok("ok".to_string())]);
        assert_eq!(transport.call_log().prompts(), vec!["anything".to_string()]);
    }

    #[tokio::test]
    async fn test_steps_consumed_in_order() {
        let transport = ScriptedTransport::new().on(
            "alpha",
            [
                ScriptStep::fail(TransportError::network("down")),
                ScriptStep::respond(["a", "b"]),
            ],
        );

        assert!(transport.send_prompt("x alpha").await.is_err());
        let items = collect(transport.send_prompt("alpha y").await.unwrap()).await;
        assert_eq!(items, vec![Ok("a".to_string()), Ok("b".to_string())]);
        // Exhausted rules fall back to the default.
        let items = collect(transport.send_prompt("alpha").await.unwrap()).await;
        assert_eq!(items, vec![Ok("ok".to_string())]);
        assert_eq!(transport.call_log().count_matching("alpha"), 3);
    }

    #[tokio::test]
    async fn test_fail_mid_stream() {
        let transport = ScriptedTransport::new()
            .with_default_response(["unused"])
            .on(
                "p",
                [ScriptStep::fail_mid_stream(["par"], TransportError::network("reset"))],
            );
        let items = collect(transport.send_prompt("p").await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragment_delay() {
        let transport = ScriptedTransport::new()
            .with_fragment_delay(Duration::from_millis(10))
            .with_default_response(["a", "b", "c"]);
        let start = tokio::time::Instant::now();
        collect(transport.send_prompt("p").await.unwrap()).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

//! Producer/consumer channel carrying response fragments.

use crate::client::TransportError;
use futures::stream::{self, Stream};
use std::pin::Pin;
use tokio::sync::mpsc;

/// Stream of fragments produced by a transport.
///
/// An `Err` item ends the response with a failure; the stream ending
/// normally means the response is complete.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Producer half of [`fragment_channel`].
#[derive(Debug, Clone)]
pub struct FragmentSender {
    tx: mpsc::Sender<Result<String, TransportError>>,
}

impl FragmentSender {
    /// Sends a fragment. Returns false once the consumer has gone away.
    pub async fn send(&self, fragment: impl Into<String>) -> bool {
        self.tx.send(Ok(fragment.into())).await.is_ok()
    }

    /// Ends the stream with an error.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Returns true if the consumer dropped the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates a bounded fragment channel.
///
/// Dropping the returned stream cancels the producer: its next `send`
/// returns false.
#[must_use]
pub fn fragment_channel(capacity: usize) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (FragmentSender { tx }, Box::pin(stream))
}

/// Wraps already-known fragments as a stream.
#[must_use]
pub fn fragments_from<I>(fragments: I) -> FragmentStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(fragments.into_iter().map(Ok)))
}

//! One-shot handoff of the telephony stream identifier.
//!
//! The telephony reader learns the stream identifier from the `start` frame;
//! the agent receiver needs it before it can address any outbound media. The
//! value is written at most once and every read after that sees the same
//! identifier.

use tokio::sync::watch;

use super::error::HandoffError;

/// Publishing side, owned by the telephony reader.
#[derive(Debug)]
pub struct StreamIdWriter {
    tx: watch::Sender<Option<String>>,
}

/// Consuming side, owned by the agent receiver.
#[derive(Debug, Clone)]
pub struct StreamIdReader {
    rx: watch::Receiver<Option<String>>,
}

/// Create a connected writer/reader pair.
pub fn handoff() -> (StreamIdWriter, StreamIdReader) {
    let (tx, rx) = watch::channel(None);
    (StreamIdWriter { tx }, StreamIdReader { rx })
}

impl StreamIdWriter {
    /// Publish the identifier. Later calls leave the first value in place.
    pub fn assign(&self, stream_sid: impl Into<String>) -> Result<(), HandoffError> {
        let stream_sid = stream_sid.into();
        let mut outcome = Ok(());

        self.tx.send_if_modified(|current| match current {
            Some(existing) => {
                outcome = Err(HandoffError::AlreadyAssigned {
                    current: existing.clone(),
                    rejected: stream_sid.clone(),
                });
                false
            }
            None => {
                *current = Some(stream_sid.clone());
                true
            }
        });

        outcome
    }
}

impl StreamIdReader {
    /// Wait until the identifier is published.
    ///
    /// Fails with [`HandoffError::WriterDropped`] if the writer goes away first.
    pub async fn wait(&mut self) -> Result<String, HandoffError> {
        let value = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| HandoffError::WriterDropped)?;

        value.clone().ok_or(HandoffError::WriterDropped)
    }
}

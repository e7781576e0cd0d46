//! Feed channel factory and handles.

use evch_sdk::objects::FeedEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default buffer size for the feed channel.
///
/// Large enough for a burst of platform notifications; a full buffer is
/// reported to the submitter instead of blocking it.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Receiver handle for feed events.
pub type FeedReceiver = mpsc::Receiver<FeedEvent>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed buffer is full")]
    Full,
    #[error("feed dispatcher has stopped")]
    Closed,
}

/// Sender handle for feed events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeedSender {
    inner: mpsc::Sender<FeedEvent>,
}

impl FeedSender {
    /// Queue an event without waiting for buffer space.
    pub fn submit(&self, event: FeedEvent) -> Result<(), FeedError> {
        self.inner.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FeedError::Full,
            mpsc::error::TrySendError::Closed(_) => FeedError::Closed,
        })
    }
}

/// Create a new feed channel with [`DEFAULT_CHANNEL_BUFFER`] capacity.
pub fn feed_channel() -> (FeedSender, FeedReceiver) {
    feed_channel_with_capacity(DEFAULT_CHANNEL_BUFFER)
}

pub fn feed_channel_with_capacity(capacity: usize) -> (FeedSender, FeedReceiver) {
    let (inner, rx) = mpsc::channel(capacity);
    (FeedSender { inner }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evch_sdk::objects::{EventId, GuildId};

    fn deleted(id: u64) -> FeedEvent {
        FeedEvent::Deleted {
            guild_id: GuildId(1),
            event_id: EventId(id),
        }
    }

    #[tokio::test]
    async fn submit_reports_full_and_closed() {
        let (tx, mut rx) = feed_channel_with_capacity(1);
        assert_eq!(tx.submit(deleted(1)), Ok(()));
        assert_eq!(tx.submit(deleted(2)), Err(FeedError::Full));

        assert_eq!(rx.recv().await, Some(deleted(1)));
        drop(rx);
        assert_eq!(tx.submit(deleted(3)), Err(FeedError::Closed));
    }
}

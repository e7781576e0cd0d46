//! Drains the feed channel into a processor.

use crate::events::FeedReceiver;
use evch_sdk::objects::FeedEvent;
use kanau::processor::Processor;
use std::fmt::Display;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Delivers feed events to `P` one at a time, in arrival order.
pub struct FeedDispatcher<P> {
    processor: P,
    feed_rx: FeedReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P> FeedDispatcher<P>
where
    P: Processor<FeedEvent, Output = ()>,
    P::Error: Display,
{
    pub fn new(processor: P, feed_rx: FeedReceiver, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            processor,
            feed_rx,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signalled or every sender is dropped.
    pub async fn run(mut self) {
        info!("FeedDispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("FeedDispatcher received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.feed_rx.recv() => {
                    debug!(guild = %event.guild_id(), event = ?event, "Received FeedEvent");
                    if let Err(e) = self.processor.process(event).await {
                        error!(error = %e, "Failed to process FeedEvent");
                    }
                }

                else => {
                    info!("Feed channel closed");
                    break;
                }
            }
        }

        info!("FeedDispatcher shutdown complete");
    }
}

//! Channel infrastructure for the event feed.
//!
//! # Event Flow
//!
//! 1. The server receives [`FeedEvent`](evch_sdk::objects::FeedEvent)s and
//!    submits them through a [`FeedSender`].
//! 2. [`FeedDispatcher`](crate::processors::FeedDispatcher) drains the
//!    receiver and hands each event to the lifecycle orchestrator, in order.

pub mod channels;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, FeedError, FeedReceiver, FeedSender, feed_channel,
    feed_channel_with_capacity,
};

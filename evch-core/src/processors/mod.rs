//! Long-running processors.
//!
//! - `FeedDispatcher`: Receives `FeedEvent`, hands it to the lifecycle
//!   orchestrator

pub mod feed_dispatcher;

pub use feed_dispatcher::FeedDispatcher;

//! Application state shared across all request handlers.

use evch_core::events::FeedSender;
use evch_core::orchestrator::LifecycleOrchestrator;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle engine; also owns the guild configuration store.
    pub orchestrator: LifecycleOrchestrator,
    /// Feed events accepted over HTTP are queued here for the dispatcher.
    pub feed: FeedSender,
}

impl AppState {
    pub fn new(orchestrator: LifecycleOrchestrator, feed: FeedSender) -> Self {
        Self { orchestrator, feed }
    }
}
